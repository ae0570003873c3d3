use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::users::UserEntity,
    value_objects::enums::user_subscription_statuses::UserSubscriptionStatus,
};

/// Point updates return `false` when the user row does not exist.
#[async_trait]
#[automock]
pub trait UserAccountRepository {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntity>>;

    async fn record_payment_success(
        &self,
        user_id: Uuid,
        paid_at: DateTime<Utc>,
        next_payment_date: DateTime<Utc>,
    ) -> Result<bool>;

    async fn update_subscription_status(
        &self,
        user_id: Uuid,
        status: UserSubscriptionStatus,
    ) -> Result<bool>;

    async fn expire_premium(&self, user_id: Uuid, ended_at: DateTime<Utc>) -> Result<bool>;

    /// Active users whose free trial ends in `[from, to)`.
    async fn list_free_trials_ending_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UserEntity>>;

    async fn end_free_trial(&self, user_id: Uuid) -> Result<bool>;
}
