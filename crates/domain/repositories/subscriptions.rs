use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::subscriptions::SubscriptionEntity;

#[async_trait]
#[automock]
pub trait SubscriptionRepository {
    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>>;

    /// `active`, auto-renewing and `next_billing_date <= now`.
    async fn list_due_for_billing(&self, now: DateTime<Utc>) -> Result<Vec<SubscriptionEntity>>;

    /// `suspended`, `retry_count < max_retry_count` and last attempt at or before `attempted_before`.
    async fn list_retry_eligible(
        &self,
        attempted_before: DateTime<Utc>,
        max_retry_count: i32,
    ) -> Result<Vec<SubscriptionEntity>>;

    /// `cancelled` with `grace_period_end_date <= now`.
    async fn list_grace_period_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionEntity>>;

    /// Active auto-renewing subscriptions ordered by `next_billing_date`.
    async fn list_active_auto_renew(&self) -> Result<Vec<SubscriptionEntity>>;

    async fn list_billing_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionEntity>>;

    /// Writes the scheduler-owned columns of one subscription.
    async fn save_billing_state(&self, subscription: &SubscriptionEntity) -> Result<()>;

    async fn mark_expired(&self, subscription_id: Uuid) -> Result<()>;

    /// Cancels the customer's active or suspended subscriptions on `plan_id`. Returns their ids.
    async fn cancel_by_customer_and_plan(
        &self,
        customer_id: Uuid,
        plan_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>>;
}
