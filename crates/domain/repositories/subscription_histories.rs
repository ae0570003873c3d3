use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::subscription_histories::{
    InsertSubscriptionHistoryEntity, SubscriptionHistoryEntity,
};

/// Append-only audit trail of billing events.
#[async_trait]
#[automock]
pub trait SubscriptionHistoryRepository {
    async fn append(&self, entry: InsertSubscriptionHistoryEntity) -> Result<Uuid>;

    async fn list_recent(&self, limit: i64) -> Result<Vec<SubscriptionHistoryEntity>>;

    async fn list_by_subscription(
        &self,
        subscription_id: Uuid,
        limit: i64,
    ) -> Result<Vec<SubscriptionHistoryEntity>>;
}
