use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, insert_into, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad, schema::subscription_histories,
    },
};
use domain::{
    entities::subscription_histories::{
        InsertSubscriptionHistoryEntity, SubscriptionHistoryEntity,
    },
    repositories::subscription_histories::SubscriptionHistoryRepository,
};

pub struct SubscriptionHistoryPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionHistoryPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionHistoryRepository for SubscriptionHistoryPostgres {
    async fn append(&self, entry: InsertSubscriptionHistoryEntity) -> Result<Uuid> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let history_id = insert_into(subscription_histories::table)
            .values(&entry)
            .returning(subscription_histories::id)
            .get_result::<Uuid>(&mut conn)?;

        Ok(history_id)
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<SubscriptionHistoryEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscription_histories::table
            .order(subscription_histories::created_at.desc())
            .limit(limit)
            .select(SubscriptionHistoryEntity::as_select())
            .load::<SubscriptionHistoryEntity>(&mut conn)?;

        Ok(results)
    }

    async fn list_by_subscription(
        &self,
        subscription_id: Uuid,
        limit: i64,
    ) -> Result<Vec<SubscriptionHistoryEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscription_histories::table
            .filter(subscription_histories::subscription_id.eq(subscription_id))
            .order(subscription_histories::created_at.desc())
            .limit(limit)
            .select(SubscriptionHistoryEntity::as_select())
            .load::<SubscriptionHistoryEntity>(&mut conn)?;

        Ok(results)
    }
}
