use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::users},
};
use domain::{
    entities::users::UserEntity, repositories::users::UserAccountRepository,
    value_objects::enums::user_subscription_statuses::UserSubscriptionStatus,
};

pub struct UserAccountPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UserAccountPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserAccountRepository for UserAccountPostgres {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = users::table
            .find(user_id)
            .select(UserEntity::as_select())
            .first::<UserEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn record_payment_success(
        &self,
        user_id: Uuid,
        paid_at: DateTime<Utc>,
        next_payment_date: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(users::table.find(user_id))
            .set((
                users::is_premium.eq(true),
                users::subscription_status.eq(UserSubscriptionStatus::Active.as_str()),
                users::last_payment_date.eq(Some(paid_at)),
                users::next_payment_date.eq(Some(next_payment_date)),
                users::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated > 0)
    }

    async fn update_subscription_status(
        &self,
        user_id: Uuid,
        status: UserSubscriptionStatus,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(users::table.find(user_id))
            .set((
                users::subscription_status.eq(status.as_str()),
                users::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated > 0)
    }

    async fn expire_premium(&self, user_id: Uuid, ended_at: DateTime<Utc>) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(users::table.find(user_id))
            .set((
                users::is_premium.eq(false),
                users::subscription_status.eq(UserSubscriptionStatus::Expired.as_str()),
                users::subscription_end_date.eq(Some(ended_at)),
                users::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated > 0)
    }

    async fn list_free_trials_ending_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<UserEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = users::table
            .filter(users::free_trial_used.eq(true))
            .filter(users::free_trial_end_date.ge(from))
            .filter(users::free_trial_end_date.lt(to))
            .filter(users::subscription_status.eq(UserSubscriptionStatus::Active.as_str()))
            .select(UserEntity::as_select())
            .load::<UserEntity>(&mut conn)?;

        Ok(results)
    }

    async fn end_free_trial(&self, user_id: Uuid) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(users::table.find(user_id))
            .set((
                users::is_premium.eq(false),
                users::subscription_status.eq(UserSubscriptionStatus::Inactive.as_str()),
                users::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(updated > 0)
    }
}
