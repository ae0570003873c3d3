use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions},
};
use domain::{
    entities::subscriptions::{SubscriptionBillingChangeset, SubscriptionEntity},
    repositories::subscriptions::SubscriptionRepository,
    value_objects::enums::subscription_statuses::SubscriptionStatus,
};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = subscriptions::table
            .find(subscription_id)
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn list_due_for_billing(&self, now: DateTime<Utc>) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
            .filter(subscriptions::auto_renew.eq(true))
            .filter(subscriptions::next_billing_date.le(now))
            .order(subscriptions::next_billing_date.asc())
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }

    async fn list_retry_eligible(
        &self,
        attempted_before: DateTime<Utc>,
        max_retry_count: i32,
    ) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Suspended.as_str()))
            .filter(subscriptions::retry_count.lt(max_retry_count))
            .filter(subscriptions::last_payment_attempt.le(attempted_before))
            .order(subscriptions::last_payment_attempt.asc())
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }

    async fn list_grace_period_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Cancelled.as_str()))
            .filter(subscriptions::grace_period_end_date.le(now))
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }

    async fn list_active_auto_renew(&self) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
            .filter(subscriptions::auto_renew.eq(true))
            .order(subscriptions::next_billing_date.asc())
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }

    async fn list_billing_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let results = subscriptions::table
            .filter(subscriptions::status.eq(SubscriptionStatus::Active.as_str()))
            .filter(subscriptions::auto_renew.eq(true))
            .filter(subscriptions::next_billing_date.ge(from))
            .filter(subscriptions::next_billing_date.le(to))
            .order(subscriptions::next_billing_date.asc())
            .select(SubscriptionEntity::as_select())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(results)
    }

    async fn save_billing_state(&self, subscription: &SubscriptionEntity) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(subscriptions::table.find(subscription.id))
            .set(&SubscriptionBillingChangeset::from(subscription))
            .execute(&mut conn)?;

        if updated == 0 {
            bail!("subscription {} not found while saving billing state", subscription.id);
        }

        Ok(())
    }

    async fn mark_expired(&self, subscription_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscriptions::table.find(subscription_id))
            .set((
                subscriptions::status.eq(SubscriptionStatus::Expired.as_str()),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    async fn cancel_by_customer_and_plan(
        &self,
        customer_id: Uuid,
        plan_id: &str,
        ended_at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let cancelled_ids = update(subscriptions::table)
            .filter(subscriptions::customer_id.eq(customer_id))
            .filter(subscriptions::plan_id.eq(plan_id))
            .filter(subscriptions::status.eq_any([
                SubscriptionStatus::Active.as_str(),
                SubscriptionStatus::Suspended.as_str(),
            ]))
            .set((
                subscriptions::status.eq(SubscriptionStatus::Cancelled.as_str()),
                subscriptions::end_date.eq(Some(ended_at)),
                subscriptions::updated_at.eq(Utc::now()),
            ))
            .returning(subscriptions::id)
            .get_results::<Uuid>(&mut conn)?;

        Ok(cancelled_ids)
    }
}
