use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::value_objects::{
    enums::subscription_statuses::SubscriptionStatus, subscriptions::PaymentAttempt,
};
use crate::infra::db::postgres::schema::subscriptions;

#[derive(Debug, Clone, PartialEq, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub plan_id: String,
    pub plan_name: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub price: i64,
    pub billing_cycle: String,
    pub billing_key: Option<String>,
    pub status: String,
    pub auto_renew: bool,
    pub start_date: DateTime<Utc>,
    pub next_billing_date: DateTime<Utc>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub last_payment_attempt: Option<DateTime<Utc>>,
    pub grace_period_end_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub payment_history: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionEntity {
    pub fn subscription_status(&self) -> Option<SubscriptionStatus> {
        SubscriptionStatus::from_str(&self.status)
    }

    pub fn has_billing_key(&self) -> bool {
        self.billing_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// Appends to `payment_history`. Existing entries are never rewritten.
    pub fn append_payment_attempt(&mut self, attempt: &PaymentAttempt) -> Result<()> {
        let entry = attempt
            .to_json()
            .context("failed to encode payment attempt")?;
        match self.payment_history.as_array_mut() {
            Some(entries) => entries.push(entry),
            None => self.payment_history = Value::Array(vec![entry]),
        }
        Ok(())
    }

    /// Entries that fail to deserialize are skipped.
    pub fn payment_attempts(&self) -> Vec<PaymentAttempt> {
        self.payment_history
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Columns owned by the billing scheduler. Written back as one UPDATE per attempt.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = subscriptions, treat_none_as_null = true)]
pub struct SubscriptionBillingChangeset {
    pub status: String,
    pub next_billing_date: DateTime<Utc>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub last_payment_attempt: Option<DateTime<Utc>>,
    pub suspended_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub payment_history: Value,
    pub updated_at: DateTime<Utc>,
}

impl From<&SubscriptionEntity> for SubscriptionBillingChangeset {
    fn from(subscription: &SubscriptionEntity) -> Self {
        Self {
            status: subscription.status.clone(),
            next_billing_date: subscription.next_billing_date,
            last_payment_date: subscription.last_payment_date,
            last_payment_attempt: subscription.last_payment_attempt,
            suspended_at: subscription.suspended_at,
            retry_count: subscription.retry_count,
            payment_history: subscription.payment_history.clone(),
            updated_at: Utc::now(),
        }
    }
}
