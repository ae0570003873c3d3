use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::entities::{
    subscription_histories::SubscriptionHistoryEntity, subscriptions::SubscriptionEntity,
};
use crate::domain::value_objects::{
    enums::payment_attempt_statuses::PaymentAttemptStatus, payments::PaymentResult,
};

/// One element of `subscriptions.payment_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub date: DateTime<Utc>,
    pub status: PaymentAttemptStatus,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub payment_key: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: Option<i32>,
}

impl PaymentAttempt {
    pub fn succeeded(payment: &PaymentResult, at: DateTime<Utc>) -> Self {
        Self {
            date: at,
            status: PaymentAttemptStatus::Success,
            amount: Some(payment.total_amount),
            payment_key: Some(payment.payment_key.clone()),
            order_id: Some(payment.order_id.clone()),
            error: None,
            retry_count: None,
        }
    }

    pub fn failed(error: &str, retry_count: i32, at: DateTime<Utc>) -> Self {
        Self {
            date: at,
            status: PaymentAttemptStatus::Failed,
            amount: None,
            payment_key: None,
            order_id: None,
            error: Some(error.to_string()),
            retry_count: Some(retry_count),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActiveSubscriptionDto {
    pub subscription_id: Uuid,
    pub customer_id: Uuid,
    pub plan_name: String,
    pub price: i64,
    pub next_billing_date: DateTime<Utc>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub retry_count: i32,
}

impl From<SubscriptionEntity> for ActiveSubscriptionDto {
    fn from(value: SubscriptionEntity) -> Self {
        Self {
            subscription_id: value.id,
            customer_id: value.customer_id,
            plan_name: value.plan_name,
            price: value.price,
            next_billing_date: value.next_billing_date,
            last_payment_date: value.last_payment_date,
            retry_count: value.retry_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpcomingSubscriptionDto {
    pub subscription_id: Uuid,
    pub customer_id: Uuid,
    pub plan_name: String,
    pub price: i64,
    pub next_billing_date: DateTime<Utc>,
    pub hours_until_billing: i64,
}

impl UpcomingSubscriptionDto {
    pub fn from_entity(value: SubscriptionEntity, now: DateTime<Utc>) -> Self {
        let seconds = (value.next_billing_date - now).num_seconds();
        Self {
            subscription_id: value.id,
            customer_id: value.customer_id,
            plan_name: value.plan_name,
            price: value.price,
            next_billing_date: value.next_billing_date,
            hours_until_billing: (seconds as f64 / 3600.0).round() as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscriptionHistoryDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub action: String,
    pub description: String,
    pub amount: Option<i64>,
    pub currency: String,
    pub payment_key: Option<String>,
    pub order_id: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl From<SubscriptionHistoryEntity> for SubscriptionHistoryDto {
    fn from(value: SubscriptionHistoryEntity) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            subscription_id: value.subscription_id,
            action: value.action,
            description: value.description,
            amount: value.amount,
            currency: value.currency,
            payment_key: value.payment_key,
            order_id: value.order_id,
            status: value.status,
            error_message: value.error_message,
            metadata: value.metadata,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubscriptionDiagnosticsDto {
    pub subscription_id: Uuid,
    pub customer_id: Uuid,
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub next_billing_date: DateTime<Utc>,
    pub checked_at: DateTime<Utc>,
    pub days_since_start: i64,
    pub days_until_billing: i64,
    pub overdue: bool,
    /// One billing month after `start_date`; differs from `next_billing_date` once the anchor drifted.
    pub expected_next_from_start: DateTime<Utc>,
    pub billing_key_present: bool,
    pub retry_count: i32,
    pub payment_attempts: usize,
    /// Owner's billing projection; `None` when the user row is missing.
    pub user_is_premium: Option<bool>,
    pub user_subscription_status: Option<String>,
    pub recent_history: Vec<SubscriptionHistoryDto>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn payment_attempt_json_round_trips_through_serde() {
        let at = Utc.with_ymd_and_hms(2026, 1, 31, 6, 0, 0).unwrap();
        let attempt = PaymentAttempt::failed("card declined", 2, at);

        let encoded = attempt.to_json().unwrap();
        let parsed: PaymentAttempt = serde_json::from_value(encoded.clone()).unwrap();

        assert_eq!(parsed, attempt);
        assert_eq!(encoded["status"], "failed");
        assert_eq!(encoded["retry_count"], 2);
        assert!(encoded["payment_key"].is_null());
    }

    #[test]
    fn legacy_entries_without_optional_fields_still_parse() {
        let parsed: PaymentAttempt = serde_json::from_value(json!({
            "date": "2025-11-26T06:00:00Z",
            "status": "success",
        }))
        .unwrap();

        assert_eq!(parsed.status, PaymentAttemptStatus::Success);
        assert!(parsed.amount.is_none());
    }

    #[test]
    fn hours_until_billing_is_rounded() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let subscription = crate::domain::value_objects::billing_cycle::tests::sample_subscription(
            now + chrono::Duration::minutes(150),
        );

        let dto = UpcomingSubscriptionDto::from_entity(subscription, now);

        assert_eq!(dto.hours_until_billing, 3);
    }
}
