use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::entities::subscriptions::SubscriptionEntity;

/// Input of one off-session charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub billing_key: Option<String>,
    pub customer_key: String,
    pub amount: i64,
    pub order_id: String,
    pub order_name: String,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
}

impl ChargeRequest {
    pub fn for_subscription(subscription: &SubscriptionEntity, attempted_at: DateTime<Utc>) -> Self {
        Self {
            billing_key: subscription
                .billing_key
                .clone()
                .filter(|key| !key.trim().is_empty()),
            customer_key: subscription.customer_id.to_string(),
            amount: subscription.price,
            order_id: order_id_for(subscription, attempted_at),
            order_name: format!("{} monthly subscription", subscription.plan_name),
            customer_email: subscription.customer_email.clone(),
            customer_name: subscription.customer_name.clone(),
        }
    }
}

/// `{customer}_{plan}_{unix millis}`; distinct for every attempt on the same subscription.
pub fn order_id_for(subscription: &SubscriptionEntity, attempted_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}",
        subscription.customer_id,
        subscription.plan_id,
        attempted_at.timestamp_millis()
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub payment_key: String,
    pub total_amount: i64,
    pub order_id: String,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("billing key is missing")]
    MissingCredential,
    #[error("payment gateway rejected the charge (status {status}): {message}")]
    Gateway {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("payment gateway timed out")]
    Timeout,
    #[error("payment gateway request failed: {0}")]
    Transport(String),
    #[error("payment gateway returned an unreadable response: {0}")]
    InvalidResponse(String),
}

impl PaymentError {
    pub fn kind(&self) -> &'static str {
        match self {
            PaymentError::MissingCredential => "missing_credential",
            PaymentError::Gateway { .. } => "gateway_error",
            PaymentError::Timeout => "timeout",
            PaymentError::Transport(_) => "transport_error",
            PaymentError::InvalidResponse(_) => "invalid_response",
        }
    }
}
