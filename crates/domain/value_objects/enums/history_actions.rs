use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Billing events recorded in `subscription_histories.action`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    PaymentSuccess,
    PaymentFailed,
    SubscriptionSuspended,
    SubscriptionExpired,
    FreeTrialEnded,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::PaymentSuccess => "payment_success",
            HistoryAction::PaymentFailed => "payment_failed",
            HistoryAction::SubscriptionSuspended => "subscription_suspended",
            HistoryAction::SubscriptionExpired => "subscription_expired",
            HistoryAction::FreeTrialEnded => "free_trial_ended",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "payment_success" => Some(HistoryAction::PaymentSuccess),
            "payment_failed" => Some(HistoryAction::PaymentFailed),
            "subscription_suspended" => Some(HistoryAction::SubscriptionSuspended),
            "subscription_expired" => Some(HistoryAction::SubscriptionExpired),
            "free_trial_ended" => Some(HistoryAction::FreeTrialEnded),
            _ => None,
        }
    }
}

impl Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
