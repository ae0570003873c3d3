use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Subscription state mirrored onto the user account.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserSubscriptionStatus {
    Active,
    #[default]
    Inactive,
    Suspended,
    Cancelled,
    Expired,
}

impl UserSubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserSubscriptionStatus::Active => "active",
            UserSubscriptionStatus::Inactive => "inactive",
            UserSubscriptionStatus::Suspended => "suspended",
            UserSubscriptionStatus::Cancelled => "cancelled",
            UserSubscriptionStatus::Expired => "expired",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "active" => Some(UserSubscriptionStatus::Active),
            "inactive" => Some(UserSubscriptionStatus::Inactive),
            "suspended" => Some(UserSubscriptionStatus::Suspended),
            "cancelled" => Some(UserSubscriptionStatus::Cancelled),
            "expired" => Some(UserSubscriptionStatus::Expired),
            _ => None,
        }
    }
}

impl Display for UserSubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
