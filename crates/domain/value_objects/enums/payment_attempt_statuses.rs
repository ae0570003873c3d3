use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentAttemptStatus {
    Success,
    Failed,
}

impl PaymentAttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentAttemptStatus::Success => "success",
            PaymentAttemptStatus::Failed => "failed",
        }
    }
}

impl Display for PaymentAttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
