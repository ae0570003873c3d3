pub mod billing_cycles;
pub mod history_actions;
pub mod payment_attempt_statuses;
pub mod subscription_statuses;
pub mod user_subscription_statuses;
