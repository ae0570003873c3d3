pub mod billing_cycle;
pub mod enums;
pub mod payments;
pub mod subscriptions;
