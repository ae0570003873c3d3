pub mod subscription_histories;
pub mod subscriptions;
pub mod users;
