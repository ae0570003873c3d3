pub mod payment_gateway;
pub mod subscription_histories;
pub mod subscriptions;
pub mod users;
