pub mod subscription_billing;
