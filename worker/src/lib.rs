pub mod axum_http;
pub mod billing_scheduler;
pub mod config;
pub mod usecases;

#[cfg(test)]
pub(crate) mod test_support;
