use async_trait::async_trait;
use mockall::automock;

use crate::domain::value_objects::payments::{ChargeRequest, PaymentError, PaymentResult};

/// Executes exactly one off-session charge per call. Implementations never retry;
/// retry bookkeeping belongs to the billing scheduler.
#[async_trait]
#[automock]
pub trait PaymentGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<PaymentResult, PaymentError>;
}
