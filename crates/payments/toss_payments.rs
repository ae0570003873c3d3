use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use reqwest::{
    StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use url::Url;

use crate::domain::{
    repositories::payment_gateway::PaymentGateway,
    value_objects::payments::{ChargeRequest, PaymentError, PaymentResult},
};

pub const DEFAULT_TOSS_API_BASE: &str = "https://api.tosspayments.com";
pub const DEFAULT_TOSS_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct TossPaymentsConfig {
    pub secret_key: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for TossPaymentsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TossPaymentsConfig")
            .field("secret_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Billing-key charges against the Toss Payments API.
pub struct TossPaymentsClient {
    http: reqwest::Client,
    api_base: Url,
    authorization: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BillingChargeBody<'a> {
    customer_key: &'a str,
    amount: i64,
    order_id: &'a str,
    order_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillingChargeResponse {
    payment_key: String,
    total_amount: i64,
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct TossErrorEnvelope {
    code: Option<String>,
    message: Option<String>,
}

impl TossPaymentsClient {
    pub fn new(config: TossPaymentsConfig) -> Result<Self> {
        let api_base = Url::parse(&config.api_base)
            .with_context(|| format!("invalid toss payments api base: {}", config.api_base))?;
        if api_base.cannot_be_a_base() {
            anyhow::bail!("toss payments api base cannot carry a path: {}", config.api_base);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build toss payments http client")?;

        Ok(Self {
            http,
            api_base,
            authorization: basic_authorization(&config.secret_key),
        })
    }

    fn billing_url(&self, billing_key: &str) -> Result<Url, PaymentError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| PaymentError::Transport("api base cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["v1", "billing", billing_key]);
        Ok(url)
    }

    async fn ensure_success(
        resp: reqwest::Response,
        order_id: &str,
    ) -> Result<reqwest::Response, PaymentError> {
        let status = resp.status();
        // Toss answers a completed billing charge with 200 only.
        if status == StatusCode::OK {
            return Ok(resp);
        }

        let body = match resp.text().await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => "<empty response body>".to_string(),
            Err(err) => format!("<failed to read response body: {err}>"),
        };

        let (code, message) = match serde_json::from_str::<TossErrorEnvelope>(&body) {
            Ok(envelope) => (envelope.code, envelope.message.unwrap_or_else(|| body.clone())),
            Err(_) => (None, body),
        };

        error!(
            status = %status,
            toss_error_code = ?code,
            toss_error_message = %message,
            order_id = %order_id,
            "toss_payments: billing charge rejected"
        );

        Err(PaymentError::Gateway {
            status: status.as_u16(),
            code,
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for TossPaymentsClient {
    async fn charge(&self, request: ChargeRequest) -> Result<PaymentResult, PaymentError> {
        let billing_key = match request.billing_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => {
                warn!(
                    order_id = %request.order_id,
                    "toss_payments: charge skipped, billing key missing"
                );
                return Err(PaymentError::MissingCredential);
            }
        };

        let url = self.billing_url(billing_key)?;
        let body = BillingChargeBody {
            customer_key: &request.customer_key,
            amount: request.amount,
            order_id: &request.order_id,
            order_name: &request.order_name,
            customer_email: request.customer_email.as_deref(),
            customer_name: request.customer_name.as_deref(),
        };

        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(err, &request.order_id))?;

        let resp = Self::ensure_success(resp, &request.order_id).await?;

        let parsed: BillingChargeResponse = resp.json().await.map_err(|err| {
            error!(
                order_id = %request.order_id,
                error = %err,
                "toss_payments: unreadable charge response"
            );
            PaymentError::InvalidResponse(err.to_string())
        })?;

        Ok(PaymentResult {
            payment_key: parsed.payment_key,
            total_amount: parsed.total_amount,
            order_id: parsed.order_id,
        })
    }
}

fn basic_authorization(secret_key: &str) -> String {
    format!("Basic {}", BASE64_STANDARD.encode(format!("{secret_key}:")))
}

// reqwest error display includes the url, which carries the billing key.
fn transport_error(err: reqwest::Error, order_id: &str) -> PaymentError {
    if err.is_timeout() {
        error!(order_id = %order_id, "toss_payments: charge timed out");
        return PaymentError::Timeout;
    }

    let err = err.without_url();
    error!(order_id = %order_id, error = %err, "toss_payments: transport failure");
    PaymentError::Transport(err.to_string())
}
