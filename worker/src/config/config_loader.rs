use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use crates::{
    domain::value_objects::billing_cycle::DEFAULT_BILLING_TIMEZONE,
    payments::toss_payments::{DEFAULT_TOSS_API_BASE, DEFAULT_TOSS_TIMEOUT_SECS, TossPaymentsConfig},
};

use super::{
    config_model::{Billing, Database, DotEnvyConfig, WorkerServer},
    stage::Stage,
};

pub const DEFAULT_MONTHLY_CRON: &str = "0 0 15 * * *";
pub const DEFAULT_RETRY_CRON: &str = "0 10 15 * * *";
pub const DEFAULT_FREE_TRIAL_CRON: &str = "0 0 0 * * *";

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();
    load_from(|key| std::env::var(key).ok())
}

fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<DotEnvyConfig> {
    let required = |key: &str| -> Result<String> {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .with_context(|| format!("{key} is invalid"))
    };
    let optional = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let stage = optional("STAGE")
        .map(|raw| Stage::try_from(raw.as_str()))
        .transpose()?
        .unwrap_or_default();

    let worker_server = WorkerServer {
        port: required("SERVER_PORT_WORKER")?
            .parse()
            .context("SERVER_PORT_WORKER is invalid")?,
        body_limit: required("SERVER_BODY_LIMIT")?
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: required("SERVER_TIMEOUT")?
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        max_connections: optional("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "5".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS is invalid")?,
    };

    let timeout_secs: u64 = optional("TOSS_PAYMENTS_TIMEOUT_SECS")
        .map(|raw| raw.parse())
        .transpose()
        .context("TOSS_PAYMENTS_TIMEOUT_SECS is invalid")?
        .unwrap_or(DEFAULT_TOSS_TIMEOUT_SECS);

    let toss_payments = TossPaymentsConfig {
        secret_key: required("TOSS_PAYMENTS_SECRET_KEY")?,
        api_base: optional("TOSS_PAYMENTS_API_BASE")
            .unwrap_or_else(|| DEFAULT_TOSS_API_BASE.to_string()),
        timeout: Duration::from_secs(timeout_secs),
    };

    let timezone = match optional("BILLING_TIMEZONE") {
        Some(raw) => raw
            .parse::<Tz>()
            .map_err(|err| anyhow::anyhow!("BILLING_TIMEZONE is invalid: {err}"))?,
        None => DEFAULT_BILLING_TIMEZONE,
    };

    let billing = Billing {
        timezone,
        monthly_cron: optional("BILLING_CRON_MONTHLY")
            .unwrap_or_else(|| DEFAULT_MONTHLY_CRON.to_string()),
        retry_cron: optional("BILLING_CRON_RETRY")
            .unwrap_or_else(|| DEFAULT_RETRY_CRON.to_string()),
        free_trial_cron: optional("BILLING_CRON_FREE_TRIAL")
            .unwrap_or_else(|| DEFAULT_FREE_TRIAL_CRON.to_string()),
        internal_token: optional("INTERNAL_BILLING_TOKEN"),
    };

    Ok(DotEnvyConfig {
        stage,
        worker_server,
        database,
        toss_payments,
        billing,
    })
}
