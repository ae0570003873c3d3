use chrono_tz::Tz;
use crates::payments::toss_payments::TossPaymentsConfig;

use super::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub worker_server: WorkerServer,
    pub database: Database,
    pub toss_payments: TossPaymentsConfig,
    pub billing: Billing,
}

#[derive(Debug, Clone)]
pub struct WorkerServer {
    pub port: u16,
    pub timeout: u64,
    pub body_limit: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone)]
pub struct Billing {
    pub timezone: Tz,
    pub monthly_cron: String,
    pub retry_cron: String,
    pub free_trial_cron: String,
    pub internal_token: Option<String>,
}

impl std::fmt::Debug for Billing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Billing")
            .field("timezone", &self.timezone)
            .field("monthly_cron", &self.monthly_cron)
            .field("retry_cron", &self.retry_cron)
            .field("free_trial_cron", &self.free_trial_cron)
            .field("internal_token", &self.internal_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
