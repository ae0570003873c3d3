use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::{sync::watch, task::JoinSet};
use tracing::{error, info, warn};

use super::trigger::CronTrigger;
use crate::{
    config::{config_model::Billing, stage::Stage},
    usecases::subscription_billing::SubscriptionBillingUseCase,
};

pub const ACCELERATED_BILLING_CRON: &str = "0 * * * * *";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingJob {
    MonthlyBilling,
    FailedPaymentRetry,
    FreeTrialExpiry,
}

impl BillingJob {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingJob::MonthlyBilling => "monthly_billing",
            BillingJob::FailedPaymentRetry => "failed_payment_retry",
            BillingJob::FreeTrialExpiry => "free_trial_expiry",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub trigger: CronTrigger,
    pub job: BillingJob,
}

/// Drives the billing passes from cron triggers until `stop` is called.
pub struct BillingScheduler {
    usecase: Arc<SubscriptionBillingUseCase>,
    jobs: Vec<ScheduledJob>,
    shutdown_tx: watch::Sender<bool>,
}

impl BillingScheduler {
    pub fn new(usecase: Arc<SubscriptionBillingUseCase>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            usecase,
            jobs: Vec::new(),
            shutdown_tx,
        }
    }

    pub fn from_config(
        usecase: Arc<SubscriptionBillingUseCase>,
        billing: &Billing,
        stage: Stage,
    ) -> Result<Self> {
        let tz = billing.timezone;
        let mut scheduler = Self::new(usecase);

        scheduler.schedule(
            CronTrigger::new("monthly_billing", &billing.monthly_cron, tz)?,
            BillingJob::MonthlyBilling,
        );
        scheduler.schedule(
            CronTrigger::new("failed_payment_retry", &billing.retry_cron, tz)?,
            BillingJob::FailedPaymentRetry,
        );
        scheduler.schedule(
            CronTrigger::new("free_trial_expiry", &billing.free_trial_cron, tz)?,
            BillingJob::FreeTrialExpiry,
        );

        if stage.runs_accelerated_billing() {
            scheduler.schedule(
                CronTrigger::new("accelerated_billing", ACCELERATED_BILLING_CRON, tz)?,
                BillingJob::MonthlyBilling,
            );
        }

        Ok(scheduler)
    }

    pub fn schedule(&mut self, trigger: CronTrigger, job: BillingJob) {
        self.jobs.push(ScheduledJob { trigger, job });
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    pub async fn run(&self) -> Result<()> {
        let mut loops = JoinSet::new();

        for scheduled in &self.jobs {
            info!(
                trigger = scheduled.trigger.name(),
                cron = scheduled.trigger.expression(),
                job = scheduled.job.as_str(),
                "billing_scheduler: trigger registered"
            );
            loops.spawn(trigger_loop(
                Arc::clone(&self.usecase),
                scheduled.clone(),
                self.shutdown_tx.subscribe(),
            ));
        }

        while let Some(joined) = loops.join_next().await {
            joined?;
        }

        info!("billing_scheduler: stopped");
        Ok(())
    }

    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

async fn trigger_loop(
    usecase: Arc<SubscriptionBillingUseCase>,
    scheduled: ScheduledJob,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut last_fired: Option<DateTime<Utc>> = None;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let now = Utc::now();
        // Wall clock may lag the timer; never fire the same slot twice.
        let after = last_fired.map_or(now, |fired| fired.max(now));
        let Some(fire_at) = scheduled.trigger.next_fire_after(after) else {
            warn!(
                trigger = scheduled.trigger.name(),
                "billing_scheduler: trigger has no upcoming fire time"
            );
            break;
        };
        let wait = (fire_at - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        last_fired = Some(fire_at);
        if let Err(err) = run_job(&usecase, scheduled.job, Utc::now()).await {
            error!(
                trigger = scheduled.trigger.name(),
                job = scheduled.job.as_str(),
                error = ?err,
                "billing_scheduler: pass failed"
            );
        }
    }
}

/// Runs one pass as of `now` and logs its report.
pub async fn run_job(
    usecase: &SubscriptionBillingUseCase,
    job: BillingJob,
    now: DateTime<Utc>,
) -> Result<()> {
    match job {
        BillingJob::MonthlyBilling => {
            let report = usecase.run_monthly_billing_pass(now).await?;
            info!(job = job.as_str(), report = ?report, "billing_scheduler: job finished");
        }
        BillingJob::FailedPaymentRetry => {
            let report = usecase.run_failed_retry_pass(now).await?;
            info!(job = job.as_str(), report = ?report, "billing_scheduler: job finished");
        }
        BillingJob::FreeTrialExpiry => {
            let report = usecase.run_free_trial_expiry(now).await?;
            info!(job = job.as_str(), report = ?report, "billing_scheduler: job finished");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::config_loader::{DEFAULT_FREE_TRIAL_CRON, DEFAULT_MONTHLY_CRON, DEFAULT_RETRY_CRON},
        test_support::{InMemoryBillingStore, ScriptedGateway, billing_usecase, premium_user, subscription_due},
    };
    use chrono::Duration;
    use uuid::Uuid;

    fn billing_config() -> Billing {
        Billing {
            timezone: chrono_tz::Asia::Seoul,
            monthly_cron: DEFAULT_MONTHLY_CRON.to_string(),
            retry_cron: DEFAULT_RETRY_CRON.to_string(),
            free_trial_cron: DEFAULT_FREE_TRIAL_CRON.to_string(),
            internal_token: None,
        }
    }

    fn idle_usecase() -> Arc<SubscriptionBillingUseCase> {
        Arc::new(billing_usecase(
            &InMemoryBillingStore::new(),
            &ScriptedGateway::new(),
        ))
    }

    #[test]
    fn production_registers_the_three_billing_triggers() {
        let scheduler =
            BillingScheduler::from_config(idle_usecase(), &billing_config(), Stage::Production)
                .unwrap();

        let names: Vec<_> = scheduler.jobs().iter().map(|j| j.trigger.name()).collect();
        assert_eq!(
            names,
            vec!["monthly_billing", "failed_payment_retry", "free_trial_expiry"]
        );
    }

    #[test]
    fn development_adds_accelerated_billing() {
        let scheduler =
            BillingScheduler::from_config(idle_usecase(), &billing_config(), Stage::Development)
                .unwrap();

        let accelerated = scheduler.jobs().last().unwrap();
        assert_eq!(accelerated.trigger.name(), "accelerated_billing");
        assert_eq!(accelerated.job, BillingJob::MonthlyBilling);
    }

    #[test]
    fn invalid_configured_cron_fails_startup() {
        let mut billing = billing_config();
        billing.retry_cron = "15:10 daily".to_string();

        assert!(BillingScheduler::from_config(idle_usecase(), &billing, Stage::Production).is_err());
    }

    #[tokio::test]
    async fn stop_ends_all_trigger_loops() {
        let scheduler = Arc::new(
            BillingScheduler::from_config(idle_usecase(), &billing_config(), Stage::Local).unwrap(),
        );
        let running = tokio::spawn({
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.run().await }
        });
        tokio::task::yield_now().await;

        scheduler.stop();

        let finished = tokio::time::timeout(std::time::Duration::from_secs(2), running).await;
        assert!(finished.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn run_job_dispatches_monthly_pass() {
        let now = Utc::now();
        let store = InMemoryBillingStore::new();
        let gateway = ScriptedGateway::new();
        let due = subscription_due(Uuid::new_v4(), now - Duration::hours(1));
        store.insert_user(premium_user(due.customer_id));
        store.insert_subscription(due.clone());
        let usecase = billing_usecase(&store, &gateway);

        run_job(&usecase, BillingJob::MonthlyBilling, now).await.unwrap();

        assert_eq!(gateway.calls().len(), 1);
        assert!(store.subscription(due.id).next_billing_date > due.next_billing_date);
    }
}
