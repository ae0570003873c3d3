use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Duration, Utc};
use crates::domain::{
    entities::{
        subscription_histories::InsertSubscriptionHistoryEntity, subscriptions::SubscriptionEntity,
    },
    repositories::{
        payment_gateway::PaymentGateway, subscription_histories::SubscriptionHistoryRepository,
        subscriptions::SubscriptionRepository, users::UserAccountRepository,
    },
    value_objects::{
        billing_cycle::{BillingCycleEngine, MAX_RETRY_COUNT},
        enums::{
            history_actions::HistoryAction, payment_attempt_statuses::PaymentAttemptStatus,
            user_subscription_statuses::UserSubscriptionStatus,
        },
        payments::{ChargeRequest, PaymentResult},
        subscriptions::{
            ActiveSubscriptionDto, SubscriptionDiagnosticsDto, SubscriptionHistoryDto,
            UpcomingSubscriptionDto,
        },
    },
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const FREE_TRIAL_PLAN_ID: &str = "premium_trial";
pub const BILLING_CURRENCY: &str = "KRW";
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;
pub const MAX_HISTORY_LIMIT: i64 = 100;
pub const DIAGNOSTICS_HISTORY_LIMIT: i64 = 5;
pub const UPCOMING_WINDOW_HOURS: i64 = 24;

const HISTORY_SOURCE: &str = "scheduler";
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("billing store operation failed: {0:#}")]
    Persistence(#[from] anyhow::Error),
    #[error("subscription {0} not found")]
    SubscriptionNotFound(Uuid),
}

/// Outcome of one charging pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Another charging pass held the lock; nothing was selected.
    pub skipped: bool,
    pub selected: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub suspended: usize,
    /// Cancelled subscriptions expired by the trailing grace reconciliation.
    pub expired: usize,
}

impl PassReport {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Outcome of a grace-period or free-trial sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub selected: usize,
    pub processed: usize,
    pub failed: usize,
}

struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Monthly,
    Retry,
}

impl PassKind {
    fn as_str(self) -> &'static str {
        match self {
            PassKind::Monthly => "monthly_billing",
            PassKind::Retry => "failed_payment_retry",
        }
    }
}

pub struct SubscriptionBillingUseCase {
    subscription_repository: Arc<dyn SubscriptionRepository + Send + Sync>,
    user_repository: Arc<dyn UserAccountRepository + Send + Sync>,
    history_repository: Arc<dyn SubscriptionHistoryRepository + Send + Sync>,
    payment_gateway: Arc<dyn PaymentGateway + Send + Sync>,
    engine: BillingCycleEngine,
    charging: AtomicBool,
}

impl SubscriptionBillingUseCase {
    pub fn new(
        subscription_repository: Arc<dyn SubscriptionRepository + Send + Sync>,
        user_repository: Arc<dyn UserAccountRepository + Send + Sync>,
        history_repository: Arc<dyn SubscriptionHistoryRepository + Send + Sync>,
        payment_gateway: Arc<dyn PaymentGateway + Send + Sync>,
        engine: BillingCycleEngine,
    ) -> Self {
        Self {
            subscription_repository,
            user_repository,
            history_repository,
            payment_gateway,
            engine,
            charging: AtomicBool::new(false),
        }
    }

    /// True while a monthly or retry pass holds the single-flight lock.
    pub fn is_running(&self) -> bool {
        self.charging.load(Ordering::Acquire)
    }

    /// Charges every active auto-renewing subscription whose billing date has passed,
    /// then expires cancelled subscriptions past their grace period.
    pub async fn run_monthly_billing_pass(
        &self,
        now: DateTime<Utc>,
    ) -> Result<PassReport, BillingError> {
        let Some(_guard) = PassGuard::try_acquire(&self.charging) else {
            info!("subscription_billing: monthly pass skipped, another pass is running");
            return Ok(PassReport::skipped());
        };

        let due = self.subscription_repository.list_due_for_billing(now).await?;
        let mut report = self.charge_all(PassKind::Monthly, due, now).await?;

        let reconciliation = self.run_grace_period_reconciliation(now).await?;
        report.expired = reconciliation.processed;

        info!(
            selected = report.selected,
            succeeded = report.succeeded,
            failed = report.failed,
            suspended = report.suspended,
            expired = report.expired,
            "subscription_billing: monthly pass completed"
        );

        Ok(report)
    }

    /// Retries suspended subscriptions whose last attempt is older than the cooldown.
    pub async fn run_failed_retry_pass(
        &self,
        now: DateTime<Utc>,
    ) -> Result<PassReport, BillingError> {
        let Some(_guard) = PassGuard::try_acquire(&self.charging) else {
            info!("subscription_billing: retry pass skipped, another pass is running");
            return Ok(PassReport::skipped());
        };

        let cutoff = self.engine.retry_cutoff(now);
        let eligible = self
            .subscription_repository
            .list_retry_eligible(cutoff, MAX_RETRY_COUNT)
            .await?;
        let report = self.charge_all(PassKind::Retry, eligible, now).await?;

        info!(
            selected = report.selected,
            succeeded = report.succeeded,
            failed = report.failed,
            suspended = report.suspended,
            "subscription_billing: retry pass completed"
        );

        Ok(report)
    }

    pub async fn run_grace_period_reconciliation(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationReport, BillingError> {
        let cancelled = self
            .subscription_repository
            .list_grace_period_expired(now)
            .await?;

        let mut report = ReconciliationReport {
            selected: cancelled.len(),
            ..Default::default()
        };

        for subscription in cancelled {
            match self.expire_subscription(&subscription, now).await {
                Ok(()) => report.processed += 1,
                Err(err) => {
                    error!(
                        subscription_id = %subscription.id,
                        customer_id = %subscription.customer_id,
                        error = ?err,
                        "subscription_billing: grace period expiry failed"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.selected > 0 {
            info!(
                selected = report.selected,
                expired = report.processed,
                failed = report.failed,
                "subscription_billing: grace period reconciliation completed"
            );
        }

        Ok(report)
    }

    /// Ends free trials whose end date falls on today's calendar day in the billing time zone.
    pub async fn run_free_trial_expiry(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationReport, BillingError> {
        let Some((day_start, day_end)) = self.engine.day_window(now) else {
            warn!(now = %now, "subscription_billing: no calendar day window, free trial sweep skipped");
            return Ok(ReconciliationReport::default());
        };

        let users = self
            .user_repository
            .list_free_trials_ending_between(day_start, day_end)
            .await?;

        let mut report = ReconciliationReport {
            selected: users.len(),
            ..Default::default()
        };

        for user in users {
            match self.end_free_trial(user.id, now).await {
                Ok(()) => report.processed += 1,
                Err(err) => {
                    error!(
                        user_id = %user.id,
                        error = ?err,
                        "subscription_billing: free trial expiry failed"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            selected = report.selected,
            ended = report.processed,
            failed = report.failed,
            "subscription_billing: free trial expiry completed"
        );

        Ok(report)
    }

    pub async fn count_active_subscriptions(&self) -> Result<usize, BillingError> {
        Ok(self
            .subscription_repository
            .list_active_auto_renew()
            .await?
            .len())
    }

    pub async fn list_active_subscriptions(
        &self,
    ) -> Result<Vec<ActiveSubscriptionDto>, BillingError> {
        let subscriptions = self.subscription_repository.list_active_auto_renew().await?;
        Ok(subscriptions
            .into_iter()
            .map(ActiveSubscriptionDto::from)
            .collect())
    }

    pub async fn list_recent_history(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<SubscriptionHistoryDto>, BillingError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);

        let entries = self.history_repository.list_recent(limit).await?;
        Ok(entries
            .into_iter()
            .map(SubscriptionHistoryDto::from)
            .collect())
    }

    /// Active subscriptions billing within the next 24 hours.
    pub async fn list_upcoming(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<UpcomingSubscriptionDto>, BillingError> {
        let until = now + Duration::hours(UPCOMING_WINDOW_HOURS);
        let subscriptions = self
            .subscription_repository
            .list_billing_between(now, until)
            .await?;

        Ok(subscriptions
            .into_iter()
            .map(|subscription| UpcomingSubscriptionDto::from_entity(subscription, now))
            .collect())
    }

    pub async fn diagnose_subscription(
        &self,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<SubscriptionDiagnosticsDto, BillingError> {
        let subscription = self
            .subscription_repository
            .find_by_id(subscription_id)
            .await?
            .ok_or(BillingError::SubscriptionNotFound(subscription_id))?;

        let owner = self
            .user_repository
            .find_by_id(subscription.customer_id)
            .await?;

        let recent_history = self
            .history_repository
            .list_by_subscription(subscription_id, DIAGNOSTICS_HISTORY_LIMIT)
            .await?
            .into_iter()
            .map(SubscriptionHistoryDto::from)
            .collect();

        let until_billing = (subscription.next_billing_date - now).num_seconds();

        Ok(SubscriptionDiagnosticsDto {
            subscription_id: subscription.id,
            customer_id: subscription.customer_id,
            status: subscription.status.clone(),
            start_date: subscription.start_date,
            next_billing_date: subscription.next_billing_date,
            checked_at: now,
            days_since_start: (now - subscription.start_date).num_days(),
            days_until_billing: (until_billing + SECONDS_PER_DAY - 1).div_euclid(SECONDS_PER_DAY),
            overdue: subscription.next_billing_date < now,
            expected_next_from_start: self.engine.next_billing_date(subscription.start_date),
            billing_key_present: subscription.has_billing_key(),
            retry_count: subscription.retry_count,
            payment_attempts: subscription.payment_attempts().len(),
            user_is_premium: owner.as_ref().map(|user| user.is_premium),
            user_subscription_status: owner.map(|user| user.subscription_status),
            recent_history,
        })
    }

    async fn charge_all(
        &self,
        kind: PassKind,
        subscriptions: Vec<SubscriptionEntity>,
        now: DateTime<Utc>,
    ) -> Result<PassReport, BillingError> {
        let mut report = PassReport {
            selected: subscriptions.len(),
            ..Default::default()
        };

        info!(
            pass = kind.as_str(),
            selected = report.selected,
            "subscription_billing: pass started"
        );

        for subscription in subscriptions {
            self.charge_subscription(kind, subscription, now, &mut report)
                .await?;
        }

        Ok(report)
    }

    async fn charge_subscription(
        &self,
        kind: PassKind,
        mut subscription: SubscriptionEntity,
        now: DateTime<Utc>,
        report: &mut PassReport,
    ) -> Result<(), BillingError> {
        let request = ChargeRequest::for_subscription(&subscription, now);
        let order_id = request.order_id.clone();

        match self.payment_gateway.charge(request).await {
            Ok(payment) => {
                self.engine.apply_success(&mut subscription, &payment, now)?;
                self.subscription_repository
                    .save_billing_state(&subscription)
                    .await?;

                let user_updated = self
                    .user_repository
                    .record_payment_success(
                        subscription.customer_id,
                        now,
                        subscription.next_billing_date,
                    )
                    .await?;
                if !user_updated {
                    warn!(
                        subscription_id = %subscription.id,
                        customer_id = %subscription.customer_id,
                        "subscription_billing: owning user missing, projection not updated"
                    );
                }

                self.append_history(payment_success_entry(&subscription, &payment))
                    .await;

                info!(
                    pass = kind.as_str(),
                    subscription_id = %subscription.id,
                    order_id = %payment.order_id,
                    amount = payment.total_amount,
                    next_billing_date = %subscription.next_billing_date,
                    "subscription_billing: charge succeeded"
                );
                report.succeeded += 1;
            }
            Err(err) => {
                let message = err.to_string();
                let outcome = self.engine.apply_failure(&mut subscription, &message, now)?;
                self.subscription_repository
                    .save_billing_state(&subscription)
                    .await?;

                warn!(
                    pass = kind.as_str(),
                    subscription_id = %subscription.id,
                    order_id = %order_id,
                    error_kind = err.kind(),
                    error = %message,
                    retry_count = outcome.retry_count,
                    suspended = outcome.suspended,
                    "subscription_billing: charge failed"
                );
                report.failed += 1;

                if outcome.suspended {
                    let user_updated = self
                        .user_repository
                        .update_subscription_status(
                            subscription.customer_id,
                            UserSubscriptionStatus::Suspended,
                        )
                        .await?;
                    if !user_updated {
                        warn!(
                            subscription_id = %subscription.id,
                            customer_id = %subscription.customer_id,
                            "subscription_billing: owning user missing, suspension not mirrored"
                        );
                    }
                    report.suspended += 1;
                }

                self.append_history(payment_failed_entry(&subscription, &order_id, &message))
                    .await;

                if outcome.suspended {
                    self.append_history(subscription_suspended_entry(&subscription))
                        .await;
                }
            }
        }

        Ok(())
    }

    async fn expire_subscription(
        &self,
        subscription: &SubscriptionEntity,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let ended_at = subscription.grace_period_end_date.unwrap_or(now);

        // User before subscription; the row stays selectable until mark_expired lands.
        let user_updated = self
            .user_repository
            .expire_premium(subscription.customer_id, ended_at)
            .await?;
        if !user_updated {
            warn!(
                subscription_id = %subscription.id,
                customer_id = %subscription.customer_id,
                "subscription_billing: owning user missing, expiry not mirrored"
            );
        }

        self.subscription_repository
            .mark_expired(subscription.id)
            .await?;

        self.append_history(subscription_expired_entry(subscription))
            .await;

        Ok(())
    }

    async fn end_free_trial(&self, user_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<()> {
        // Subscriptions before the user; the user stays selectable until demoted.
        let cancelled = self
            .subscription_repository
            .cancel_by_customer_and_plan(user_id, FREE_TRIAL_PLAN_ID, now)
            .await?;

        let user_updated = self.user_repository.end_free_trial(user_id).await?;
        if !user_updated {
            warn!(user_id = %user_id, "subscription_billing: trial user vanished before demotion");
        }

        for subscription_id in cancelled {
            self.append_history(free_trial_ended_entry(user_id, subscription_id))
                .await;
        }

        Ok(())
    }

    async fn append_history(&self, entry: InsertSubscriptionHistoryEntity) {
        let subscription_id = entry.subscription_id;
        let action = entry.action.clone();

        if let Err(err) = self.history_repository.append(entry).await {
            error!(
                subscription_id = %subscription_id,
                action = %action,
                error = ?err,
                "subscription_billing: history write failed"
            );
        }
    }
}

fn billing_metadata(subscription: &SubscriptionEntity) -> Value {
    json!({
        "plan_id": subscription.plan_id,
        "plan_name": subscription.plan_name,
        "billing_cycle": subscription.billing_cycle,
        "retry_count": subscription.retry_count,
        "source": HISTORY_SOURCE,
    })
}

fn history_entry(
    subscription: &SubscriptionEntity,
    action: HistoryAction,
    status: PaymentAttemptStatus,
    description: String,
) -> InsertSubscriptionHistoryEntity {
    InsertSubscriptionHistoryEntity {
        user_id: subscription.customer_id,
        subscription_id: subscription.id,
        action: action.to_string(),
        description,
        amount: None,
        currency: BILLING_CURRENCY.to_string(),
        payment_key: None,
        order_id: None,
        status: status.to_string(),
        error_message: None,
        metadata: billing_metadata(subscription),
    }
}

fn payment_success_entry(
    subscription: &SubscriptionEntity,
    payment: &PaymentResult,
) -> InsertSubscriptionHistoryEntity {
    InsertSubscriptionHistoryEntity {
        amount: Some(payment.total_amount),
        payment_key: Some(payment.payment_key.clone()),
        order_id: Some(payment.order_id.clone()),
        ..history_entry(
            subscription,
            HistoryAction::PaymentSuccess,
            PaymentAttemptStatus::Success,
            format!("{} monthly payment succeeded", subscription.plan_name),
        )
    }
}

fn payment_failed_entry(
    subscription: &SubscriptionEntity,
    order_id: &str,
    message: &str,
) -> InsertSubscriptionHistoryEntity {
    InsertSubscriptionHistoryEntity {
        amount: Some(subscription.price),
        order_id: Some(order_id.to_string()),
        error_message: Some(message.to_string()),
        ..history_entry(
            subscription,
            HistoryAction::PaymentFailed,
            PaymentAttemptStatus::Failed,
            format!(
                "{} monthly payment failed (attempt {}/{})",
                subscription.plan_name, subscription.retry_count, MAX_RETRY_COUNT
            ),
        )
    }
}

fn subscription_suspended_entry(subscription: &SubscriptionEntity) -> InsertSubscriptionHistoryEntity {
    history_entry(
        subscription,
        HistoryAction::SubscriptionSuspended,
        PaymentAttemptStatus::Failed,
        format!(
            "subscription suspended after {} failed payments",
            subscription.retry_count
        ),
    )
}

fn subscription_expired_entry(subscription: &SubscriptionEntity) -> InsertSubscriptionHistoryEntity {
    history_entry(
        subscription,
        HistoryAction::SubscriptionExpired,
        PaymentAttemptStatus::Success,
        "subscription expired after grace period".to_string(),
    )
}

fn free_trial_ended_entry(user_id: Uuid, subscription_id: Uuid) -> InsertSubscriptionHistoryEntity {
    InsertSubscriptionHistoryEntity {
        user_id,
        subscription_id,
        action: HistoryAction::FreeTrialEnded.to_string(),
        description: "free trial ended".to_string(),
        amount: None,
        currency: BILLING_CURRENCY.to_string(),
        payment_key: None,
        order_id: None,
        status: PaymentAttemptStatus::Success.to_string(),
        error_message: None,
        metadata: json!({
            "plan_id": FREE_TRIAL_PLAN_ID,
            "source": HISTORY_SOURCE,
        }),
    }
}
