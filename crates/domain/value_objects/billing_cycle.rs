//! Calendar arithmetic and billing state transitions.
//!
//! Everything here is pure: callers pass `now` in and persist the mutated
//! [`SubscriptionEntity`] themselves.

use anyhow::Result;
use chrono::{DateTime, Duration, LocalResult, Months, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::domain::entities::subscriptions::SubscriptionEntity;
use crate::domain::value_objects::{
    enums::subscription_statuses::SubscriptionStatus, payments::PaymentResult,
    subscriptions::PaymentAttempt,
};

/// Consecutive failures after which a subscription is suspended.
pub const MAX_RETRY_COUNT: i32 = 3;

/// Minimum time between two charge attempts of a suspended subscription.
pub const RETRY_COOLDOWN_HOURS: i64 = 24;

pub const DEFAULT_BILLING_TIMEZONE: Tz = chrono_tz::Asia::Seoul;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub retry_count: i32,
    pub suspended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingCycleEngine {
    timezone: Tz,
}

impl Default for BillingCycleEngine {
    fn default() -> Self {
        Self::new(DEFAULT_BILLING_TIMEZONE)
    }
}

impl BillingCycleEngine {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// One calendar month after `reference` in the billing time zone, keeping the
    /// local time of day. A day-of-month missing from the target month clamps to
    /// its last day (Jan 31 -> Feb 28).
    pub fn next_billing_date(&self, reference: DateTime<Utc>) -> DateTime<Utc> {
        let local = reference.with_timezone(&self.timezone).naive_local();

        local
            .checked_add_months(Months::new(1))
            .and_then(|target| self.resolve_local(target))
            .filter(|next| *next > reference)
            .unwrap_or_else(|| reference + Duration::days(28))
    }

    /// `[start, end)` of the calendar day containing `now`, in the billing time zone.
    pub fn day_window(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let today = now.with_timezone(&self.timezone).date_naive();
        let start = self.resolve_local(today.and_time(NaiveTime::MIN))?;
        let end = self.resolve_local(today.succ_opt()?.and_time(NaiveTime::MIN))?;
        Some((start, end))
    }

    /// Latest `last_payment_attempt` that may be retried at `now`.
    pub fn retry_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(RETRY_COOLDOWN_HOURS)
    }

    /// Re-anchors the cycle on the moment the charge succeeded.
    pub fn apply_success(
        &self,
        subscription: &mut SubscriptionEntity,
        payment: &PaymentResult,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let previous = subscription.next_billing_date;
        let mut next = self.next_billing_date(now);
        if next <= previous {
            next = self.next_billing_date(previous);
        }

        subscription.last_payment_date = Some(now);
        subscription.next_billing_date = next;
        subscription.retry_count = 0;

        if subscription.subscription_status() == Some(SubscriptionStatus::Suspended) {
            subscription.status = SubscriptionStatus::Active.to_string();
            subscription.suspended_at = None;
        }

        subscription.append_payment_attempt(&PaymentAttempt::succeeded(payment, now))
    }

    /// `next_billing_date` is left untouched so the subscription stays due.
    pub fn apply_failure(
        &self,
        subscription: &mut SubscriptionEntity,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome> {
        let retry_count = (subscription.retry_count.max(0) + 1).min(MAX_RETRY_COUNT);

        subscription.retry_count = retry_count;
        subscription.last_payment_attempt = Some(now);
        subscription.append_payment_attempt(&PaymentAttempt::failed(error, retry_count, now))?;

        let suspended = retry_count >= MAX_RETRY_COUNT;
        if suspended {
            subscription.status = SubscriptionStatus::Suspended.to_string();
            subscription.suspended_at = Some(now);
        }

        Ok(FailureOutcome {
            retry_count,
            suspended,
        })
    }

    // Nonexistent local times (DST gap) move forward by an hour; ambiguous ones take the earlier instant.
    fn resolve_local(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.timezone.from_local_datetime(&naive) {
            LocalResult::Single(local) => Some(local.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => self
                .timezone
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
                .map(|local| local.with_timezone(&Utc)),
        }
    }
}
