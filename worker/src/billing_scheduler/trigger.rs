use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;

/// A six-field cron expression (`sec min hour day month weekday`) evaluated in a fixed time zone.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    name: String,
    expression: String,
    schedule: Schedule,
    timezone: Tz,
}

impl CronTrigger {
    pub fn new(name: &str, expression: &str, timezone: Tz) -> Result<Self> {
        let schedule = Schedule::from_str(expression)
            .map_err(|err| anyhow!("invalid cron expression {expression:?} for {name}: {err}"))?;

        Ok(Self {
            name: name.to_string(),
            expression: expression.to_string(),
            schedule,
            timezone,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.timezone))
            .next()
            .map(|fire| fire.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Seoul;

    #[test]
    fn monthly_trigger_fires_at_fifteen_seoul_time() {
        let trigger = CronTrigger::new("monthly_billing", "0 0 15 * * *", Seoul).unwrap();

        let before = Utc.with_ymd_and_hms(2026, 3, 1, 5, 59, 0).unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();

        assert_eq!(trigger.next_fire_after(before), Some(at));
        assert_eq!(
            trigger.next_fire_after(at),
            Some(Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap())
        );
    }

    #[test]
    fn free_trial_trigger_fires_at_seoul_midnight() {
        let trigger = CronTrigger::new("free_trial_expiry", "0 0 0 * * *", Seoul).unwrap();

        let afternoon_utc = Utc.with_ymd_and_hms(2026, 2, 28, 14, 0, 0).unwrap();

        assert_eq!(
            trigger.next_fire_after(afternoon_utc),
            Some(Utc.with_ymd_and_hms(2026, 2, 28, 15, 0, 0).unwrap())
        );
    }

    #[test]
    fn rejects_malformed_expression() {
        let err = CronTrigger::new("monthly_billing", "every day at three", Seoul).unwrap_err();

        assert!(err.to_string().contains("monthly_billing"));
    }
}
