//! Schedule expressions
//!
//! Two forms: `@every <duration>` for fixed intervals (the form
//! per-feed poll rates compile to) and standard cron expressions with
//! an optional leading seconds field.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to parse schedule `{expression}`: {message}")]
pub struct ScheduleError {
    pub expression: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fires a fixed duration after each previous tick.
    Every(Duration),
    /// Fires at cron-expression boundaries.
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let fail = |message: String| ScheduleError {
            expression: expression.to_string(),
            message,
        };

        if let Some(rate) = expression.strip_prefix("@every ") {
            let duration =
                humantime::parse_duration(rate.trim()).map_err(|err| fail(err.to_string()))?;
            return Ok(Self::Every(duration));
        }

        // The cron parser wants a seconds field; plain five-field
        // expressions get one prepended.
        let fields = expression.split_whitespace().count();
        let normalized = if fields == 5 {
            format!("0 {expression}")
        } else {
            expression.to_string()
        };
        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|err| fail(err.to_string()))?;
        Ok(Self::Cron(Box::new(schedule)))
    }

    /// How long to sleep from `now` until the next tick.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Self::Every(duration) => *duration,
            Self::Cron(schedule) => schedule
                .after(&now)
                .next()
                .and_then(|next| (next - now).to_std().ok())
                // An exhausted schedule re-checks once a minute.
                .unwrap_or(Duration::from_secs(60)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_every_descriptor() {
        let schedule = Schedule::parse("@every 30s").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(schedule.next_delay(now), Duration::from_secs(30));

        let schedule = Schedule::parse("@every 2m").unwrap();
        assert_eq!(schedule.next_delay(now), Duration::from_secs(120));
    }

    #[test]
    fn parses_five_field_cron() {
        let schedule = Schedule::parse("*/5 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 2, 30).unwrap();
        // Next */5-minute boundary is 10:05:00.
        assert_eq!(schedule.next_delay(now), Duration::from_secs(150));
    }

    #[test]
    fn parses_six_field_cron_with_seconds() {
        let schedule = Schedule::parse("30 * * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        assert_eq!(schedule.next_delay(now), Duration::from_secs(30));
    }

    #[test]
    fn rejects_garbage() {
        assert!(Schedule::parse("@every soonish").is_err());
        assert!(Schedule::parse("every 5 minutes").is_err());
        assert!(Schedule::parse("* * *").is_err());
    }
}
