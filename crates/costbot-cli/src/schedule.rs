//! Cron-driven repetition for the `schedule` subcommand.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::{debug, info};

/// Error from cron/schedule operations.
#[derive(Debug, Clone)]
pub struct ScheduleError(pub String);

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ScheduleError {}

/// Cron 0.15 expects 7 fields: sec min hour day month day_of_week year. Normalize 5-field to 7.
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {} *", expr)
    } else {
        expr.to_string()
    }
}

pub fn parse_schedule(expr: &str) -> Result<Schedule, ScheduleError> {
    let normalized = normalize_cron(expr);
    Schedule::from_str(&normalized)
        .map_err(|e| ScheduleError(format!("invalid cron '{}': {}", expr.trim(), e)))
}

pub fn next_tick(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Sleep until each upcoming tick and call `on_tick`. Ticks run strictly one after another.
pub fn run_schedule<F>(schedule: &Schedule, once: bool, mut on_tick: F) -> Result<(), ScheduleError>
where
    F: FnMut(DateTime<Utc>),
{
    loop {
        let now = Utc::now();
        let next = next_tick(schedule, now)
            .ok_or_else(|| ScheduleError("schedule has no upcoming ticks".into()))?;
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!(
            event = "schedule.tick_planned",
            domain = "schedule",
            next_run = %next,
            wait_ms = wait.as_millis() as u64
        );
        if wait > Duration::ZERO {
            std::thread::sleep(wait);
        }
        debug!(event = "schedule.tick_fired", domain = "schedule", tick = %next);
        on_tick(next);
        if once {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn five_field_expression_gains_seconds_and_year() {
        assert_eq!(normalize_cron(" 0 9 * * * "), "0 0 9 * * * *");
        assert_eq!(normalize_cron("0 0 9 * * * *"), "0 0 9 * * * *");
    }

    #[test]
    fn invalid_expression_is_rejected() {
        let err = parse_schedule("not a cron").unwrap_err();
        assert!(err.0.contains("invalid cron 'not a cron'"));
    }

    #[test]
    fn next_tick_is_daily_at_nine() {
        let schedule = parse_schedule("0 9 * * *").unwrap();
        let morning = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        assert_eq!(
            next_tick(&schedule, morning),
            Some(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap())
        );
        let later = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        assert_eq!(
            next_tick(&schedule, later),
            Some(Utc.with_ymd_and_hms(2026, 10, 20, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn once_runs_a_single_tick() {
        let schedule = parse_schedule("* * * * * * *").unwrap();
        let mut ticks = Vec::new();
        run_schedule(&schedule, true, |tick| ticks.push(tick)).unwrap();
        assert_eq!(ticks.len(), 1);
    }
}
