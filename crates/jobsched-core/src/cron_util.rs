//! Cron semantics: 5-field standard (minute, hour, day-of-month, month,
//! day-of-week), resolved strictly after a reference instant, in UTC, with
//! seconds set to zero.
//!
//! The `cron` crate parses 6/7-field expressions with a leading seconds
//! field, so a 5-field expression is widened to 6-field by prefixing a
//! fixed `"0"` seconds column before parsing.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{Result, SchedulerError};

/// Parses a 5-field cron expression and returns the first firing strictly
/// after `after`, truncated to whole seconds, in UTC.
pub fn cron_next(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let schedule = parse(expr)?;
    schedule
        .after(&after)
        .next()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SchedulerError::InvalidCronExpression {
            expr: expr.to_string(),
            reason: "schedule produces no future firings".to_string(),
        })
}

/// Validates a 5-field cron expression without computing a firing.
pub fn validate(expr: &str) -> Result<()> {
    parse(expr).map(|_| ())
}

fn parse(expr: &str) -> Result<Schedule> {
    let widened = widen_to_six_fields(expr);
    Schedule::from_str(&widened).map_err(|e| SchedulerError::InvalidCronExpression {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

fn widen_to_six_fields(expr: &str) -> String {
    format!("0 {}", expr.trim())
}
