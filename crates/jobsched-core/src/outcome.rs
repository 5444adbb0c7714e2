//! Worker outcome-recording decision logic.
//!
//! Kept pure and store-agnostic like [`crate::reaper`]: given the run's
//! attempt number after a synthetic failure and the job's retry bound,
//! decide the next status and (for a retry) the new `scheduled_time`.

use chrono::{DateTime, Duration, Utc};

use crate::domain::JobRunStatus;

/// What a failed attempt becomes once `attempt_number` has been
/// incremented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// `attempt_number <= max_retries`: eligible for another attempt after
    /// `retry_delay_sec`.
    Retry,
    /// Retry bound exhausted.
    Failed,
}

impl FailureOutcome {
    pub fn status(&self) -> JobRunStatus {
        match self {
            FailureOutcome::Retry => JobRunStatus::Retry,
            FailureOutcome::Failed => JobRunStatus::Failed,
        }
    }
}

/// `attempt_number` here is the count *after* incrementing for the failure
/// that just happened — it counts prior failures.
pub fn failure_outcome(attempt_number_after_increment: i32, max_retries: i32) -> FailureOutcome {
    if attempt_number_after_increment <= max_retries {
        FailureOutcome::Retry
    } else {
        FailureOutcome::Failed
    }
}

/// The run becomes eligible again after `retry_delay_sec`.
pub fn next_retry_time(now: DateTime<Utc>, retry_delay_sec: i64) -> DateTime<Utc> {
    now + Duration::seconds(retry_delay_sec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn within_retry_bound_retries() {
        assert_eq!(failure_outcome(1, 2), FailureOutcome::Retry);
        assert_eq!(failure_outcome(2, 2), FailureOutcome::Retry);
    }

    #[test]
    fn exceeding_retry_bound_fails() {
        assert_eq!(failure_outcome(3, 2), FailureOutcome::Failed);
        assert_eq!(failure_outcome(1, 0), FailureOutcome::Failed);
    }

    #[test]
    fn single_attempt_job_fails_on_first_failure() {
        // max_retries = 0 means a single attempt.
        assert_eq!(failure_outcome(1, 0), FailureOutcome::Failed);
    }

    #[test]
    fn retry_time_advances_by_the_configured_delay() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let next = next_retry_time(now, 3);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 3).unwrap());
    }
}
