//! Zombie reaper decision logic.
//!
//! The store layer is responsible for the `SELECT ... FOR UPDATE SKIP
//! LOCKED` that finds candidate rows; this module is the pure decision of
//! what a zombie becomes, kept separate so it's testable without a
//! database.

use chrono::{DateTime, Duration, Utc};

use crate::domain::JobRunStatus;

/// What a reaped zombie run becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Attempts remain: `status = RETRY`, `worker_id` cleared,
    /// `scheduled_time` left unchanged so the run is immediately eligible
    /// for reclaim.
    Retry,
    /// No attempts remain: `status = FAILED`.
    Failed,
}

impl ReapOutcome {
    pub fn status(&self) -> JobRunStatus {
        match self {
            ReapOutcome::Retry => JobRunStatus::Retry,
            ReapOutcome::Failed => JobRunStatus::Failed,
        }
    }
}

/// A run is reapable when it's RUNNING and its heartbeat has lapsed beyond
/// `zombie_timeout`.
pub fn is_zombie(
    status: JobRunStatus,
    last_heartbeat_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    zombie_timeout: Duration,
) -> bool {
    if status != JobRunStatus::Running {
        return false;
    }
    match last_heartbeat_at {
        Some(beat) => beat < now - zombie_timeout,
        // A RUNNING row always gets last_heartbeat_at set at claim time;
        // absence is itself evidence of staleness.
        None => true,
    }
}

/// Decide the fate of a zombie run given its prior `attempt_number` and the
/// job's `max_retries`: retries remain while `attempt_number < max_retries`,
/// otherwise the run fails permanently.
pub fn reap_decision(attempt_number: i32, max_retries: i32) -> ReapOutcome {
    if attempt_number < max_retries {
        ReapOutcome::Retry
    } else {
        ReapOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fresh_heartbeat_is_not_a_zombie() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap();
        let beat = now - Duration::seconds(10);
        assert!(!is_zombie(
            JobRunStatus::Running,
            Some(beat),
            now,
            Duration::seconds(60)
        ));
    }

    #[test]
    fn stale_heartbeat_past_zombie_timeout_is_a_zombie() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 2, 0).unwrap();
        let beat = now - Duration::seconds(61);
        assert!(is_zombie(
            JobRunStatus::Running,
            Some(beat),
            now,
            Duration::seconds(60)
        ));
    }

    #[test]
    fn non_running_status_is_never_a_zombie() {
        let now = Utc::now();
        assert!(!is_zombie(
            JobRunStatus::Pending,
            None,
            now,
            Duration::seconds(60)
        ));
        assert!(!is_zombie(
            JobRunStatus::Success,
            Some(now - Duration::seconds(1000)),
            now,
            Duration::seconds(60)
        ));
    }

    #[test]
    fn retries_remaining_yields_retry() {
        assert_eq!(reap_decision(0, 2), ReapOutcome::Retry);
        assert_eq!(reap_decision(1, 2), ReapOutcome::Retry);
    }

    #[test]
    fn exhausted_retries_yields_failed() {
        assert_eq!(reap_decision(2, 2), ReapOutcome::Failed);
        assert_eq!(reap_decision(0, 0), ReapOutcome::Failed);
    }
}
