//! Materialization decision logic, kept store-agnostic and pure so it can
//! be exercised without a database: given a job, the base time to compute
//! the next firing from, and the current instant, decide whether a new run
//! is due.

use chrono::{DateTime, Utc};

use crate::cron_util::cron_next;
use crate::domain::{Job, NewJobRun};
use crate::error::Result;

/// Returns `Some(NewJobRun)` when `job`'s next cron firing (computed from
/// `base`, the greatest `scheduled_time` among its existing runs, or its
/// `created_at` if it has none) is due at or before `now`.
///
/// Callers are responsible for the idempotent insert and for absorbing the
/// resulting uniqueness conflict if a redundant scheduler instance beat
/// this one to it.
pub fn due_run(job: &Job, base: DateTime<Utc>, now: DateTime<Utc>) -> Result<Option<NewJobRun>> {
    let next = cron_next(&job.schedule, base)?;
    if next <= now {
        Ok(Some(NewJobRun {
            job_id: job.id,
            scheduled_time: next,
        }))
    } else {
        Ok(None)
    }
}

/// The base time to materialize from: the most recent run's `scheduled_time`
/// if one exists, otherwise the job's `created_at`.
pub fn materialization_base(job: &Job, last_run_scheduled_time: Option<DateTime<Utc>>) -> DateTime<Utc> {
    last_run_scheduled_time.unwrap_or(job.created_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(schedule: &str, created_at: DateTime<Utc>) -> Job {
        Job {
            id: 1,
            name: "job".into(),
            schedule: schedule.into(),
            execution_time_sec: 1,
            failure_probability: 0.0,
            max_retries: 0,
            retry_delay_sec: 0,
            is_active: true,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn no_prior_run_bases_on_created_at() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap();
        let j = job("* * * * *", created);
        let base = materialization_base(&j, None);
        assert_eq!(base, created);
    }

    #[test]
    fn prior_run_bases_on_its_scheduled_time() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let last = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let j = job("* * * * *", created);
        let base = materialization_base(&j, Some(last));
        assert_eq!(base, last);
    }

    #[test]
    fn due_run_fires_once_next_boundary_has_passed() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap();
        let j = job("* * * * *", created);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap();
        let run = due_run(&j, created, now).unwrap().expect("should be due");
        assert_eq!(run.job_id, 1);
        assert_eq!(run.scheduled_time, Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap());
    }

    #[test]
    fn not_yet_due_returns_none() {
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap();
        let j = job("* * * * *", created);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 45).unwrap();
        assert!(due_run(&j, created, now).unwrap().is_none());
    }

    #[test]
    fn backlog_drains_one_firing_per_call() {
        // Scheduler downtime left two firings unmaterialized; a single call
        // only ever produces the next one after `base`.
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let j = job("* * * * *", created);
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let run = due_run(&j, created, now).unwrap().expect("should be due");
        assert_eq!(run.scheduled_time, Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap());
    }

    #[test]
    fn inactive_job_is_the_caller_s_concern_not_this_function_s() {
        // due_run doesn't look at is_active; the scheduler loop filters
        // beforehand.
        let created = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap();
        let mut j = job("* * * * *", created);
        j.is_active = false;
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap();
        assert!(due_run(&j, created, now).unwrap().is_some());
    }
}
