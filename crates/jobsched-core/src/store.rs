//! The [`JobStore`] trait: the one seam every concrete persistence layer
//! must satisfy.
//!
//! Each method is documented with the transaction boundary it owns — every
//! state transition here is exactly one short transaction, with a clear
//! begin/commit rather than an implicit, long-lived session.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Job, JobRun, JobRunStatus, NewJob, NewJobRun, WorkerId};
use crate::error::Result;

/// A zombie run the reaper just transitioned, returned for logging.
#[derive(Debug, Clone)]
pub struct ReapedRun {
    pub run_id: i64,
    pub job_id: i64,
    pub worker_id: Option<String>,
    pub new_status: JobRunStatus,
}

/// Persistence surface for jobs and job runs.
///
/// Implementors: `jobsched-postgres::PgJobStore` (production) and
/// `jobsched-testing::InMemoryJobStore` (tests).
#[async_trait]
pub trait JobStore: Send + Sync {
    // ---- control-plane data access (trait only, no HTTP server) ----

    /// Insert a new job. Server-assigns `id`, `created_at`, `updated_at`.
    async fn create_job(&self, job: NewJob) -> Result<Job>;

    /// All jobs, active or not, for read-only listing.
    async fn list_jobs(&self) -> Result<Vec<Job>>;

    /// Jobs eligible for materialization (`is_active = true`).
    async fn list_active_jobs(&self) -> Result<Vec<Job>>;

    async fn get_job(&self, job_id: i64) -> Result<Job>;

    /// Runs for a job, most recent `scheduled_time` first.
    async fn list_runs_for_job(&self, job_id: i64, limit: i64) -> Result<Vec<JobRun>>;

    // ---- scheduler: materialization ----

    /// The run with the greatest `scheduled_time` for a job, if any —
    /// used as the materialization base.
    async fn latest_run_for_job(&self, job_id: i64) -> Result<Option<JobRun>>;

    /// Insert a new PENDING run. Returns `true` if inserted, `false` if a
    /// uniqueness conflict on `(job_id, scheduled_time)` was absorbed
    /// because another scheduler instance already materialized this firing.
    async fn materialize_run(&self, new_run: NewJobRun) -> Result<bool>;

    /// Atomically: select RUNNING rows whose `last_heartbeat_at` is older
    /// than `zombie_timeout`, under `FOR UPDATE SKIP LOCKED`, and transition
    /// each to RETRY or FAILED per [`crate::reaper::reap_decision`] in one
    /// transaction per batch. Never touches `finished_at` — that stays
    /// worker-asserted.
    async fn reap_zombies(&self, zombie_timeout: Duration) -> Result<Vec<ReapedRun>>;

    // ---- worker: claim, heartbeat, outcome ----

    /// `SELECT ... FOR UPDATE SKIP LOCKED LIMIT 1` over claimable rows due
    /// at or before `now`, ordered by `scheduled_time`, then transition to
    /// RUNNING and commit, all in one transaction. Returns `None` if no row
    /// was available.
    async fn claim_due_run(&self, worker_id: &WorkerId, now: DateTime<Utc>) -> Result<Option<JobRun>>;

    /// Update `last_heartbeat_at = now` for a RUNNING run, in its own short
    /// transaction.
    async fn heartbeat(&self, run_id: i64, now: DateTime<Utc>) -> Result<()>;

    /// Terminal success: `status = SUCCESS`, `finished_at = now`.
    async fn record_success(&self, run_id: i64, now: DateTime<Utc>) -> Result<()>;

    /// Synthetic failure: increments `attempt_number`, sets
    /// `finished_at = now`, and per
    /// [`crate::outcome::failure_outcome`] either moves to RETRY (with
    /// `scheduled_time` advanced by `retry_delay_sec`) or FAILED. Returns
    /// the resulting status.
    async fn record_failure(
        &self,
        run_id: i64,
        job: &Job,
        now: DateTime<Utc>,
        error_message: &str,
    ) -> Result<JobRunStatus>;
}
