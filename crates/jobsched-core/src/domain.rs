//! Domain types for the job-scheduling coordination engine.
//!
//! [`Job`] is a registered recurring task; [`JobRun`] is a single materialized
//! firing of that task moving through a closed [`JobRunStatus`] state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered recurring task definition.
///
/// Never deleted by the core: deactivation (`is_active = false`) stops new
/// materialization but leaves in-flight runs alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub name: String,
    /// 5-field cron expression (minute, hour, day-of-month, month, day-of-week).
    pub schedule: String,
    pub execution_time_sec: i64,
    pub failure_probability: f64,
    pub max_retries: i32,
    pub retry_delay_sec: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Validates the storage-level invariants: probability in [0,1], all
    /// durations non-negative.
    pub fn validate(&self) -> Result<(), crate::error::SchedulerError> {
        validate_job_fields(
            self.failure_probability,
            self.execution_time_sec,
            self.max_retries,
            self.retry_delay_sec,
        )
    }
}

impl NewJob {
    /// Same invariants as [`Job::validate`], checked before the store
    /// assigns an id.
    pub fn validate(&self) -> Result<(), crate::error::SchedulerError> {
        validate_job_fields(
            self.failure_probability,
            self.execution_time_sec,
            self.max_retries,
            self.retry_delay_sec,
        )
    }
}

fn validate_job_fields(
    failure_probability: f64,
    execution_time_sec: i64,
    max_retries: i32,
    retry_delay_sec: i64,
) -> Result<(), crate::error::SchedulerError> {
    if !(0.0..=1.0).contains(&failure_probability) {
        return Err(crate::error::SchedulerError::InvalidJob(format!(
            "failure_probability must be in [0,1], got {failure_probability}"
        )));
    }
    if execution_time_sec < 0 {
        return Err(crate::error::SchedulerError::InvalidJob(
            "execution_time_sec must be >= 0".into(),
        ));
    }
    if max_retries < 0 {
        return Err(crate::error::SchedulerError::InvalidJob(
            "max_retries must be >= 0".into(),
        ));
    }
    if retry_delay_sec < 0 {
        return Err(crate::error::SchedulerError::InvalidJob(
            "retry_delay_sec must be >= 0".into(),
        ));
    }
    Ok(())
}

/// Closed set of states a [`JobRun`] can occupy.
///
/// `Queued` is reserved for future use but never produced by any core
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobRunStatus {
    Pending,
    Queued,
    Running,
    Success,
    Failed,
    Retry,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Pending => "PENDING",
            JobRunStatus::Queued => "QUEUED",
            JobRunStatus::Running => "RUNNING",
            JobRunStatus::Success => "SUCCESS",
            JobRunStatus::Failed => "FAILED",
            JobRunStatus::Retry => "RETRY",
        }
    }

    /// Terminal states are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobRunStatus::Success | JobRunStatus::Failed)
    }

    /// States a worker's claim query may pick up.
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobRunStatus::Pending | JobRunStatus::Retry)
    }
}

impl std::str::FromStr for JobRunStatus {
    type Err = crate::error::SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobRunStatus::Pending),
            "QUEUED" => Ok(JobRunStatus::Queued),
            "RUNNING" => Ok(JobRunStatus::Running),
            "SUCCESS" => Ok(JobRunStatus::Success),
            "FAILED" => Ok(JobRunStatus::Failed),
            "RETRY" => Ok(JobRunStatus::Retry),
            other => Err(crate::error::SchedulerError::InvalidJob(format!(
                "unknown job run status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for JobRunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scheduled execution attempt of a [`Job`].
///
/// `(job_id, scheduled_time)` is unique — materialization is idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: i64,
    pub job_id: i64,
    pub scheduled_time: DateTime<Utc>,
    pub status: JobRunStatus,
    pub attempt_number: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A job definition as submitted by the control plane, before the store
/// assigns an id and server-side timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    pub schedule: String,
    pub execution_time_sec: i64,
    pub failure_probability: f64,
    pub max_retries: i32,
    pub retry_delay_sec: i64,
    pub is_active: bool,
}

/// A newly materialized run, not yet assigned a row id.
#[derive(Debug, Clone)]
pub struct NewJobRun {
    pub job_id: i64,
    pub scheduled_time: DateTime<Utc>,
}

/// Identity claimed by a worker process. Correctness does not depend on
/// uniqueness of this string (the row lock does); it is recorded purely
/// for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerId(pub String);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl WorkerId {
    /// Resolve the process's worker identity the way the original
    /// implementation did: `HOSTNAME`, falling back to `WORKER_ID`, falling
    /// back to a fixed default.
    pub fn from_env() -> Self {
        let id = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("WORKER_ID"))
            .unwrap_or_else(|_| "local-worker".to_string());
        WorkerId(id)
    }
}
