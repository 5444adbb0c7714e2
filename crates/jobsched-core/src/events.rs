//! Structured event names.
//!
//! Every event below is emitted with `tracing::info!`/`warn!` and the event
//! name as the message, with the relevant ids/timestamps as structured
//! fields. Collected here so scheduler and worker binaries spell the event
//! names identically.

pub const JOB_SCHEDULED: &str = "job_scheduled";
pub const JOB_CLAIMED: &str = "job_claimed";
pub const JOB_STARTED: &str = "job_started";
pub const JOB_SUCCESS: &str = "job_success";
pub const JOB_RETRY: &str = "job_retry";
pub const JOB_FAILED: &str = "job_failed";
pub const HEARTBEAT: &str = "heartbeat";
pub const ZOMBIE_DETECTED: &str = "zombie_detected";
pub const ZOMBIE_RECOVERED: &str = "zombie_recovered";
pub const ZOMBIE_FAILED: &str = "zombie_failed";
pub const SCHEDULER_STARTED: &str = "scheduler_started";
pub const WORKER_BOOTED: &str = "worker_booted";
