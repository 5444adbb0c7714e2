//! Error taxonomy.
//!
//! `SchedulerError` is the closed, library-facing error type (`thiserror`);
//! binaries wrap it in `anyhow` at their outer loop and recover locally
//! rather than propagating across components.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Connectivity loss or schema-not-ready: caller rolls back and retries
    /// after a backoff, with no state change.
    #[error("transient storage error: {0}")]
    Storage(String),

    /// Soft-state presence-store failure; errors here are logged and
    /// swallowed — the database heartbeat remains authoritative.
    #[error("presence store error: {0}")]
    Presence(String),

    #[error("invalid cron expression {expr:?}: {reason}")]
    InvalidCronExpression { expr: String, reason: String },

    #[error("invalid job definition: {0}")]
    InvalidJob(String),

    #[error("invalid tunable configuration: {0}")]
    InvalidConfig(String),

    #[error("job {0} not found")]
    JobNotFound(i64),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
