//! # jobsched-core
//!
//! The coordination engine for a distributed job-scheduling service: users
//! register recurring jobs with a cron schedule; the system materializes
//! concrete runs at their due times, distributes those runs across a pool
//! of workers, detects crashed workers, and retries transient failures up
//! to a per-job bound.
//!
//! This crate holds the parts that are hard to get right under
//! concurrency and clock skew:
//!
//! - [`materialize`] — cron-driven materialization of due runs, without
//!   gaps or duplicates.
//! - [`store`] — the [`store::JobStore`] trait: row-level claim, heartbeat,
//!   and outcome recording, with at-most-one-execution-in-progress
//!   semantics under concurrent workers.
//! - [`reaper`] / [`outcome`] — the liveness protocol: heartbeats plus
//!   zombie reaping, converting crashed runs into retries or permanent
//!   failures.
//!
//! Everything here is pure domain logic and trait definitions; concrete
//! storage lives in `jobsched-postgres`, presence in `jobsched-presence`,
//! and test doubles in `jobsched-testing`. The two binaries,
//! `jobsched-scheduler` and `jobsched-worker`, wire these together into the
//! two long-lived processes described by the design.
//!
//! ## What this is not
//!
//! This crate does not implement the HTTP management surface (job CRUD,
//! run-history reads), container packaging, or connection-pool plumbing —
//! those are external collaborators. It does carry its own structured
//! logging, error taxonomy, and environment-driven configuration, because
//! those are ambient concerns of the coordination engine itself, not
//! features the control plane would own.

pub mod config;
pub mod cron_util;
pub mod domain;
pub mod error;
pub mod events;
pub mod materialize;
pub mod outcome;
pub mod presence;
pub mod reaper;
pub mod store;

pub use config::Tunables;
pub use domain::{Job, JobRun, JobRunStatus, NewJob, NewJobRun, WorkerId};
pub use error::{Result, SchedulerError};
pub use presence::{PresenceStore, WorkerPresence};
pub use store::{JobStore, ReapedRun};
