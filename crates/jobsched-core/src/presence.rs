//! The [`PresenceStore`] trait: observational key-value state for
//! dashboards. Never load-bearing for correctness — the authoritative
//! liveness signal is `last_heartbeat_at` in the [`crate::store::JobStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::WorkerId;
use crate::error::Result;

/// The `worker:<id>` presence payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPresence {
    pub worker_id: String,
    pub last_seen: DateTime<Utc>,
    pub current_job_run_id: Option<i64>,
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// `SET worker:<id> EX WORKER_TTL = <json>`. Called on heartbeat and on
    /// idle refresh while polling.
    async fn refresh_worker(&self, worker_id: &WorkerId, presence: &WorkerPresence) -> Result<()>;

    /// `SADD running_job_runs <id>` on claim.
    async fn mark_running(&self, run_id: i64) -> Result<()>;

    /// `SREM running_job_runs <id>` on terminal.
    async fn unmark_running(&self, run_id: i64) -> Result<()>;

    /// One-time sweep on service startup: delete all `worker:*` keys.
    async fn sweep_stale_workers(&self) -> Result<()>;
}
