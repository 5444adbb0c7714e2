//! Redis-backed implementation of [`PresenceStore`].
//!
//! Purely observational: a `worker:<id>` key with a TTL for dashboards, and
//! a `running_job_runs` set mirroring which runs are currently claimed.
//! Inconsistency between this store and the database is tolerated — the
//! authoritative liveness signal is always `last_heartbeat_at` in
//! `job_runs`.

use async_trait::async_trait;
use jobsched_core::domain::WorkerId;
use jobsched_core::error::{Result, SchedulerError};
use jobsched_core::presence::{PresenceStore, WorkerPresence};
use redis::AsyncCommands;

const RUNNING_SET_KEY: &str = "running_job_runs";

fn presence_err(e: redis::RedisError) -> SchedulerError {
    SchedulerError::Presence(e.to_string())
}

/// A connection-managed Redis client, reused across calls.
#[derive(Clone)]
pub struct RedisPresenceStore {
    manager: redis::aio::ConnectionManager,
    worker_ttl_secs: u64,
}

impl RedisPresenceStore {
    pub async fn connect(redis_url: &str, worker_ttl_secs: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url).map_err(presence_err)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(presence_err)?;
        Ok(Self {
            manager,
            worker_ttl_secs,
        })
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn refresh_worker(&self, worker_id: &WorkerId, presence: &WorkerPresence) -> Result<()> {
        let mut conn = self.manager.clone();
        let key = format!("worker:{}", worker_id.0);
        let payload = serde_json::to_string(presence)
            .map_err(|e| SchedulerError::Presence(e.to_string()))?;
        conn.set_ex::<_, _, ()>(key, payload, self.worker_ttl_secs)
            .await
            .map_err(presence_err)?;
        Ok(())
    }

    async fn mark_running(&self, run_id: i64) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.sadd::<_, _, ()>(RUNNING_SET_KEY, run_id)
            .await
            .map_err(presence_err)?;
        Ok(())
    }

    async fn unmark_running(&self, run_id: i64) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.srem::<_, _, ()>(RUNNING_SET_KEY, run_id)
            .await
            .map_err(presence_err)?;
        Ok(())
    }

    async fn sweep_stale_workers(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn.keys("worker:*").await.map_err(presence_err)?;
        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await.map_err(presence_err)?;
        }
        Ok(())
    }
}
