//! An in-memory [`PresenceStore`] fake. Purely observational in production
//! too, so the fake is a plain `Mutex<HashMap>` with no locking subtleties
//! to emulate.

use std::collections::HashMap;

use async_trait::async_trait;
use jobsched_core::domain::WorkerId;
use jobsched_core::error::Result;
use jobsched_core::presence::{PresenceStore, WorkerPresence};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryPresenceStore {
    workers: Mutex<HashMap<String, WorkerPresence>>,
    running: Mutex<std::collections::HashSet<i64>>,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn worker(&self, worker_id: &str) -> Option<WorkerPresence> {
        self.workers.lock().await.get(worker_id).cloned()
    }

    pub async fn is_running(&self, run_id: i64) -> bool {
        self.running.lock().await.contains(&run_id)
    }

    pub async fn known_worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }
}

#[async_trait]
impl PresenceStore for InMemoryPresenceStore {
    async fn refresh_worker(&self, worker_id: &WorkerId, presence: &WorkerPresence) -> Result<()> {
        self.workers
            .lock()
            .await
            .insert(worker_id.0.clone(), presence.clone());
        Ok(())
    }

    async fn mark_running(&self, run_id: i64) -> Result<()> {
        self.running.lock().await.insert(run_id);
        Ok(())
    }

    async fn unmark_running(&self, run_id: i64) -> Result<()> {
        self.running.lock().await.remove(&run_id);
        Ok(())
    }

    async fn sweep_stale_workers(&self) -> Result<()> {
        self.workers.lock().await.clear();
        Ok(())
    }
}
