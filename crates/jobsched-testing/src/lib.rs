//! In-memory fakes for [`jobsched_core::store::JobStore`] and
//! [`jobsched_core::presence::PresenceStore`], so the concurrency-sensitive
//! properties (job-scheduling coordination scenarios S1-S6) can be
//! expressed as deterministic async tests without a live Postgres or Redis.

mod job_store;
mod presence_store;

pub use job_store::InMemoryJobStore;
pub use presence_store::InMemoryPresenceStore;

use chrono::{DateTime, Utc};
use jobsched_core::domain::{Job, NewJob};

/// A `NewJob` builder for tests, defaulting to a permissive, always-active,
/// never-failing minutely job.
pub struct JobFixture {
    new_job: NewJob,
}

impl JobFixture {
    pub fn new(name: &str, schedule: &str) -> Self {
        Self {
            new_job: NewJob {
                name: name.to_string(),
                schedule: schedule.to_string(),
                execution_time_sec: 1,
                failure_probability: 0.0,
                max_retries: 3,
                retry_delay_sec: 30,
                is_active: true,
            },
        }
    }

    pub fn failure_probability(mut self, p: f64) -> Self {
        self.new_job.failure_probability = p;
        self
    }

    pub fn max_retries(mut self, n: i32) -> Self {
        self.new_job.max_retries = n;
        self
    }

    pub fn retry_delay_sec(mut self, s: i64) -> Self {
        self.new_job.retry_delay_sec = s;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.new_job.is_active = false;
        self
    }

    pub fn build(self) -> NewJob {
        self.new_job
    }

    /// Build a fully-formed [`Job`] (server-assigned fields filled in) for
    /// seeding a store directly, bypassing `create_job`.
    pub fn build_seeded(self, id: i64, created_at: DateTime<Utc>) -> Job {
        let n = self.new_job;
        Job {
            id,
            name: n.name,
            schedule: n.schedule,
            execution_time_sec: n.execution_time_sec,
            failure_probability: n.failure_probability,
            max_retries: n.max_retries,
            retry_delay_sec: n.retry_delay_sec,
            is_active: n.is_active,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Convenience alias matching the spec's scenario-naming convention (S1-S6).
pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    use chrono::TimeZone;
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

#[cfg(test)]
mod scenarios {
    use super::*;
    use jobsched_core::domain::{JobRunStatus, WorkerId};
    use jobsched_core::store::JobStore;

    // S1: happy path. A due job materializes a PENDING run, a worker claims
    // and succeeds it.
    #[tokio::test]
    async fn s1_happy_path() {
        let store = InMemoryJobStore::new();
        let created = utc(2026, 1, 1, 0, 0, 0);
        let job = JobFixture::new("s1", "* * * * *").build_seeded(1, created);
        store.seed_job(job.clone()).await;

        let now = utc(2026, 1, 1, 0, 1, 0);
        let due = jobsched_core::materialize::due_run(&job, created, now)
            .unwrap()
            .expect("should be due");
        let inserted = store.materialize_run(due).await.unwrap();
        assert!(inserted);

        let worker = WorkerId("w1".into());
        let run = store
            .claim_due_run(&worker, now)
            .await
            .unwrap()
            .expect("a claimable run exists");
        assert_eq!(run.status, JobRunStatus::Running);
        assert_eq!(run.worker_id, Some("w1".to_string()));

        store.heartbeat(run.id, now).await.unwrap();
        store.record_success(run.id, now).await.unwrap();

        let final_run = store.get_run(run.id).await.unwrap();
        assert_eq!(final_run.status, JobRunStatus::Success);
        assert!(final_run.finished_at.is_some());
    }

    // S2: a failing attempt under max_retries becomes RETRY with an advanced
    // scheduled_time; the next attempt succeeds.
    #[tokio::test]
    async fn s2_retry_then_success() {
        let store = InMemoryJobStore::new();
        let created = utc(2026, 1, 1, 0, 0, 0);
        let job = JobFixture::new("s2", "* * * * *")
            .max_retries(2)
            .retry_delay_sec(60)
            .build_seeded(1, created);
        store.seed_job(job.clone()).await;

        let t0 = utc(2026, 1, 1, 0, 1, 0);
        let due = jobsched_core::materialize::due_run(&job, created, t0)
            .unwrap()
            .unwrap();
        store.materialize_run(due).await.unwrap();

        let worker = WorkerId("w1".into());
        let run = store.claim_due_run(&worker, t0).await.unwrap().unwrap();

        let status = store
            .record_failure(run.id, &job, t0, "transient error")
            .await
            .unwrap();
        assert_eq!(status, JobRunStatus::Retry);

        let retried = store.get_run(run.id).await.unwrap();
        assert_eq!(retried.attempt_number, 1);
        assert_eq!(retried.scheduled_time, t0 + chrono::Duration::seconds(60));
        // worker_id is left as-is on a worker-recorded retry; only the
        // zombie reaper clears it.
        assert_eq!(retried.worker_id, Some("w1".to_string()));

        let t1 = retried.scheduled_time;
        let second = store
            .claim_due_run(&worker, t1)
            .await
            .unwrap()
            .expect("retried run is claimable once its time arrives");
        assert_eq!(second.id, run.id);
        store.record_success(second.id, t1).await.unwrap();

        let done = store.get_run(run.id).await.unwrap();
        assert_eq!(done.status, JobRunStatus::Success);
    }

    // S3: exhausting max_retries moves the run to FAILED permanently.
    #[tokio::test]
    async fn s3_permanent_failure() {
        let store = InMemoryJobStore::new();
        let created = utc(2026, 1, 1, 0, 0, 0);
        let job = JobFixture::new("s3", "* * * * *")
            .max_retries(1)
            .retry_delay_sec(10)
            .build_seeded(1, created);
        store.seed_job(job.clone()).await;

        let t0 = utc(2026, 1, 1, 0, 1, 0);
        let due = jobsched_core::materialize::due_run(&job, created, t0)
            .unwrap()
            .unwrap();
        store.materialize_run(due).await.unwrap();

        let worker = WorkerId("w1".into());
        let run = store.claim_due_run(&worker, t0).await.unwrap().unwrap();

        // attempt 1 -> RETRY (0 < max_retries=1)
        let s = store.record_failure(run.id, &job, t0, "boom").await.unwrap();
        assert_eq!(s, JobRunStatus::Retry);
        let retried = store.get_run(run.id).await.unwrap();

        let t1 = retried.scheduled_time;
        let claimed_again = store.claim_due_run(&worker, t1).await.unwrap().unwrap();
        // attempt 2 -> FAILED (1 >= max_retries=1)
        let s2 = store
            .record_failure(claimed_again.id, &job, t1, "boom again")
            .await
            .unwrap();
        assert_eq!(s2, JobRunStatus::Failed);

        let final_run = store.get_run(run.id).await.unwrap();
        assert_eq!(final_run.status, JobRunStatus::Failed);
        assert_eq!(final_run.error_message.as_deref(), Some("boom again"));
    }

    // S4: ten workers race to claim one due run; exactly one succeeds.
    #[tokio::test]
    async fn s4_concurrent_claim_single_winner() {
        use std::sync::Arc;

        let store = Arc::new(InMemoryJobStore::new());
        let created = utc(2026, 1, 1, 0, 0, 0);
        let job = JobFixture::new("s4", "* * * * *").build_seeded(1, created);
        store.seed_job(job.clone()).await;

        let now = utc(2026, 1, 1, 0, 1, 0);
        let due = jobsched_core::materialize::due_run(&job, created, now)
            .unwrap()
            .unwrap();
        store.materialize_run(due).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let worker = WorkerId(format!("w{i}"));
                store.claim_due_run(&worker, now).await.unwrap()
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "exactly one worker should win the claim");
        assert_eq!(store.run_count_for_job(1).await, 1);
    }

    // S5: a run whose heartbeat goes stale is reaped to RETRY, and a second
    // worker can then claim and complete it.
    #[tokio::test]
    async fn s5_zombie_reap_then_second_worker_completes() {
        let store = InMemoryJobStore::new();
        let created = utc(2026, 1, 1, 0, 0, 0);
        let job = JobFixture::new("s5", "* * * * *")
            .max_retries(3)
            .build_seeded(1, created);
        store.seed_job(job.clone()).await;

        let t0 = utc(2026, 1, 1, 0, 1, 0);
        let due = jobsched_core::materialize::due_run(&job, created, t0)
            .unwrap()
            .unwrap();
        store.materialize_run(due).await.unwrap();

        let worker_a = WorkerId("worker-a".into());
        let run = store.claim_due_run(&worker_a, t0).await.unwrap().unwrap();
        assert_eq!(run.worker_id, Some("worker-a".to_string()));

        // worker-a dies silently; no further heartbeat is ever recorded.
        // reap_zombies uses a real now, but last_heartbeat_at is pinned at
        // t0 which is long past any real zombie_timeout.
        let reaped = store
            .reap_zombies(std::time::Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].run_id, run.id);
        assert_eq!(reaped[0].new_status, JobRunStatus::Retry);
        assert_eq!(reaped[0].worker_id, Some("worker-a".to_string()));

        let after_reap = store.get_run(run.id).await.unwrap();
        assert_eq!(after_reap.status, JobRunStatus::Retry);
        // the reaper, unlike a worker-recorded retry, does clear worker_id.
        assert!(after_reap.worker_id.is_none());

        let worker_b = WorkerId("worker-b".into());
        let now = Utc::now();
        let claimed = store
            .claim_due_run(&worker_b, now)
            .await
            .unwrap()
            .expect("reaped run should be claimable again");
        assert_eq!(claimed.id, run.id);
        assert_eq!(claimed.worker_id, Some("worker-b".to_string()));

        store.record_success(claimed.id, now).await.unwrap();
        let done = store.get_run(run.id).await.unwrap();
        assert_eq!(done.status, JobRunStatus::Success);
    }

    // S6: two scheduler instances racing on the same cron firing both try to
    // materialize the same (job_id, scheduled_time); only one run exists.
    #[tokio::test]
    async fn s6_scheduler_materialization_is_idempotent() {
        let store = InMemoryJobStore::new();
        let created = utc(2026, 1, 1, 0, 0, 0);
        let job = JobFixture::new("s6", "* * * * *").build_seeded(1, created);
        store.seed_job(job.clone()).await;

        let now = utc(2026, 1, 1, 0, 1, 0);
        let due_a = jobsched_core::materialize::due_run(&job, created, now)
            .unwrap()
            .unwrap();
        let due_b = jobsched_core::materialize::due_run(&job, created, now)
            .unwrap()
            .unwrap();
        assert_eq!(due_a.scheduled_time, due_b.scheduled_time);

        let first = store.materialize_run(due_a).await.unwrap();
        let second = store.materialize_run(due_b).await.unwrap();
        assert!(first);
        assert!(!second, "the racing scheduler's duplicate is absorbed");
        assert_eq!(store.run_count_for_job(1).await, 1);
    }

    #[tokio::test]
    async fn presence_store_tracks_running_set_and_workers() {
        use jobsched_core::presence::{PresenceStore, WorkerPresence};

        let presence = InMemoryPresenceStore::new();
        let worker = WorkerId("w1".into());
        presence
            .refresh_worker(
                &worker,
                &WorkerPresence {
                    worker_id: worker.0.clone(),
                    last_seen: Utc::now(),
                    current_job_run_id: Some(42),
                },
            )
            .await
            .unwrap();
        assert!(presence.worker("w1").await.is_some());

        presence.mark_running(42).await.unwrap();
        assert!(presence.is_running(42).await);
        presence.unmark_running(42).await.unwrap();
        assert!(!presence.is_running(42).await);

        presence.sweep_stale_workers().await.unwrap();
        assert_eq!(presence.known_worker_count().await, 0);
    }
}
