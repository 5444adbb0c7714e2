//! An in-memory [`JobStore`] fake.
//!
//! A single `tokio::sync::Mutex` around both tables stands in for the
//! database's row locks: because every operation awaits the same mutex,
//! the store gets the same "at most one caller observes a claimable row
//! and commits its transition to RUNNING" guarantee a real `FOR UPDATE
//! SKIP LOCKED` query provides, without needing a real database in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobsched_core::domain::{Job, JobRun, JobRunStatus, NewJob, NewJobRun, WorkerId};
use jobsched_core::error::{Result, SchedulerError};
use jobsched_core::outcome::{failure_outcome, next_retry_time};
use jobsched_core::reaper::reap_decision;
use jobsched_core::store::{JobStore, ReapedRun};
use tokio::sync::Mutex;

struct State {
    jobs: HashMap<i64, Job>,
    runs: HashMap<i64, JobRun>,
}

pub struct InMemoryJobStore {
    state: Mutex<State>,
    next_job_id: AtomicI64,
    next_run_id: AtomicI64,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                jobs: HashMap::new(),
                runs: HashMap::new(),
            }),
            next_job_id: AtomicI64::new(1),
            next_run_id: AtomicI64::new(1),
        }
    }

    /// Test convenience: insert an already-fully-formed job (id, timestamps
    /// and all), bypassing `create_job`'s server-assignment.
    pub async fn seed_job(&self, job: Job) {
        let mut state = self.state.lock().await;
        if job.id >= self.next_job_id.load(Ordering::SeqCst) {
            self.next_job_id.store(job.id + 1, Ordering::SeqCst);
        }
        state.jobs.insert(job.id, job);
    }

    /// Test convenience: snapshot a run's current state directly.
    pub async fn get_run(&self, run_id: i64) -> Option<JobRun> {
        self.state.lock().await.runs.get(&run_id).cloned()
    }

    pub async fn run_count_for_job(&self, job_id: i64) -> usize {
        self.state
            .lock()
            .await
            .runs
            .values()
            .filter(|r| r.job_id == job_id)
            .count()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self, new_job: NewJob) -> Result<Job> {
        new_job.validate()?;
        let mut state = self.state.lock().await;
        let id = self.next_job_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let job = Job {
            id,
            name: new_job.name,
            schedule: new_job.schedule,
            execution_time_sec: new_job.execution_time_sec,
            failure_probability: new_job.failure_probability,
            max_retries: new_job.max_retries,
            retry_delay_sec: new_job.retry_delay_sec,
            is_active: new_job.is_active,
            created_at: now,
            updated_at: now,
        };
        state.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn list_active_jobs(&self) -> Result<Vec<Job>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state.jobs.values().filter(|j| j.is_active).cloned().collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn get_job(&self, job_id: i64) -> Result<Job> {
        let state = self.state.lock().await;
        state
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(SchedulerError::JobNotFound(job_id))
    }

    async fn list_runs_for_job(&self, job_id: i64, limit: i64) -> Result<Vec<JobRun>> {
        let state = self.state.lock().await;
        let mut runs: Vec<JobRun> = state
            .runs
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse(r.scheduled_time));
        runs.truncate(limit.max(0) as usize);
        Ok(runs)
    }

    async fn latest_run_for_job(&self, job_id: i64) -> Result<Option<JobRun>> {
        let state = self.state.lock().await;
        Ok(state
            .runs
            .values()
            .filter(|r| r.job_id == job_id)
            .max_by_key(|r| r.scheduled_time)
            .cloned())
    }

    async fn materialize_run(&self, new_run: NewJobRun) -> Result<bool> {
        let mut state = self.state.lock().await;
        let conflict = state
            .runs
            .values()
            .any(|r| r.job_id == new_run.job_id && r.scheduled_time == new_run.scheduled_time);
        if conflict {
            // Absorbed silently, as a real uniqueness violation would be.
            return Ok(false);
        }

        let id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let run = JobRun {
            id,
            job_id: new_run.job_id,
            scheduled_time: new_run.scheduled_time,
            status: JobRunStatus::Pending,
            attempt_number: 0,
            started_at: None,
            finished_at: None,
            last_heartbeat_at: None,
            worker_id: None,
            error_message: None,
            created_at: Utc::now(),
        };
        state.runs.insert(id, run);
        Ok(true)
    }

    async fn reap_zombies(&self, zombie_timeout: Duration) -> Result<Vec<ReapedRun>> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let zombie_timeout = chrono::Duration::from_std(zombie_timeout).unwrap_or_default();

        let zombie_ids: Vec<i64> = state
            .runs
            .values()
            .filter(|r| {
                r.status == JobRunStatus::Running
                    && r.last_heartbeat_at
                        .map(|beat| beat < now - zombie_timeout)
                        .unwrap_or(true)
            })
            .map(|r| r.id)
            .collect();

        let mut reaped = Vec::with_capacity(zombie_ids.len());
        for run_id in zombie_ids {
            let (job_id, attempt_number, worker_id) = {
                let run = state.runs.get(&run_id).expect("id came from this map");
                (run.job_id, run.attempt_number, run.worker_id.clone())
            };
            let max_retries = state
                .jobs
                .get(&job_id)
                .ok_or(SchedulerError::JobNotFound(job_id))?
                .max_retries;

            let outcome = reap_decision(attempt_number, max_retries);
            let new_status = outcome.status();

            let run = state.runs.get_mut(&run_id).expect("id came from this map");
            run.status = new_status;
            run.worker_id = None;

            reaped.push(ReapedRun {
                run_id,
                job_id,
                worker_id,
                new_status,
            });
        }

        Ok(reaped)
    }

    async fn claim_due_run(
        &self,
        worker_id: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<Option<JobRun>> {
        let mut state = self.state.lock().await;

        let candidate_id = state
            .runs
            .values()
            .filter(|r| r.status.is_claimable() && r.scheduled_time <= now)
            .min_by_key(|r| r.scheduled_time)
            .map(|r| r.id);

        let Some(run_id) = candidate_id else {
            return Ok(None);
        };

        let run = state.runs.get_mut(&run_id).expect("id came from this map");
        run.status = JobRunStatus::Running;
        run.started_at = Some(now);
        run.last_heartbeat_at = Some(now);
        run.worker_id = Some(worker_id.0.clone());
        Ok(Some(run.clone()))
    }

    async fn heartbeat(&self, run_id: i64, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(run) = state.runs.get_mut(&run_id) {
            if run.status == JobRunStatus::Running {
                run.last_heartbeat_at = Some(now);
            }
        }
        Ok(())
    }

    async fn record_success(&self, run_id: i64, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(run) = state.runs.get_mut(&run_id) {
            run.status = JobRunStatus::Success;
            run.finished_at = Some(now);
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        run_id: i64,
        job: &Job,
        now: DateTime<Utc>,
        error_message: &str,
    ) -> Result<JobRunStatus> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .get_mut(&run_id)
            .ok_or(SchedulerError::InvalidJob(format!("run {run_id} not found")))?;

        run.attempt_number += 1;
        run.finished_at = Some(now);
        run.error_message = Some(error_message.to_string());

        let outcome = failure_outcome(run.attempt_number, job.max_retries);
        run.status = outcome.status();
        if matches!(outcome, jobsched_core::outcome::FailureOutcome::Retry) {
            run.scheduled_time = next_retry_time(now, job.retry_delay_sec);
        }
        Ok(run.status)
    }
}
