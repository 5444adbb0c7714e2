//! PostgreSQL implementation of the job scheduler's [`JobStore`].
//!
//! # Database schema
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id                  BIGSERIAL PRIMARY KEY,
//!     name                TEXT NOT NULL,
//!     schedule            TEXT NOT NULL,
//!     execution_time_sec  BIGINT NOT NULL CHECK (execution_time_sec >= 0),
//!     failure_probability DOUBLE PRECISION NOT NULL
//!         CHECK (failure_probability >= 0 AND failure_probability <= 1),
//!     max_retries         INTEGER NOT NULL DEFAULT 0 CHECK (max_retries >= 0),
//!     retry_delay_sec     BIGINT NOT NULL DEFAULT 5 CHECK (retry_delay_sec >= 0),
//!     is_active           BOOLEAN NOT NULL DEFAULT TRUE,
//!     created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     updated_at          TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//!
//! CREATE TABLE job_runs (
//!     id                  BIGSERIAL PRIMARY KEY,
//!     job_id              BIGINT NOT NULL REFERENCES jobs(id),
//!     scheduled_time      TIMESTAMPTZ NOT NULL,
//!     status              TEXT NOT NULL
//!         CHECK (status IN ('PENDING','QUEUED','RUNNING','SUCCESS','FAILED','RETRY')),
//!     attempt_number      INTEGER NOT NULL DEFAULT 0,
//!     started_at          TIMESTAMPTZ,
//!     finished_at         TIMESTAMPTZ,
//!     last_heartbeat_at   TIMESTAMPTZ,
//!     worker_id           TEXT,
//!     error_message       TEXT,
//!     created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     UNIQUE (job_id, scheduled_time)
//! );
//!
//! CREATE INDEX idx_job_runs_claimable
//!     ON job_runs (scheduled_time)
//!     WHERE status IN ('PENDING', 'RETRY');
//! CREATE INDEX idx_job_runs_running
//!     ON job_runs (last_heartbeat_at)
//!     WHERE status = 'RUNNING';
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use jobsched_postgres::PgJobStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/jobsched").await?;
//! let store = PgJobStore::new(pool);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobsched_core::domain::{Job, JobRun, JobRunStatus, NewJob, NewJobRun, WorkerId};
use jobsched_core::error::{Result, SchedulerError};
use jobsched_core::events;
use jobsched_core::outcome::{failure_outcome, next_retry_time};
use jobsched_core::store::{JobStore, ReapedRun};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// PostgreSQL-backed job store.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn storage_err(e: sqlx::Error) -> SchedulerError {
    SchedulerError::Storage(e.to_string())
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job> {
    Ok(Job {
        id: row.try_get("id").map_err(storage_err)?,
        name: row.try_get("name").map_err(storage_err)?,
        schedule: row.try_get("schedule").map_err(storage_err)?,
        execution_time_sec: row.try_get("execution_time_sec").map_err(storage_err)?,
        failure_probability: row.try_get("failure_probability").map_err(storage_err)?,
        max_retries: row.try_get("max_retries").map_err(storage_err)?,
        retry_delay_sec: row.try_get("retry_delay_sec").map_err(storage_err)?,
        is_active: row.try_get("is_active").map_err(storage_err)?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
        updated_at: row.try_get("updated_at").map_err(storage_err)?,
    })
}

fn row_to_job_run(row: &sqlx::postgres::PgRow) -> Result<JobRun> {
    let status_text: String = row.try_get("status").map_err(storage_err)?;
    let status = JobRunStatus::from_str(&status_text)?;
    Ok(JobRun {
        id: row.try_get("id").map_err(storage_err)?,
        job_id: row.try_get("job_id").map_err(storage_err)?,
        scheduled_time: row.try_get("scheduled_time").map_err(storage_err)?,
        status,
        attempt_number: row.try_get("attempt_number").map_err(storage_err)?,
        started_at: row.try_get("started_at").map_err(storage_err)?,
        finished_at: row.try_get("finished_at").map_err(storage_err)?,
        last_heartbeat_at: row.try_get("last_heartbeat_at").map_err(storage_err)?,
        worker_id: row.try_get("worker_id").map_err(storage_err)?,
        error_message: row.try_get("error_message").map_err(storage_err)?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
    })
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: NewJob) -> Result<Job> {
        job.validate()?;
        let row = sqlx::query(
            r#"
            INSERT INTO jobs
                (name, schedule, execution_time_sec, failure_probability,
                 max_retries, retry_delay_sec, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, name, schedule, execution_time_sec, failure_probability,
                      max_retries, retry_delay_sec, is_active, created_at, updated_at
            "#,
        )
        .bind(&job.name)
        .bind(&job.schedule)
        .bind(job.execution_time_sec)
        .bind(job.failure_probability)
        .bind(job.max_retries)
        .bind(job.retry_delay_sec)
        .bind(job.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        row_to_job(&row)
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query("SELECT * FROM jobs ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(row_to_job).collect()
    }

    async fn list_active_jobs(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE is_active = TRUE ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter().map(row_to_job).collect()
    }

    async fn get_job(&self, job_id: i64) -> Result<Job> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or(SchedulerError::JobNotFound(job_id))?;
        row_to_job(&row)
    }

    async fn list_runs_for_job(&self, job_id: i64, limit: i64) -> Result<Vec<JobRun>> {
        let rows = sqlx::query(
            "SELECT * FROM job_runs WHERE job_id = $1 ORDER BY scheduled_time DESC LIMIT $2",
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter().map(row_to_job_run).collect()
    }

    async fn latest_run_for_job(&self, job_id: i64) -> Result<Option<JobRun>> {
        let row = sqlx::query(
            "SELECT * FROM job_runs WHERE job_id = $1 ORDER BY scheduled_time DESC LIMIT 1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(row_to_job_run).transpose()
    }

    async fn materialize_run(&self, new_run: NewJobRun) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_runs (job_id, scheduled_time, status, attempt_number)
            VALUES ($1, $2, 'PENDING', 0)
            ON CONFLICT (job_id, scheduled_time) DO NOTHING
            "#,
        )
        .bind(new_run.job_id)
        .bind(new_run.scheduled_time)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        // A uniqueness conflict is absorbed silently: the `ON CONFLICT DO
        // NOTHING` makes it indistinguishable from a no-op insert, which is
        // exactly the desired behavior when another scheduler instance
        // already materialized this firing.
        Ok(result.rows_affected() > 0)
    }

    async fn reap_zombies(&self, zombie_timeout: Duration) -> Result<Vec<ReapedRun>> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let cutoff = Utc::now() - chrono::Duration::from_std(zombie_timeout).unwrap_or_default();

        let zombie_rows = sqlx::query(
            r#"
            SELECT id, job_id, attempt_number, worker_id
            FROM job_runs
            WHERE status = 'RUNNING' AND last_heartbeat_at < $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_err)?;

        let mut reaped = Vec::with_capacity(zombie_rows.len());
        for row in &zombie_rows {
            let run_id: i64 = row.try_get("id").map_err(storage_err)?;
            let job_id: i64 = row.try_get("job_id").map_err(storage_err)?;
            let attempt_number: i32 = row.try_get("attempt_number").map_err(storage_err)?;
            let worker_id: Option<String> = row.try_get("worker_id").map_err(storage_err)?;

            warn!(
                event = events::ZOMBIE_DETECTED,
                run_id,
                job_id,
                prior_worker_id = worker_id.as_deref(),
                "detected zombie run with stale heartbeat"
            );

            let max_retries: i32 = sqlx::query("SELECT max_retries FROM jobs WHERE id = $1")
                .bind(job_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage_err)?
                .try_get("max_retries")
                .map_err(storage_err)?;

            let outcome = jobsched_core::reaper::reap_decision(attempt_number, max_retries);
            let new_status = outcome.status();

            sqlx::query(
                r#"
                UPDATE job_runs
                SET status = $1, worker_id = NULL
                WHERE id = $2
                "#,
            )
            .bind(new_status.as_str())
            .bind(run_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

            reaped.push(ReapedRun {
                run_id,
                job_id,
                worker_id,
                new_status,
            });
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(reaped)
    }

    async fn claim_due_run(
        &self,
        worker_id: &WorkerId,
        now: DateTime<Utc>,
    ) -> Result<Option<JobRun>> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let row = sqlx::query(
            r#"
            SELECT *
            FROM job_runs
            WHERE status IN ('PENDING', 'RETRY') AND scheduled_time <= $1
            ORDER BY scheduled_time ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_err)?;

        let Some(row) = row else {
            tx.commit().await.map_err(storage_err)?;
            return Ok(None);
        };

        let run_id: i64 = row.try_get("id").map_err(storage_err)?;

        sqlx::query(
            r#"
            UPDATE job_runs
            SET status = 'RUNNING', started_at = $1, last_heartbeat_at = $1, worker_id = $2
            WHERE id = $3
            "#,
        )
        .bind(now)
        .bind(&worker_id.0)
        .bind(run_id)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        tx.commit().await.map_err(storage_err)?;

        let mut claimed = row_to_job_run(&row)?;
        claimed.status = JobRunStatus::Running;
        claimed.started_at = Some(now);
        claimed.last_heartbeat_at = Some(now);
        claimed.worker_id = Some(worker_id.0.clone());
        Ok(Some(claimed))
    }

    async fn heartbeat(&self, run_id: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_runs
            SET last_heartbeat_at = $1
            WHERE id = $2 AND status = 'RUNNING'
            "#,
        )
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn record_success(&self, run_id: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_runs
            SET status = 'SUCCESS', finished_at = $1
            WHERE id = $2
            "#,
        )
        .bind(now)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }

    async fn record_failure(
        &self,
        run_id: i64,
        job: &Job,
        now: DateTime<Utc>,
        error_message: &str,
    ) -> Result<JobRunStatus> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let attempt_number: i32 = sqlx::query(
            "SELECT attempt_number FROM job_runs WHERE id = $1 FOR UPDATE",
        )
        .bind(run_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_err)?
        .try_get("attempt_number")
        .map_err(storage_err)?;

        let attempt_number = attempt_number + 1;
        let outcome = failure_outcome(attempt_number, job.max_retries);
        let new_status = outcome.status();

        match outcome {
            jobsched_core::outcome::FailureOutcome::Retry => {
                let retry_at = next_retry_time(now, job.retry_delay_sec);
                sqlx::query(
                    r#"
                    UPDATE job_runs
                    SET status = 'RETRY', attempt_number = $1, finished_at = $2,
                        scheduled_time = $3, error_message = $4
                    WHERE id = $5
                    "#,
                )
                .bind(attempt_number)
                .bind(now)
                .bind(retry_at)
                .bind(error_message)
                .bind(run_id)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
            }
            jobsched_core::outcome::FailureOutcome::Failed => {
                sqlx::query(
                    r#"
                    UPDATE job_runs
                    SET status = 'FAILED', attempt_number = $1, finished_at = $2,
                        error_message = $3
                    WHERE id = $4
                    "#,
                )
                .bind(attempt_number)
                .bind(now)
                .bind(error_message)
                .bind(run_id)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
            }
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(new_status)
    }
}
