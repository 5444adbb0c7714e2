//! The worker process: repeatedly claims a due run, executes it
//! under a synthetic pass/fail model driven by the job's
//! `failure_probability`, and reports heartbeats on a background task for
//! the duration of execution.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use jobsched_core::config::{self, Tunables};
use jobsched_core::domain::{Job, JobRun, WorkerId};
use jobsched_core::events;
use jobsched_core::presence::{PresenceStore, WorkerPresence};
use jobsched_core::store::JobStore;
use jobsched_postgres::PgJobStore;
use jobsched_presence::RedisPresenceStore;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let tunables = Tunables::load().context("loading worker tunables")?;
    let database_url = config::database_url().context("resolving DATABASE_URL")?;
    let redis_url = config::redis_url().context("resolving REDIS_URL")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("connecting to postgres")?;
    let store = Arc::new(PgJobStore::new(pool));

    let presence = Arc::new(
        RedisPresenceStore::connect(&redis_url, tunables.worker_ttl.as_secs())
            .await
            .context("connecting to redis")?,
    );

    let worker_id = WorkerId::from_env();
    info!(event = events::WORKER_BOOTED, worker_id = %worker_id, "worker starting");

    let mut tick = tokio::time::interval(tunables.poll_interval);
    loop {
        tick.tick().await;

        let now = Utc::now();
        let claimed = match store.claim_due_run(&worker_id, now).await {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(error = %e, "claim attempt failed, will retry next poll");
                continue;
            }
        };

        let Some(run) = claimed else {
            refresh_idle_presence(&presence, &worker_id, None).await;
            continue;
        };

        let job = match store.get_job(run.job_id).await {
            Ok(job) => job,
            Err(e) => {
                error!(run_id = run.id, error = %e, "claimed run references unknown job");
                continue;
            }
        };

        info!(
            event = events::JOB_CLAIMED,
            run_id = run.id,
            job_id = run.job_id,
            worker_id = %worker_id,
            "claimed run"
        );

        if let Err(e) = execute_claimed_run(
            Arc::clone(&store),
            Arc::clone(&presence),
            &worker_id,
            run,
            job,
            tunables.heartbeat_interval,
        )
        .await
        {
            error!(error = %e, "failed to execute claimed run");
        }
    }
}

async fn refresh_idle_presence(
    presence: &RedisPresenceStore,
    worker_id: &WorkerId,
    current_job_run_id: Option<i64>,
) {
    let presence_payload = WorkerPresence {
        worker_id: worker_id.0.clone(),
        last_seen: Utc::now(),
        current_job_run_id,
    };
    if let Err(e) = presence.refresh_worker(worker_id, &presence_payload).await {
        warn!(error = %e, "failed to refresh idle worker presence");
    }
}

/// Runs one claimed job to completion: starts the heartbeat task, rolls the
/// synthetic outcome, sleeps for `execution_time_sec` only on the success
/// path, and records the result. The heartbeat task is always stopped
/// before returning, regardless of which branch below is taken.
async fn execute_claimed_run(
    store: Arc<PgJobStore>,
    presence: Arc<RedisPresenceStore>,
    worker_id: &WorkerId,
    run: JobRun,
    job: Job,
    heartbeat_interval: Duration,
) -> Result<()> {
    presence.mark_running(run.id).await.ok();
    refresh_idle_presence(&presence, worker_id, Some(run.id)).await;

    let heartbeat_handle = spawn_heartbeat_task(
        Arc::clone(&store),
        Arc::clone(&presence),
        worker_id.clone(),
        run.id,
        heartbeat_interval,
    );

    info!(event = events::JOB_STARTED, run_id = run.id, job_id = job.id, "executing run");
    let succeeded = fastrand::f64() >= job.failure_probability;
    if succeeded {
        tokio::time::sleep(Duration::from_secs(job.execution_time_sec.max(0) as u64)).await;
    }

    heartbeat_handle.abort();
    let _ = heartbeat_handle.await;

    let now = Utc::now();

    if succeeded {
        store
            .record_success(run.id, now)
            .await
            .context("recording success")?;
        info!(event = events::JOB_SUCCESS, run_id = run.id, job_id = job.id, "run succeeded");
    } else {
        let error_message = format!(
            "synthetic failure (failure_probability={})",
            job.failure_probability
        );
        let status = store
            .record_failure(run.id, &job, now, &error_message)
            .await
            .context("recording failure")?;
        match status {
            jobsched_core::JobRunStatus::Retry => info!(
                event = events::JOB_RETRY,
                run_id = run.id,
                job_id = job.id,
                "run failed, scheduled for retry"
            ),
            jobsched_core::JobRunStatus::Failed => warn!(
                event = events::JOB_FAILED,
                run_id = run.id,
                job_id = job.id,
                "run failed permanently"
            ),
            other => warn!(run_id = run.id, status = %other, "unexpected outcome status"),
        }
    }

    presence.unmark_running(run.id).await.ok();
    Ok(())
}

fn spawn_heartbeat_task(
    store: Arc<PgJobStore>,
    presence: Arc<RedisPresenceStore>,
    worker_id: WorkerId,
    run_id: i64,
    heartbeat_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(heartbeat_interval);
        loop {
            tick.tick().await;
            let now = Utc::now();
            if let Err(e) = store.heartbeat(run_id, now).await {
                warn!(run_id, error = %e, "heartbeat write failed");
            } else {
                info!(event = events::HEARTBEAT, run_id, "heartbeat");
            }

            let presence_payload = WorkerPresence {
                worker_id: worker_id.0.clone(),
                last_seen: now,
                current_job_run_id: Some(run_id),
            };
            if let Err(e) = presence.refresh_worker(&worker_id, &presence_payload).await {
                warn!(run_id, error = %e, "presence refresh failed during heartbeat");
            }
        }
    })
}
