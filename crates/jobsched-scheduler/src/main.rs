//! The scheduler process: on a fixed tick, reaps zombie runs and
//! materializes due runs for every active job. Stateless between ticks —
//! any number of scheduler instances may run concurrently against the same
//! database; duplicate materialization is absorbed by the uniqueness
//! constraint on `(job_id, scheduled_time)`.

use std::time::Duration;

use anyhow::{Context, Result};
use jobsched_core::config::{self, Tunables};
use jobsched_core::events;
use jobsched_core::materialize::{due_run, materialization_base};
use jobsched_core::presence::PresenceStore;
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

    let tunables = Tunables::load().context("loading scheduler tunables")?;
    let database_url = config::database_url().context("resolving DATABASE_URL")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .context("connecting to postgres")?;
    let store = PgJobStore::new(pool);

    let redis_url = config::redis_url().context("resolving REDIS_URL")?;
    let presence = RedisPresenceStore::connect(&redis_url, tunables.worker_ttl.as_secs())
        .await
        .context("connecting to redis")?;
    // Best-effort: clear dashboard state left behind by a prior deployment.
    // Purely observational, so losing this race with another scheduler
    // instance is harmless.
    if let Err(e) = presence.sweep_stale_workers().await {
        warn!(error = %e, "failed to sweep stale worker presence at startup");
    }

    info!(event = events::SCHEDULER_STARTED, ?tunables, "scheduler starting");

    let mut tick = tokio::time::interval(tunables.scheduler_interval);
    loop {
        tick.tick().await;
        if let Err(e) = run_tick(&store, tunables.zombie_timeout).await {
            error!(error = %e, "scheduler tick failed, will retry next interval");
        }
    }
}

async fn run_tick(store: &PgJobStore, zombie_timeout: Duration) -> Result<()> {
    reap_zombies(store, zombie_timeout).await?;
    materialize_due_runs(store).await?;
    Ok(())
}

async fn reap_zombies(store: &PgJobStore, zombie_timeout: Duration) -> Result<()> {
    let reaped = store
        .reap_zombies(zombie_timeout)
        .await
        .context("reaping zombie runs")?;
    for r in reaped {
        match r.new_status {
            jobsched_core::JobRunStatus::Retry => info!(
                event = events::ZOMBIE_RECOVERED,
                run_id = r.run_id,
                job_id = r.job_id,
                prior_worker_id = r.worker_id.as_deref(),
                "zombie run requeued for retry"
            ),
            jobsched_core::JobRunStatus::Failed => warn!(
                event = events::ZOMBIE_FAILED,
                run_id = r.run_id,
                job_id = r.job_id,
                prior_worker_id = r.worker_id.as_deref(),
                "zombie run exhausted retries, marked failed"
            ),
            other => warn!(
                run_id = r.run_id,
                job_id = r.job_id,
                status = %other,
                "zombie run transitioned to unexpected status"
            ),
        }
    }
    Ok(())
}

async fn materialize_due_runs(store: &PgJobStore) -> Result<()> {
    let now = chrono::Utc::now();
    let jobs = store.list_active_jobs().await.context("listing active jobs")?;

    for job in jobs {
        let last_run = store
            .latest_run_for_job(job.id)
            .await
            .with_context(|| format!("fetching latest run for job {}", job.id))?;
        let base = materialization_base(&job, last_run.map(|r| r.scheduled_time));

        let new_run = match due_run(&job, base, now) {
            Ok(Some(run)) => run,
            Ok(None) => continue,
            Err(e) => {
                warn!(job_id = job.id, schedule = %job.schedule, error = %e, "skipping job with invalid schedule");
                continue;
            }
        };

        let scheduled_time = new_run.scheduled_time;
        match store.materialize_run(new_run).await {
            Ok(true) => info!(
                event = events::JOB_SCHEDULED,
                job_id = job.id,
                scheduled_time = %scheduled_time,
                "materialized new run"
            ),
            Ok(false) => {
                // Another scheduler instance already materialized this
                // firing; the uniqueness conflict was absorbed.
            }
            Err(e) => error!(job_id = job.id, error = %e, "failed to materialize run"),
        }
    }

    Ok(())
}
