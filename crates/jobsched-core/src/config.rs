//! Environment-driven configuration for the scheduler and worker tunables.
//! Each binary calls [`Tunables::load`] once at startup after loading an
//! optional `.env` file via `dotenvy`.

use std::time::Duration;

use crate::error::{Result, SchedulerError};

/// Scheduling/liveness tunables, with sensible production defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub worker_ttl: Duration,
    pub scheduler_interval: Duration,
    pub zombie_timeout: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
            worker_ttl: Duration::from_secs(15),
            scheduler_interval: Duration::from_secs(2),
            zombie_timeout: Duration::from_secs(60),
        }
    }
}

impl Tunables {
    /// Load tunables from the environment, falling back to the defaults
    /// above for anything unset. Rejects configurations that violate the
    /// `ZOMBIE_TIMEOUT > 2 * HEARTBEAT_INTERVAL` requirement rather than
    /// silently clamping it.
    pub fn load() -> Result<Self> {
        // Best-effort; a missing .env file is not an error.
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let tunables = Self {
            poll_interval: env_secs("POLL_INTERVAL", defaults.poll_interval)?,
            heartbeat_interval: env_secs("HEARTBEAT_INTERVAL", defaults.heartbeat_interval)?,
            worker_ttl: env_secs("WORKER_TTL", defaults.worker_ttl)?,
            scheduler_interval: env_secs("SCHEDULER_INTERVAL", defaults.scheduler_interval)?,
            zombie_timeout: env_secs("ZOMBIE_TIMEOUT", defaults.zombie_timeout)?,
        };
        tunables.validate()?;
        Ok(tunables)
    }

    fn validate(&self) -> Result<()> {
        if self.zombie_timeout <= 2 * self.heartbeat_interval {
            return Err(SchedulerError::InvalidConfig(format!(
                "ZOMBIE_TIMEOUT ({:?}) must be > 2 * HEARTBEAT_INTERVAL ({:?})",
                self.zombie_timeout, self.heartbeat_interval
            )));
        }
        Ok(())
    }
}

fn env_secs(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw.parse().map_err(|_| {
                SchedulerError::InvalidConfig(format!("{name}={raw:?} is not a valid integer"))
            })?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}

/// Database connection string, read from `DATABASE_URL`.
pub fn database_url() -> Result<String> {
    std::env::var("DATABASE_URL")
        .map_err(|_| SchedulerError::InvalidConfig("DATABASE_URL is not set".into()))
}

/// Presence-store (Redis) connection string, read from `REDIS_URL`.
pub fn redis_url() -> Result<String> {
    std::env::var("REDIS_URL")
        .map_err(|_| SchedulerError::InvalidConfig("REDIS_URL is not set".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize the tests that
    // touch them so they don't stomp on each other under the test harness's
    // default multi-threaded execution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_satisfy_their_own_validation() {
        let _guard = ENV_LOCK.lock().unwrap();
        assert!(Tunables::default().validate().is_ok());
    }

    #[test]
    fn rejects_zombie_timeout_too_close_to_heartbeat() {
        let _guard = ENV_LOCK.lock().unwrap();
        let bad = Tunables {
            zombie_timeout: Duration::from_secs(8),
            heartbeat_interval: Duration::from_secs(5),
            ..Tunables::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn env_secs_falls_back_to_default_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("JOBSCHED_TEST_TUNABLE");
        let v = env_secs("JOBSCHED_TEST_TUNABLE", Duration::from_secs(42)).unwrap();
        assert_eq!(v, Duration::from_secs(42));
    }

    #[test]
    fn env_secs_rejects_non_integer() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("JOBSCHED_TEST_TUNABLE", "not-a-number");
        let result = env_secs("JOBSCHED_TEST_TUNABLE", Duration::from_secs(1));
        std::env::remove_var("JOBSCHED_TEST_TUNABLE");
        assert!(result.is_err());
    }
}
