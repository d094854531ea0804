use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CalcError, Result};

const DEFAULT_MAX_JOBS: usize = 10_000;

/// Timing and sizing knobs for the scheduler pool and job executors.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of pool workers scanning the registry
    pub worker_count: usize,
    /// Interval between two scans of the same worker
    pub scan_interval: Duration,
    /// Interval between executor heartbeats; also the countdown step
    pub heartbeat_interval: Duration,
    /// Countdown given to a freshly submitted job
    pub default_job_duration: Duration,
    /// Amount added by `extend_default`
    pub extend_amount: Duration,
    /// Maximum number of pending or running jobs; submissions beyond it are rejected
    pub max_jobs: usize,
    /// How long shutdown waits for in-flight executors before flushing.
    /// Zero flushes immediately.
    pub drain_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            scan_interval: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(2),
            default_job_duration: Duration::from_secs(10),
            extend_amount: Duration::from_secs(10),
            max_jobs: DEFAULT_MAX_JOBS,
            drain_timeout: Duration::ZERO,
        }
    }
}

impl SchedulerConfig {
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_job_duration(mut self, duration: Duration) -> Self {
        self.default_job_duration = duration;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// Reject settings the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(CalcError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.scan_interval.is_zero() {
            return Err(CalcError::InvalidConfig(
                "scan_interval must be non-zero".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(CalcError::InvalidConfig(
                "heartbeat_interval must be non-zero".to_string(),
            ));
        }
        if self.max_jobs == 0 {
            return Err(CalcError::InvalidConfig(
                "max_jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the registry is flushed at shutdown and reloaded at startup.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data.json"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
}

impl ServiceConfig {
    pub fn new(scheduler: SchedulerConfig, data_path: PathBuf) -> Self {
        Self {
            scheduler,
            storage: StorageConfig { data_path },
        }
    }
}
