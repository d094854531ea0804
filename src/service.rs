use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::eval::Evaluator;
use crate::gateway::SubmissionGateway;
use crate::persistence::PersistenceGateway;
use crate::scheduler::{Dispatcher, JobRegistry, JobStatus, JobTable, SchedulerPool};
use crate::worker::JobExecutor;

/// Wires registry, pool, gateway and persistence together.
pub struct CalcService {
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    gateway: SubmissionGateway,
    pool: SchedulerPool,
    store: Arc<dyn PersistenceGateway>,
}

impl CalcService {
    /// Load persisted jobs and start the scheduler pool.
    ///
    /// Jobs persisted as `running` come back as `pending` and are claimed
    /// again by the pool. The pool stops when `shutdown` is cancelled;
    /// call [`CalcService::shutdown`] afterwards to flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the store cannot
    /// be read.
    pub async fn start(
        config: SchedulerConfig,
        evaluator: Arc<dyn Evaluator>,
        store: Arc<dyn PersistenceGateway>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        let jobs = store.load_all().await?;
        let table = JobTable::restore(jobs, config.default_job_duration, config.max_jobs);
        tracing::info!(
            jobs = table.len(),
            pending = table.count_by_status(JobStatus::Pending),
            "Registry restored"
        );
        let registry = Arc::new(JobRegistry::from_table(table));

        let executor = JobExecutor::new(registry.clone(), evaluator, config.heartbeat_interval);
        let dispatcher = Dispatcher::new(registry.clone(), executor);
        let pool = SchedulerPool::spawn(dispatcher, &config, shutdown);
        let gateway = SubmissionGateway::new(registry.clone(), &config);

        Ok(Self {
            config,
            registry,
            gateway,
            pool,
            store,
        })
    }

    pub fn gateway(&self) -> &SubmissionGateway {
        &self.gateway
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    /// Save the current registry contents without stopping anything.
    pub async fn flush(&self) -> Result<()> {
        flush_registry(&self.registry, self.store.as_ref()).await
    }

    /// Stop claiming, optionally wait for executors, then flush the registry.
    ///
    /// Jobs still running are saved as they are and resume from `pending`
    /// on the next start.
    ///
    /// # Errors
    ///
    /// Returns the persistence error if the flush fails.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            config,
            registry,
            pool,
            store,
            ..
        } = self;
        let dispatcher = pool.stop().await;

        if !config.drain_timeout.is_zero() && dispatcher.in_flight() > 0 {
            if dispatcher.drain(config.drain_timeout).await {
                tracing::info!("All executors drained");
            } else {
                tracing::warn!(
                    in_flight = dispatcher.in_flight(),
                    "Drain timed out, persisting running jobs as-is"
                );
            }
        }

        flush_registry(&registry, store.as_ref()).await
    }
}

async fn flush_registry(registry: &JobRegistry, store: &dyn PersistenceGateway) -> Result<()> {
    // Snapshot first so the read guard is not held across the write
    let jobs = registry.snapshot().await;
    match store.save_all(&jobs).await {
        Ok(()) => {
            tracing::info!(jobs = jobs.len(), "Registry flushed");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, jobs = jobs.len(), "Failed to flush registry");
            Err(e)
        }
    }
}
