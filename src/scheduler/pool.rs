use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::SchedulerConfig;
use crate::scheduler::job::JobId;
use crate::scheduler::registry::JobRegistry;
use crate::worker::JobExecutor;

/// Claims pending jobs and launches their executors.
///
/// Shared by every pool worker. Executors are spawned on a common
/// [`TaskTracker`] so the pool can report and drain them.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    executor: JobExecutor,
    executors: TaskTracker,
}

impl Dispatcher {
    pub fn new(registry: Arc<JobRegistry>, executor: JobExecutor) -> Self {
        Self {
            registry,
            executor,
            executors: TaskTracker::new(),
        }
    }

    /// One scan on behalf of `worker_id`.
    ///
    /// Takes the write guard, flips every pending job to `running` and
    /// spawns its executor before releasing the guard, so no two workers
    /// can claim the same job. Returns the claimed ids.
    ///
    /// The scan walks the whole table on every call.
    pub async fn scan(&self, worker_id: u64) -> Vec<JobId> {
        let mut table = self.registry.write().await;
        let claims = table.claim_pending(worker_id);

        for claim in &claims {
            tracing::info!(job_id = %claim.job_id, worker_id, "Job claimed");
            let executor = self.executor.clone();
            let job_id = claim.job_id;
            let signal = claim.signal.clone();
            self.executors.spawn(async move {
                executor.run(job_id, signal).await;
            });
        }
        drop(table);

        claims.into_iter().map(|c| c.job_id).collect()
    }

    /// Number of executors still running.
    pub fn in_flight(&self) -> usize {
        self.executors.len()
    }

    /// Wait up to `timeout` for in-flight executors. Returns true if all finished.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.executors.close();
        let drained = tokio::time::timeout(timeout, self.executors.wait())
            .await
            .is_ok();
        self.executors.reopen();
        drained
    }
}

/// Fixed set of workers scanning the registry on an interval.
pub struct SchedulerPool {
    dispatcher: Dispatcher,
    workers: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl SchedulerPool {
    /// Spawn `config.worker_count` workers. They stop when `shutdown` is
    /// cancelled or [`SchedulerPool::stop`] is called.
    pub fn spawn(
        dispatcher: Dispatcher,
        config: &SchedulerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let shutdown = shutdown.child_token();
        let workers = (0..config.worker_count as u64)
            .map(|worker_id| {
                let dispatcher = dispatcher.clone();
                let token = shutdown.clone();
                let scan_interval = config.scan_interval;
                tokio::spawn(async move {
                    Self::worker_loop(worker_id, dispatcher, scan_interval, token).await;
                })
            })
            .collect();

        tracing::info!(workers = config.worker_count, "Scheduler pool started");

        Self {
            dispatcher,
            workers,
            shutdown,
        }
    }

    /// Worker loop: scan on every tick until cancelled.
    async fn worker_loop(
        worker_id: u64,
        dispatcher: Dispatcher,
        scan_interval: Duration,
        shutdown: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(scan_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(worker_id, "Worker stopping");
                    break;
                }
                _ = interval.tick() => {
                    let claimed = dispatcher.scan(worker_id).await;
                    if !claimed.is_empty() {
                        tracing::debug!(worker_id, claimed = claimed.len(), "Scan claimed jobs");
                    }
                }
            }
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Stop every worker and wait for them to exit. Executors keep running.
    pub async fn stop(self) -> Dispatcher {
        self.shutdown.cancel();
        for handle in self.workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Scheduler worker panicked");
            }
        }
        tracing::info!(
            in_flight = self.dispatcher.in_flight(),
            "Scheduler pool stopped"
        );
        self.dispatcher
    }
}
