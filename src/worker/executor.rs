use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::eval::{Evaluator, ExprError};
use crate::scheduler::{CompletionSignal, JobId, JobRegistry, JobStatus};
use crate::worker::heartbeat::{apply_heartbeat, HeartbeatOutcome, HeartbeatTicker};

/// Result of one executor run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub job_id: JobId,
    /// Terminal status written back, or `None` if the job vanished or was
    /// no longer running.
    pub status: Option<JobStatus>,
    pub value: Option<f64>,
    pub heartbeats: u64,
}

/// Drives a single running job from claim to terminal state.
///
/// The executor alternates between heartbeat ticks and the job's completion
/// signal. Every registry access is a short read or write; evaluation runs
/// with no guard held.
#[derive(Clone)]
pub struct JobExecutor {
    registry: Arc<JobRegistry>,
    evaluator: Arc<dyn Evaluator>,
    heartbeat_interval: Duration,
}

impl std::fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish_non_exhaustive()
    }
}

impl JobExecutor {
    pub fn new(
        registry: Arc<JobRegistry>,
        evaluator: Arc<dyn Evaluator>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            registry,
            evaluator,
            heartbeat_interval,
        }
    }

    /// Run the countdown loop for `job_id` until it reaches a terminal state.
    pub async fn run(&self, job_id: JobId, signal: CompletionSignal) -> ExecutionResult {
        tracing::debug!(job_id = %job_id, "Executor started");
        let mut ticker = HeartbeatTicker::new(self.heartbeat_interval);
        let mut heartbeats = 0u64;

        loop {
            tokio::select! {
                biased;

                _ = signal.wait() => {
                    let (status, value) = self.complete(job_id).await;
                    return ExecutionResult { job_id, status, value, heartbeats };
                }

                _ = ticker.tick() => {
                    let outcome = {
                        let mut table = self.registry.write().await;
                        table.update(&job_id, |job| {
                            apply_heartbeat(job, ticker.period(), Utc::now())
                        })
                    };
                    match outcome {
                        Some(HeartbeatOutcome::Counting(remaining)) => {
                            heartbeats += 1;
                            tracing::debug!(
                                job_id = %job_id,
                                remaining_ms = remaining.as_millis() as u64,
                                "Heartbeat"
                            );
                        }
                        Some(HeartbeatOutcome::Expired) => {
                            heartbeats += 1;
                            tracing::debug!(job_id = %job_id, "Countdown expired");
                        }
                        Some(HeartbeatOutcome::Stopped) | None => {
                            tracing::warn!(job_id = %job_id, "Job no longer running, executor exiting");
                            return ExecutionResult { job_id, status: None, value: None, heartbeats };
                        }
                    }
                }
            }
        }
    }

    /// Evaluate the job's expression and commit the terminal state.
    async fn complete(&self, job_id: JobId) -> (Option<JobStatus>, Option<f64>) {
        let expression = {
            let table = self.registry.read().await;
            match table.get(&job_id) {
                Some(job) if job.status() == JobStatus::Running => job.expression.clone(),
                Some(job) => {
                    tracing::debug!(job_id = %job_id, status = %job.status(), "Job already settled");
                    return (Some(job.status()), None);
                }
                None => {
                    tracing::warn!(job_id = %job_id, "Job disappeared before completion");
                    return (None, None);
                }
            }
        };

        let outcome = self.evaluate(job_id, &expression);

        let committed = {
            let mut table = self.registry.write().await;
            table.update(&job_id, |job| {
                if job.is_terminal() {
                    Ok(job.status())
                } else {
                    job.finish(&outcome)
                }
            })
        };

        match committed {
            Some(Ok(status)) => {
                match &outcome {
                    Ok(value) => {
                        tracing::info!(job_id = %job_id, expression = %expression, value, "Job done");
                    }
                    Err(e) => {
                        tracing::info!(job_id = %job_id, expression = %expression, error = %e, "Job invalid");
                    }
                }
                (Some(status), outcome.ok())
            }
            Some(Err(e)) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to commit job result");
                (None, None)
            }
            None => {
                tracing::warn!(job_id = %job_id, "Job disappeared before result commit");
                (None, None)
            }
        }
    }

    /// Run the evaluator, turning a panic into an evaluation failure so the
    /// job still reaches a terminal state.
    fn evaluate(&self, job_id: JobId, expression: &str) -> Result<f64, ExprError> {
        let payload = match catch_unwind(AssertUnwindSafe(|| self.evaluator.run(expression))) {
            Ok(outcome) => return outcome,
            Err(payload) => payload,
        };
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!(job_id = %job_id, reason = %reason, "Evaluator panicked");
        Err(ExprError::Evaluation(format!("evaluator panicked: {reason}")))
    }
}
