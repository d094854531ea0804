//! Boundary operations used by the surrounding front-end.
//!
//! Everything that mutates the registry from outside the scheduler goes
//! through [`SubmissionGateway`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::SchedulerConfig;
use crate::error::{CalcError, Result};
use crate::eval::validate_expression;
use crate::scheduler::{Job, JobId, JobRegistry};

/// Outcome of a submission that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new pending job was created
    Accepted(JobId),
    /// The owner already has a live job for this expression; nothing changed
    Duplicate(JobId),
}

impl SubmitOutcome {
    pub fn job_id(&self) -> JobId {
        match self {
            SubmitOutcome::Accepted(id) | SubmitOutcome::Duplicate(id) => *id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, SubmitOutcome::Duplicate(_))
    }
}

#[derive(Debug, Clone)]
pub struct SubmissionGateway {
    registry: Arc<JobRegistry>,
    default_duration: Duration,
    extend_amount: Duration,
}

impl SubmissionGateway {
    pub fn new(registry: Arc<JobRegistry>, config: &SchedulerConfig) -> Self {
        Self {
            registry,
            default_duration: config.default_job_duration,
            extend_amount: config.extend_amount,
        }
    }

    /// Submit an expression on behalf of `owner_id`.
    ///
    /// Input failing the character whitelist is rejected without touching
    /// the registry. The duplicate check and the insert happen under one
    /// write guard.
    pub async fn submit(&self, owner_id: u64, expression: &str) -> Result<SubmitOutcome> {
        if let Err(reason) = validate_expression(expression) {
            tracing::warn!(owner_id, expression, reason = %reason, "Rejected submission");
            return Err(CalcError::InvalidExpression(reason));
        }

        let mut table = self.registry.write().await;
        if let Some(existing) = table.find_active_duplicate(owner_id, expression) {
            tracing::debug!(owner_id, job_id = %existing, "Duplicate submission ignored");
            return Ok(SubmitOutcome::Duplicate(existing));
        }
        if table.is_full() {
            tracing::warn!(owner_id, capacity = table.capacity(), "Job registry at capacity");
            return Err(CalcError::RegistryFull(table.capacity()));
        }

        let id = table.next_id();
        let job = Job::new(id, owner_id, expression.to_string(), self.default_duration);
        if !table.insert(job) {
            return Err(CalcError::RegistryFull(table.capacity()));
        }
        tracing::info!(job_id = %id, owner_id, expression, "Job submitted");
        Ok(SubmitOutcome::Accepted(id))
    }

    /// Whether `owner_id` already has a non-terminal job for `expression`.
    pub async fn is_duplicate(&self, owner_id: u64, expression: &str) -> bool {
        self.registry
            .read()
            .await
            .find_active_duplicate(owner_id, expression)
            .is_some()
    }

    /// Add `amount` to a job's countdown.
    ///
    /// Returns `Ok(false)` if the job is already terminal.
    pub async fn extend(&self, id: JobId, amount: Duration) -> Result<bool> {
        let extended = self
            .registry
            .write()
            .await
            .update(&id, |job| job.extend(amount))
            .ok_or(CalcError::JobNotFound(id))?;

        if extended {
            tracing::info!(job_id = %id, amount_ms = amount.as_millis() as u64, "Job extended");
        } else {
            tracing::debug!(job_id = %id, "Extend ignored for finished job");
        }
        Ok(extended)
    }

    /// Extend by the configured amount.
    pub async fn extend_default(&self, id: JobId) -> Result<bool> {
        self.extend(id, self.extend_amount).await
    }

    /// Skip the rest of a running job's countdown.
    ///
    /// Returns `Ok(false)` if the job is not running.
    pub async fn complete_now(&self, id: JobId) -> Result<bool> {
        let forced = self
            .registry
            .write()
            .await
            .update(&id, |job| job.force_complete())
            .ok_or(CalcError::JobNotFound(id))?;
        if forced {
            tracing::info!(job_id = %id, "Job forced to complete");
        }
        Ok(forced)
    }

    /// Snapshot of `owner_id`'s jobs in submission order.
    pub async fn list_for(&self, owner_id: u64) -> Vec<Job> {
        self.registry
            .read()
            .await
            .jobs_for_owner(owner_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn status(&self, id: JobId) -> Result<Job> {
        self.registry.get(&id).await.ok_or(CalcError::JobNotFound(id))
    }

    /// Running jobs without a heartbeat for longer than `threshold`.
    pub async fn stalled(&self, threshold: Duration) -> Vec<Job> {
        self.registry
            .read()
            .await
            .stalled_jobs(Utc::now(), threshold)
            .into_iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::JobStatus;

    fn gateway() -> SubmissionGateway {
        let registry = Arc::new(JobRegistry::new(100));
        SubmissionGateway::new(registry, &SchedulerConfig::default())
    }

    #[tokio::test]
    async fn submit_creates_pending_job() {
        let gw = gateway();
        let outcome = gw.submit(1, "2 + 2").await.unwrap();
        assert!(!outcome.is_duplicate());

        let job = gw.status(outcome.job_id()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.owner_id, 1);
        assert_eq!(job.remaining, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn invalid_input_does_not_touch_registry() {
        let registry = Arc::new(JobRegistry::new(100));
        let gw = SubmissionGateway::new(registry.clone(), &SchedulerConfig::default());

        let err = gw.submit(1, "2 + abc").await.unwrap_err();
        assert!(matches!(err, CalcError::InvalidExpression(_)));
        assert!(registry.read().await.is_empty());
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let registry = Arc::new(JobRegistry::new(1));
        let gw = SubmissionGateway::new(registry, &SchedulerConfig::default());
        gw.submit(1, "1").await.unwrap();
        let err = gw.submit(1, "2").await.unwrap_err();
        assert!(matches!(err, CalcError::RegistryFull(1)));
    }

    #[tokio::test]
    async fn extend_unknown_job_is_not_found() {
        let gw = gateway();
        let err = gw.extend(JobId(404), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CalcError::JobNotFound(JobId(404))));
    }

    #[tokio::test]
    async fn extend_default_uses_configured_amount() {
        let gw = gateway();
        let id = gw.submit(1, "3 * 3").await.unwrap().job_id();
        assert!(gw.extend_default(id).await.unwrap());
        assert_eq!(gw.status(id).await.unwrap().remaining, Duration::from_secs(20));
    }

    #[tokio::test]
    async fn complete_now_requires_running_job() {
        let gw = gateway();
        let id = gw.submit(1, "3 * 3").await.unwrap().job_id();
        assert!(!gw.complete_now(id).await.unwrap());
        assert!(gw.complete_now(JobId(999)).await.is_err());
    }
}
