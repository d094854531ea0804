use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CalcError, Result};
use crate::eval::{format_value, ExprError};
use crate::scheduler::signal::CompletionSignal;

/// Identifier of a job, unique for the lifetime of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(JobId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Invalid,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Invalid)
    }

    /// The only edges are `pending -> running -> {done, invalid}`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Invalid)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "in progress"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Invalid => write!(f, "invalid"),
        }
    }
}

/// One submitted expression and its lifecycle state.
///
/// Jobs are only ever mutated through `&mut JobTable`, which is reachable
/// only through the registry's write guard. `status` is private so every
/// change goes through [`Job::transition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner_id: u64,
    pub expression: String,
    #[serde(rename = "remaining_ms", with = "duration_ms")]
    pub remaining: Duration,
    status: JobStatus,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub heartbeat_count: u64,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: Option<String>,
    pub assigned_worker: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    completion: CompletionSignal,
}

impl Job {
    pub fn new(id: JobId, owner_id: u64, expression: String, duration: Duration) -> Self {
        Self {
            id,
            owner_id,
            expression,
            remaining: duration,
            status: JobStatus::Pending,
            last_heartbeat_at: None,
            heartbeat_count: 0,
            result: String::new(),
            error: None,
            assigned_worker: None,
            created_at: Utc::now(),
            completed_at: None,
            completion: CompletionSignal::new(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn completion(&self) -> &CompletionSignal {
        &self.completion
    }

    /// Move to `next`, rejecting any edge outside the state machine.
    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CalcError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Claim a pending job for `worker_id`.
    pub fn claim(&mut self, worker_id: u64) -> Result<()> {
        self.transition(JobStatus::Running)?;
        self.assigned_worker = Some(worker_id);
        Ok(())
    }

    /// Add time to the countdown. Terminal jobs are left untouched.
    pub fn extend(&mut self, amount: Duration) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.remaining = self.remaining.saturating_add(amount);
        true
    }

    /// Zero the countdown and fire the completion signal of a running job.
    pub fn force_complete(&mut self) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.remaining = Duration::ZERO;
        self.completion.fire();
        true
    }

    /// Commit the evaluator outcome and move to a terminal state.
    ///
    /// The formatted value is written only once, so a repeated commit never
    /// appends a second `= value`.
    pub fn finish(&mut self, outcome: &std::result::Result<f64, ExprError>) -> Result<JobStatus> {
        match outcome {
            Ok(value) => {
                self.transition(JobStatus::Done)?;
                if self.result.is_empty() {
                    self.result = format!("{} = {}", self.expression, format_value(*value));
                }
                self.remaining = Duration::ZERO;
            }
            Err(e) => {
                self.transition(JobStatus::Invalid)?;
                self.error = Some(e.to_string());
            }
        }
        self.completed_at = Some(Utc::now());
        self.completion.fire();
        Ok(self.status)
    }

    /// Reset a job that was mid-execution when the registry was flushed.
    /// Partial countdown progress is discarded.
    pub fn normalize_after_restart(&mut self, default_duration: Duration) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        self.status = JobStatus::Pending;
        self.assigned_worker = None;
        self.remaining = default_duration;
        self.last_heartbeat_at = None;
        true
    }

    /// A running job whose executor has not reported for longer than `threshold`.
    pub fn is_stalled(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        let since = self.last_heartbeat_at.unwrap_or(self.created_at);
        match (now - since).to_std() {
            Ok(elapsed) => elapsed > threshold,
            Err(_) => false,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
