use thiserror::Error;

use crate::scheduler::{JobId, JobStatus};

#[derive(Error, Debug)]
pub enum CalcError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Job registry at capacity ({0} active jobs)")]
    RegistryFull(usize),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CalcError>;
