//! Per-job execution.
//!
//! - [`JobExecutor`]: countdown loop for one running job; evaluates the
//!   expression once the countdown expires or the job is forced to complete
//! - [`heartbeat`]: liveness stamping and countdown stepping
//!
//! # Execution Flow
//!
//! 1. A pool worker claims a pending job and spawns [`JobExecutor::run`]
//! 2. Each heartbeat tick records `last_heartbeat_at` and steps `remaining`
//! 3. At zero the job's completion signal fires
//! 4. The executor parses and evaluates outside the registry lock, then
//!    commits `done` or `invalid`

pub mod executor;
pub mod heartbeat;

pub use executor::{ExecutionResult, JobExecutor};
