//! Job registry and polling scheduler.
//!
//! - [`Job`] / [`JobStatus`]: one submission and its `pending -> running -> {done, invalid}` lifecycle
//! - [`JobRegistry`]: the single shared store, read/write guarded
//! - [`SchedulerPool`]: workers that scan for pending jobs and start executors
//! - [`CompletionSignal`]: idempotent one-shot wakeup for an executor

pub mod job;
pub mod pool;
pub mod registry;
pub mod signal;

pub use job::{Job, JobId, JobStatus};
pub use pool::{Dispatcher, SchedulerPool};
pub use registry::{Claim, JobRegistry, JobTable};
pub use signal::CompletionSignal;
