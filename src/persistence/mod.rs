//! Persistence seam for the job registry.
//!
//! The registry is loaded once at startup and flushed once at shutdown.
//! Backends only move whole collections; `running` jobs are normalized to
//! `pending` by [`JobTable::restore`](crate::scheduler::JobTable::restore)
//! regardless of backend.

mod json;
mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::scheduler::Job;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Every persisted job, in the order the backend retained them.
    async fn load_all(&self) -> Result<Vec<Job>>;

    /// Replace the persisted collection with `jobs`.
    async fn save_all(&self, jobs: &[Job]) -> Result<()>;
}
