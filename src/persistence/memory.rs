use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::persistence::PersistenceGateway;
use crate::scheduler::Job;

/// In-process backend. Survives service restarts within one process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: Mutex<Vec<Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        Self {
            jobs: Mutex::new(jobs),
        }
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn load_all(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.lock().await.clone())
    }

    async fn save_all(&self, jobs: &[Job]) -> Result<()> {
        *self.jobs.lock().await = jobs.to_vec();
        Ok(())
    }
}
