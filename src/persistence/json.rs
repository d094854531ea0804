use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::persistence::PersistenceGateway;
use crate::scheduler::Job;

/// Stores the registry as a JSON array in a single file.
///
/// Writes go to `<path>.tmp` first and are renamed into place, so a failed
/// flush never leaves a truncated file behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl PersistenceGateway for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<Job>> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No job file found, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };
        let jobs: Vec<Job> = serde_json::from_slice(&data)?;
        tracing::info!(path = %self.path.display(), jobs = jobs.len(), "Loaded jobs");
        Ok(jobs)
    }

    async fn save_all(&self, jobs: &[Job]) -> Result<()> {
        let data = serde_json::to_vec_pretty(jobs)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::info!(path = %self.path.display(), jobs = jobs.len(), "Saved jobs");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CalcError;
    use crate::scheduler::{JobId, JobStatus};
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let err = JsonFileStore::new(&path).load_all().await.unwrap_err();
        assert!(matches!(err, CalcError::Serialization(_)));
    }

    #[tokio::test]
    async fn save_creates_parent_and_cleans_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("jobs.json");
        let store = JsonFileStore::new(&path);

        let mut done = Job::new(JobId(3), 9, "1 + 2".to_string(), Duration::from_secs(10));
        done.claim(1).unwrap();
        done.finish(&Ok(3.0)).unwrap();
        let pending = Job::new(JobId(4), 9, "4".to_string(), Duration::from_secs(10));
        store.save_all(&[done, pending]).await.unwrap();

        assert!(path.exists());
        assert!(!store.temp_path().exists());

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].status(), JobStatus::Done);
        assert_eq!(loaded[0].result, "1 + 2 = 3");
        assert_eq!(loaded[1].status(), JobStatus::Pending);

        // A later flush replaces the whole collection
        store.save_all(&[]).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails_when_parent_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        tokio::fs::write(&blocker, b"").await.unwrap();

        let store = JsonFileStore::new(blocker.join("jobs.json"));
        let err = store.save_all(&[]).await.unwrap_err();
        assert!(matches!(err, CalcError::Io(_)));
    }
}
