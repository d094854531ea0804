use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::scheduler::job::{Job, JobId, JobStatus};
use crate::scheduler::signal::CompletionSignal;

const DEFAULT_MAX_JOBS: usize = 10_000;

/// A job flipped to `running` by a pool worker, with the signal its executor waits on.
#[derive(Debug, Clone)]
pub struct Claim {
    pub job_id: JobId,
    pub signal: CompletionSignal,
}

/// Job state keyed by id. Only reachable through [`JobRegistry`] guards.
#[derive(Debug)]
pub struct JobTable {
    jobs: BTreeMap<JobId, Job>,
    next_id: u64,
    max_jobs: usize,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_JOBS)
    }

    pub fn with_capacity(max_jobs: usize) -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_id: 1,
            max_jobs,
        }
    }

    /// Rebuild a table from persisted jobs.
    ///
    /// Jobs caught mid-execution are reset to `pending` with a fresh
    /// countdown. Id allocation resumes above the highest loaded id.
    pub fn restore(jobs: Vec<Job>, default_duration: Duration, max_jobs: usize) -> Self {
        let mut table = Self::with_capacity(max_jobs);
        for mut job in jobs {
            if job.normalize_after_restart(default_duration) {
                tracing::info!(job_id = %job.id, "Reset interrupted job to pending");
            }
            table.next_id = table.next_id.max(job.id.0.saturating_add(1));
            // Loaded jobs bypass the capacity check so nothing persisted is dropped
            table.jobs.insert(job.id, job);
        }
        table
    }

    /// Allocate the next job id. Ids are never reused within a table.
    pub fn next_id(&mut self) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add a job. Returns false if the table is at capacity.
    pub fn insert(&mut self, job: Job) -> bool {
        if !job.is_terminal() && self.is_full() {
            return false;
        }
        self.jobs.insert(job.id, job);
        true
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    /// Read-modify-write a single job.
    pub fn update<R>(&mut self, id: &JobId, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.jobs.get_mut(id).map(f)
    }

    /// Non-terminal job of `owner_id` with the same expression, if any.
    pub fn find_active_duplicate(&self, owner_id: u64, expression: &str) -> Option<JobId> {
        self.jobs
            .values()
            .find(|j| j.owner_id == owner_id && j.expression == expression && !j.is_terminal())
            .map(|j| j.id)
    }

    /// Flip every pending job to `running` on behalf of `worker_id`.
    pub fn claim_pending(&mut self, worker_id: u64) -> Vec<Claim> {
        let mut claims = Vec::new();
        for job in self.jobs.values_mut() {
            if job.status() != JobStatus::Pending {
                continue;
            }
            match job.claim(worker_id) {
                Ok(()) => claims.push(Claim {
                    job_id: job.id,
                    signal: job.completion().clone(),
                }),
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to claim job");
                }
            }
        }
        claims
    }

    pub fn pending_jobs(&self) -> Vec<&Job> {
        self.jobs
            .values()
            .filter(|j| j.status() == JobStatus::Pending)
            .collect()
    }

    /// All jobs in id order.
    pub fn all_jobs(&self) -> Vec<&Job> {
        self.jobs.values().collect()
    }

    pub fn jobs_for_owner(&self, owner_id: u64) -> Vec<&Job> {
        self.jobs
            .values()
            .filter(|j| j.owner_id == owner_id)
            .collect()
    }

    pub fn stalled_jobs(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<&Job> {
        self.jobs
            .values()
            .filter(|j| j.is_stalled(now, threshold))
            .collect()
    }

    pub fn count_by_status(&self, status: JobStatus) -> usize {
        self.jobs.values().filter(|j| j.status() == status).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs not yet done or invalid.
    pub fn active_len(&self) -> usize {
        self.jobs.values().filter(|j| !j.is_terminal()).count()
    }

    /// Only active jobs count toward capacity; finished jobs stay visible
    /// without blocking new submissions.
    pub fn is_full(&self) -> bool {
        self.active_len() >= self.max_jobs
    }

    pub fn capacity(&self) -> usize {
        self.max_jobs
    }
}

/// The shared job store.
///
/// Readers take [`JobRegistry::read`]; every mutation goes through
/// [`JobRegistry::write`]. Callers must not hold the write guard across
/// evaluation or I/O.
#[derive(Debug, Default)]
pub struct JobRegistry {
    table: RwLock<JobTable>,
}

impl JobRegistry {
    pub fn new(max_jobs: usize) -> Self {
        Self::from_table(JobTable::with_capacity(max_jobs))
    }

    pub fn from_table(table: JobTable) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, JobTable> {
        self.table.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, JobTable> {
        self.table.write().await
    }

    pub async fn get(&self, id: &JobId) -> Option<Job> {
        self.table.read().await.get(id).cloned()
    }

    /// Consistent copy of every job, in id order.
    pub async fn snapshot(&self) -> Vec<Job> {
        self.table
            .read()
            .await
            .all_jobs()
            .into_iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(table: &mut JobTable, owner: u64, expr: &str) -> JobId {
        let id = table.next_id();
        assert!(table.insert(Job::new(id, owner, expr.to_string(), Duration::from_secs(10))));
        id
    }

    #[test]
    fn ids_are_monotonic() {
        let mut table = JobTable::new();
        let a = table.next_id();
        let b = table.next_id();
        let c = table.next_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn insert_respects_capacity() {
        let mut table = JobTable::with_capacity(2);
        add(&mut table, 1, "1");
        add(&mut table, 1, "2");
        assert!(table.is_full());

        let id = table.next_id();
        assert!(!table.insert(Job::new(id, 1, "3".into(), Duration::ZERO)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn finished_jobs_free_capacity() {
        let mut table = JobTable::with_capacity(2);
        let a = add(&mut table, 1, "1");
        let b = add(&mut table, 1, "2");
        assert!(table.is_full());

        table.claim_pending(0);
        for id in [a, b] {
            table.update(&id, |job| job.finish(&Ok(1.0))).unwrap().unwrap();
        }
        assert_eq!(table.active_len(), 0);
        assert!(!table.is_full());

        add(&mut table, 1, "3");
        add(&mut table, 1, "4");
        assert_eq!(table.len(), 4);
        assert!(table.is_full());
    }

    #[test]
    fn claim_pending_takes_every_pending_job_once() {
        let mut table = JobTable::new();
        let a = add(&mut table, 1, "1 + 1");
        let b = add(&mut table, 2, "2 + 2");

        let claims = table.claim_pending(4);
        let ids: Vec<JobId> = claims.iter().map(|c| c.job_id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(table.get(&a).unwrap().assigned_worker, Some(4));
        assert_eq!(table.count_by_status(JobStatus::Running), 2);

        assert!(table.claim_pending(5).is_empty());
        assert_eq!(table.get(&b).unwrap().assigned_worker, Some(4));
    }

    #[test]
    fn duplicate_lookup_ignores_terminal_jobs() {
        let mut table = JobTable::new();
        let id = add(&mut table, 1, "2 + 2");
        assert_eq!(table.find_active_duplicate(1, "2 + 2"), Some(id));
        assert_eq!(table.find_active_duplicate(2, "2 + 2"), None);
        assert_eq!(table.find_active_duplicate(1, "2 + 3"), None);

        table.claim_pending(0);
        table.update(&id, |job| job.finish(&Ok(4.0))).unwrap().unwrap();
        assert_eq!(table.find_active_duplicate(1, "2 + 2"), None);
    }

    #[test]
    fn jobs_for_owner_in_id_order() {
        let mut table = JobTable::new();
        let a = add(&mut table, 1, "1");
        add(&mut table, 2, "2");
        let c = add(&mut table, 1, "3");

        let mine: Vec<JobId> = table.jobs_for_owner(1).iter().map(|j| j.id).collect();
        assert_eq!(mine, vec![a, c]);
        assert!(table.jobs_for_owner(99).is_empty());
    }

    #[test]
    fn restore_normalizes_running_jobs_and_resumes_ids() {
        let mut running = Job::new(JobId(41), 1, "1 + 1".into(), Duration::from_secs(3));
        running.claim(2).unwrap();
        let mut done = Job::new(JobId(7), 1, "2 + 2".into(), Duration::from_secs(10));
        done.claim(0).unwrap();
        done.finish(&Ok(4.0)).unwrap();

        let mut table = JobTable::restore(vec![running, done], Duration::from_secs(10), 100);

        let restored = table.get(&JobId(41)).unwrap();
        assert_eq!(restored.status(), JobStatus::Pending);
        assert_eq!(restored.remaining, Duration::from_secs(10));
        assert_eq!(table.get(&JobId(7)).unwrap().status(), JobStatus::Done);
        assert_eq!(table.next_id(), JobId(42));
        assert_eq!(table.pending_jobs().len(), 1);
    }

    #[tokio::test]
    async fn registry_snapshot_is_a_copy() {
        let registry = JobRegistry::new(10);
        let id = {
            let mut table = registry.write().await;
            add(&mut table, 1, "5 * 5")
        };

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 1);

        registry
            .write()
            .await
            .update(&id, |job| job.extend(Duration::from_secs(1)));
        assert_eq!(snapshot[0].remaining, Duration::from_secs(10));
        assert_eq!(
            registry.get(&id).await.unwrap().remaining,
            Duration::from_secs(11)
        );
    }
}
