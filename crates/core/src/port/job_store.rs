// Job Store Port (Interface)

use crate::domain::{Job, JobId, JobStatus, TargetSet};
use crate::error::{AppError, Result};
use async_trait::async_trait;

/// Mutation applied atomically to a job snapshot
///
/// If the closure returns an error nothing is written.
pub type JobMutation = Box<dyn FnOnce(&mut Job) -> crate::domain::error::Result<()> + Send>;

/// Keyed storage for job snapshots
///
/// `update` must be atomic with respect to concurrent `get` calls: a reader
/// sees either the snapshot before or after a mutation, never a mix.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a new `Queued` job and return its id
    async fn create(&self, targets: TargetSet) -> Result<JobId>;

    /// Fetch a snapshot
    async fn get(&self, id: &JobId) -> Result<Option<Job>>;

    /// Apply a mutation and return the new snapshot (`NotFound` if absent)
    async fn update(&self, id: &JobId, mutation: JobMutation) -> Result<Job>;

    /// Remove a job (`NotFound` if absent)
    async fn delete(&self, id: &JobId) -> Result<()>;

    /// Count jobs by status
    async fn count_by_status(&self, status: JobStatus) -> Result<i64>;

    /// Ids of every job in `status`, oldest first
    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<JobId>>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

pub mod memory {
    use super::*;
    use crate::port::{IdProvider, TimeProvider};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Process-local job store
    ///
    /// Writers hold the write lock while the mutation runs on a copy, then
    /// swap the copy in, so readers only ever clone complete snapshots.
    pub struct InMemoryJobStore {
        jobs: RwLock<HashMap<JobId, Job>>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryJobStore {
        pub fn new(id_provider: Arc<dyn IdProvider>, time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                jobs: RwLock::new(HashMap::new()),
                id_provider,
                time_provider,
            }
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn create(&self, targets: TargetSet) -> Result<JobId> {
            let id = self.id_provider.generate_id();
            let job = Job::new(id.clone(), self.time_provider.now_millis(), targets);

            let mut jobs = self.jobs.write().await;
            if jobs.contains_key(&id) {
                return Err(AppError::Store(format!("duplicate job id {}", id)));
            }
            jobs.insert(id.clone(), job);
            Ok(id)
        }

        async fn get(&self, id: &JobId) -> Result<Option<Job>> {
            Ok(self.jobs.read().await.get(id).cloned())
        }

        async fn update(&self, id: &JobId, mutation: JobMutation) -> Result<Job> {
            let mut jobs = self.jobs.write().await;
            let current = jobs
                .get(id)
                .ok_or_else(|| AppError::NotFound(id.clone()))?;

            let mut next = current.clone();
            mutation(&mut next)?;
            jobs.insert(id.clone(), next.clone());
            Ok(next)
        }

        async fn delete(&self, id: &JobId) -> Result<()> {
            self.jobs
                .write()
                .await
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| AppError::NotFound(id.clone()))
        }

        async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
            let jobs = self.jobs.read().await;
            Ok(jobs.values().filter(|j| j.status == status).count() as i64)
        }

        async fn find_by_status(&self, status: JobStatus) -> Result<Vec<JobId>> {
            let jobs = self.jobs.read().await;
            let mut matching: Vec<&Job> = jobs.values().filter(|j| j.status == status).collect();
            matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            Ok(matching.into_iter().map(|j| j.id.clone()).collect())
        }
    }

}
