// Startup recovery of interrupted jobs
use crate::domain::{JobId, JobStatus};
use crate::error::Result;
use crate::port::{JobStore, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Failure reason recorded on recovered jobs
pub const INTERRUPTED_REASON: &str = "interrupted by daemon restart";

/// Drives jobs left `Queued` or `Running` by a previous process to `Failed`
///
/// Job tasks live only inside the process that created them, so after a
/// restart nothing will ever move such a job forward. Must run before the
/// orchestrator accepts new jobs.
pub struct RecoveryService {
    store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn JobStore>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            time_provider,
        }
    }

    /// Returns the number of jobs marked failed
    pub async fn recover_interrupted_jobs(&self) -> Result<usize> {
        let mut recovered = 0;

        for status in [JobStatus::Running, JobStatus::Queued] {
            for job_id in self.store.find_by_status(status).await? {
                if self.recover_job(&job_id, status).await? {
                    recovered += 1;
                }
            }
        }

        info!(recovered, "Interrupted job recovery complete");
        Ok(recovered)
    }

    async fn recover_job(&self, job_id: &JobId, status: JobStatus) -> Result<bool> {
        let now = self.time_provider.now_millis();
        let outcome = self
            .store
            .update(
                job_id,
                Box::new(move |job| {
                    // Queued jobs pass through Running so the only edge into
                    // Failed stays Running -> Failed
                    if job.status == JobStatus::Queued {
                        job.start(now)?;
                    }
                    job.fail(now, INTERRUPTED_REASON)
                }),
            )
            .await;

        match outcome {
            Ok(_) => {
                warn!(job_id = %job_id, previous = %status, "Recovered interrupted job as failed");
                Ok(true)
            }
            // Deleted since it was listed
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TargetSet;
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::job_store::memory::InMemoryJobStore;
    use crate::port::time_provider::FixedTimeProvider;

    fn store() -> Arc<dyn JobStore> {
        Arc::new(InMemoryJobStore::new(
            Arc::new(SequentialIdProvider::default()),
            Arc::new(FixedTimeProvider(1_000)),
        ))
    }

    fn targets() -> TargetSet {
        TargetSet::parse("https://a.example", &[]).unwrap()
    }

    #[tokio::test]
    async fn test_non_terminal_jobs_are_failed() {
        let store = store();
        let queued = store.create(targets()).await.unwrap();
        let running = store.create(targets()).await.unwrap();
        store
            .update(&running, Box::new(|job| job.start(1_500)))
            .await
            .unwrap();

        let service = RecoveryService::new(store.clone(), Arc::new(FixedTimeProvider(2_000)));
        assert_eq!(service.recover_interrupted_jobs().await.unwrap(), 2);

        for id in [&queued, &running] {
            let job = store.get(id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.progress, 100);
            assert_eq!(job.failure_reason.as_deref(), Some(INTERRUPTED_REASON));
            assert_eq!(job.completed_at, Some(2_000));
        }
        assert_eq!(store.count_by_status(JobStatus::Queued).await.unwrap(), 0);
        assert_eq!(store.count_by_status(JobStatus::Running).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_untouched() {
        let store = store();
        let id = store.create(targets()).await.unwrap();
        store
            .update(
                &id,
                Box::new(|job| {
                    job.start(1_100)?;
                    job.fail(1_200, "store unavailable")
                }),
            )
            .await
            .unwrap();

        let service = RecoveryService::new(store.clone(), Arc::new(FixedTimeProvider(2_000)));
        assert_eq!(service.recover_interrupted_jobs().await.unwrap(), 0);

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.failure_reason.as_deref(), Some("store unavailable"));
        assert_eq!(job.completed_at, Some(1_200));
    }
}
