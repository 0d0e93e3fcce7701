// SQLite JobStore Implementation

use async_trait::async_trait;
use perfscope_core::domain::{Job, JobId, JobStatus, TargetSet};
use perfscope_core::error::{AppError, Result};
use perfscope_core::port::{IdProvider, JobMutation, JobStore, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            // SQLite error codes: https://www.sqlite.org/rescode.html
            Some(code) => match code.as_ref() {
                "2067" | "1555" => AppError::Store(format!(
                    "Unique constraint violation: {}",
                    db_err.message()
                )),
                "5" => AppError::Store(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::Store(format!("Database full: {}", db_err.message())),
                other => AppError::Store(format!(
                    "Database error [{}]: {}",
                    other,
                    db_err.message()
                )),
            },
            None => AppError::Store(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            AppError::Store(format!("Store unavailable: {}", err))
        }
        _ => AppError::Store(err.to_string()),
    }
}

/// Job store persisting whole snapshots as JSON
///
/// Every `update` reads, mutates and writes the snapshot inside one
/// transaction while holding the store's write lock, so concurrent readers
/// only ever see committed snapshots.
pub struct SqliteJobStore {
    pool: SqlitePool,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    write_lock: Mutex<()>,
}

impl SqliteJobStore {
    pub fn new(
        pool: SqlitePool,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            id_provider,
            time_provider,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, targets: TargetSet) -> Result<JobId> {
        let id = self.id_provider.generate_id();
        let job = Job::new(id.clone(), self.time_provider.now_millis(), targets);
        let snapshot = serde_json::to_string(&job)?;

        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r#"
            INSERT INTO jobs (id, status, progress, main_target, created_at, completed_at, snapshot)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.status.to_string())
        .bind(job.progress as i64)
        .bind(job.targets.main.as_str())
        .bind(job.created_at)
        .bind(job.completed_at)
        .bind(&snapshot)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(job_id = %id, "Job row inserted");
        Ok(id)
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        let snapshot: Option<String> = sqlx::query_scalar("SELECT snapshot FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match snapshot {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: &JobId, mutation: JobMutation) -> Result<Job> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let snapshot: Option<String> = sqlx::query_scalar("SELECT snapshot FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let snapshot = snapshot.ok_or_else(|| AppError::NotFound(id.clone()))?;

        let mut job: Job = serde_json::from_str(&snapshot)?;
        // On error the transaction is dropped and rolled back
        mutation(&mut job)?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, progress = ?, completed_at = ?, snapshot = ?
            WHERE id = ?
            "#,
        )
        .bind(job.status.to_string())
        .bind(job.progress as i64)
        .bind(job.completed_at)
        .bind(serde_json::to_string(&job)?)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(job)
    }

    async fn delete(&self, id: &JobId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE status = ?")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<JobId>> {
        sqlx::query_scalar("SELECT id FROM jobs WHERE status = ? ORDER BY created_at, id")
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use perfscope_core::domain::{AdapterId, AgentResult, AggregatedMetrics};
    use perfscope_core::port::id_provider::SequentialIdProvider;
    use perfscope_core::port::time_provider::FixedTimeProvider;

    async fn setup_store() -> SqliteJobStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteJobStore::new(
            pool,
            Arc::new(SequentialIdProvider::default()),
            Arc::new(FixedTimeProvider(1_000)),
        )
    }

    fn targets() -> TargetSet {
        TargetSet::parse(
            "https://main.example",
            &["https://c1.example".to_string()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = setup_store().await;
        let id = store.create(targets()).await.unwrap();

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.targets, targets());
        assert_eq!(job.created_at, 1_000);
    }

    #[tokio::test]
    async fn test_update_persists_full_snapshot() {
        let store = setup_store().await;
        let id = store.create(targets()).await.unwrap();

        store
            .update(&id, Box::new(|job| job.start(2_000)))
            .await
            .unwrap();
        store
            .update(
                &id,
                Box::new(|job| {
                    let target = job.targets.main.clone();
                    job.record_result(
                        AgentResult::failed(AdapterId::new("gtmetrix"), target, "HTTP 502"),
                        2_500,
                    )?;
                    job.set_analysis(AggregatedMetrics::empty("performance_score"), vec![])
                }),
            )
            .await
            .unwrap();
        let done = store
            .update(&id, Box::new(|job| job.complete(3_000)))
            .await
            .unwrap();
        assert_eq!(done.progress, 100);

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job, done);
        assert_eq!(job.errors.len(), 1);
        assert_eq!(store.count_by_status(JobStatus::Completed).await.unwrap(), 1);
        assert_eq!(store.count_by_status(JobStatus::Running).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_mutation_rolls_back() {
        let store = setup_store().await;
        let id = store.create(targets()).await.unwrap();

        let err = store
            .update(&id, Box::new(|job| job.complete(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(_)));

        // The lock and connection were released
        store
            .update(&id, Box::new(|job| job.start(6)))
            .await
            .unwrap();
        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let store = setup_store().await;
        let missing = "missing".to_string();

        assert!(store.get(&missing).await.unwrap().is_none());
        assert!(store
            .update(&missing, Box::new(|job| job.start(1)))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.delete(&missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_row() {
        let store = setup_store().await;
        let id = store.create(targets()).await.unwrap();

        tokio_test::assert_ok!(store.delete(&id).await);
        assert!(store.get(&id).await.unwrap().is_none());
        assert_eq!(store.count_by_status(JobStatus::Queued).await.unwrap(), 0);
    }
}
