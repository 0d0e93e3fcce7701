// Migration Runner

use perfscope_core::error::{AppError, Result};
use sqlx::SqlitePool;
use tracing::info;

/// Versioned schema scripts, applied in order
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "job snapshots",
    include_str!("../migrations/001_jobs.sql"),
)];

/// Bring the schema up to the latest version
///
/// Each script runs in its own transaction together with its
/// `schema_version` row, so a failed script leaves no partial schema.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(store_error)?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(store_error)?;

    let pending: Vec<_> = MIGRATIONS.iter().filter(|(v, _, _)| *v > current).collect();
    if pending.is_empty() {
        info!(version = current, "Schema up to date");
        return Ok(());
    }

    for (version, name, sql) in pending {
        info!(version, name, "Applying migration");
        let mut tx = pool.begin().await.map_err(store_error)?;
        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        sqlx::query(
            "INSERT INTO schema_version (version, applied_at)
             VALUES (?, CAST(strftime('%s', 'now') AS INTEGER) * 1000)",
        )
        .bind(*version)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;
    }
    Ok(())
}

fn store_error(e: sqlx::Error) -> AppError {
    AppError::Store(format!("migration failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);

        let latest: i64 = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(latest, MIGRATIONS.len() as i64);
    }
}
