//! PostgreSQL implementation of the taskrelay status store.
//!
//! Attempt rows live in one `tasks` table keyed by `(task_id, attempt)`.
//! Every write is a single upsert, so the port's overwrite semantics hold
//! without any explicit locking: concurrent workers re-claiming the same
//! attempt simply last-write-win, which is the contract.

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};

use taskrelay_core::domain::{AttemptKey, TaskRecord, TaskStatus, WorkerId};
use taskrelay_core::observability::TaskCounts;
use taskrelay_core::ports::{StatusStore, StoreError};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT NOT NULL,
    attempt INTEGER NOT NULL,
    status TEXT NOT NULL,
    worker_id TEXT,
    started_at TIMESTAMPTZ,
    completed_at TIMESTAMPTZ,
    result JSONB,
    error_message TEXT,
    PRIMARY KEY (task_id, attempt)
)";

/// Status store backed by a PostgreSQL connection pool.
///
/// The pool is opened once per worker process and reused for all status
/// writes; the worker loop is sequential, so pool contention is not a
/// concern in a single process.
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    /// Open a pool against the given connection string.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (shared with other components, tests).
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `tasks` table if it does not exist.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn map_row(row: &PgRow) -> Result<TaskRecord, sqlx::Error> {
    let status_text: String = row.try_get("status")?;
    let status = TaskStatus::from_str(&status_text)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown status {status_text:?}").into()))?;

    Ok(TaskRecord {
        task_id: row.try_get("task_id")?,
        attempt: row.try_get::<i32, _>("attempt")? as u32,
        status,
        worker_id: row
            .try_get::<Option<String>, _>("worker_id")?
            .map(WorkerId::from),
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        result: row.try_get("result")?,
        error_message: row.try_get("error_message")?,
    })
}

#[async_trait]
impl StatusStore for PgStatusStore {
    async fn mark_processing(
        &self,
        key: &AttemptKey,
        worker_id: &WorkerId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tasks (task_id, attempt, status, worker_id, started_at)
             VALUES ($1, $2, 'processing', $3, CURRENT_TIMESTAMP)
             ON CONFLICT (task_id, attempt) DO UPDATE
             SET status = EXCLUDED.status,
                 worker_id = EXCLUDED.worker_id,
                 started_at = EXCLUDED.started_at",
        )
        .bind(&key.task_id)
        .bind(key.attempt as i32)
        .bind(worker_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn mark_completed(
        &self,
        key: &AttemptKey,
        result: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tasks (task_id, attempt, status, result, completed_at)
             VALUES ($1, $2, 'completed', $3, CURRENT_TIMESTAMP)
             ON CONFLICT (task_id, attempt) DO UPDATE
             SET status = EXCLUDED.status,
                 result = EXCLUDED.result,
                 completed_at = EXCLUDED.completed_at",
        )
        .bind(&key.task_id)
        .bind(key.attempt as i32)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn mark_failed(&self, key: &AttemptKey, error_message: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tasks (task_id, attempt, status, error_message, completed_at)
             VALUES ($1, $2, 'failed', $3, CURRENT_TIMESTAMP)
             ON CONFLICT (task_id, attempt) DO UPDATE
             SET status = EXCLUDED.status,
                 error_message = EXCLUDED.error_message,
                 completed_at = EXCLUDED.completed_at",
        )
        .bind(&key.task_id)
        .bind(key.attempt as i32)
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn get(&self, key: &AttemptKey) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT task_id, attempt, status, worker_id, started_at, completed_at,
                    result, error_message
             FROM tasks WHERE task_id = $1 AND attempt = $2",
        )
        .bind(&key.task_id)
        .bind(key.attempt as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.as_ref()
            .map(map_row)
            .transpose()
            .map_err(StoreError::backend)
    }

    async fn counts(&self) -> Result<TaskCounts, StoreError> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
             FROM tasks",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let count = |name: &str| -> Result<usize, StoreError> {
            let n: i64 = row.try_get(name).map_err(StoreError::backend)?;
            Ok(n as usize)
        };
        Ok(TaskCounts {
            processing: count("processing")?,
            completed: count("completed")?,
            failed: count("failed")?,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
