//! Status-store port: the persisted record of every attempt.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AttemptKey, TaskRecord, WorkerId};
use crate::observability::TaskCounts;

/// Store-side failure. Infrastructure, not a task failure: the loop logs
/// it, backs off, and leaves the message un-deleted so the queue redelivers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("status store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(source))
    }
}

/// Persistent record of attempt state, keyed by `(task_id, attempt)`.
///
/// Design intent:
/// - Each `mark_*` call is an independent atomic upsert; there is no
///   transaction spanning store and queue. A crash between
///   `mark_completed` and the queue delete redelivers the message, and
///   handlers must tolerate re-execution.
/// - `mark_processing` is an idempotent overwrite, safe on re-claim.
/// - `mark_completed` is last-write-wins, including over an earlier
///   `failed` row for the same key.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Upsert: status=processing, worker_id, started_at=now.
    async fn mark_processing(
        &self,
        key: &AttemptKey,
        worker_id: &WorkerId,
    ) -> Result<(), StoreError>;

    /// Upsert: status=completed, result, completed_at=now.
    async fn mark_completed(
        &self,
        key: &AttemptKey,
        result: serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Upsert: status=failed, error_message, completed_at=now.
    async fn mark_failed(&self, key: &AttemptKey, error_message: &str) -> Result<(), StoreError>;

    /// Read one attempt row.
    async fn get(&self, key: &AttemptKey) -> Result<Option<TaskRecord>, StoreError>;

    /// Totals by status, for operational visibility.
    async fn counts(&self) -> Result<TaskCounts, StoreError>;

    /// Release the backing connection. Called once at shutdown.
    async fn close(&self);
}
