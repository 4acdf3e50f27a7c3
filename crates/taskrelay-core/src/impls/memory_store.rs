//! In-memory status store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{AttemptKey, TaskRecord, TaskStatus, WorkerId};
use crate::observability::TaskCounts;
use crate::ports::{Clock, StatusStore, StoreError, SystemClock};

/// In-memory status store, keyed by `(task_id, attempt)`.
///
/// The clock is a type parameter so tests can pin timestamps with
/// [`crate::ports::FixedClock`].
pub struct InMemoryStatusStore<C: Clock = SystemClock> {
    rows: Mutex<HashMap<AttemptKey, TaskRecord>>,
    clock: C,
}

impl InMemoryStatusStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryStatusStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryStatusStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// All attempt rows for one logical task, in attempt order.
    pub async fn attempts_for(&self, task_id: &str) -> Vec<TaskRecord> {
        let rows = self.rows.lock().await;
        let mut attempts: Vec<TaskRecord> = rows
            .values()
            .filter(|record| record.task_id == task_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|record| record.attempt);
        attempts
    }
}

/// Row that exists only to be overwritten by the upsert that created it.
fn bare_row(key: &AttemptKey) -> TaskRecord {
    TaskRecord {
        task_id: key.task_id.clone(),
        attempt: key.attempt,
        status: TaskStatus::Processing,
        worker_id: None,
        started_at: None,
        completed_at: None,
        result: None,
        error_message: None,
    }
}

#[async_trait]
impl<C: Clock + 'static> StatusStore for InMemoryStatusStore<C> {
    async fn mark_processing(
        &self,
        key: &AttemptKey,
        worker_id: &WorkerId,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        rows.entry(key.clone())
            .and_modify(|row| row.mark_processing(worker_id.clone(), now))
            .or_insert_with(|| TaskRecord::processing(key, worker_id.clone(), now));
        Ok(())
    }

    async fn mark_completed(
        &self,
        key: &AttemptKey,
        result: serde_json::Value,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        rows.entry(key.clone())
            .or_insert_with(|| bare_row(key))
            .mark_completed(result, now);
        Ok(())
    }

    async fn mark_failed(&self, key: &AttemptKey, error_message: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        rows.entry(key.clone())
            .or_insert_with(|| bare_row(key))
            .mark_failed(error_message, now);
        Ok(())
    }

    async fn get(&self, key: &AttemptKey) -> Result<Option<TaskRecord>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.get(key).cloned())
    }

    async fn counts(&self) -> Result<TaskCounts, StoreError> {
        let rows = self.rows.lock().await;
        let mut counts = TaskCounts::default();
        for record in rows.values() {
            match record.status {
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn close(&self) {}
}
