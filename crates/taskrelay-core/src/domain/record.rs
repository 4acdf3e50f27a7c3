//! Attempt records: the persisted lifecycle of one delivery of one task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::WorkerId;

/// Persisted status of one attempt.
///
/// State transitions:
/// - (no row, implicit pending) -> Processing -> Completed
/// - (no row) -> Processing -> Failed
///
/// There is no retrying state: a failed attempt is terminal for that
/// delivery, and any retry is a new attempt row driven by queue redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Claimed by a worker, handler running (or about to).
    Processing,

    /// Handler returned a result; message deleted from the queue.
    Completed,

    /// Parse, lookup, or handler failure recorded for this attempt.
    Failed,
}

impl TaskStatus {
    /// Is this attempt done (no further transitions for this row)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Inverse of [`TaskStatus::as_str`], for store backends that persist
    /// the status as text.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store key: logical task identity plus the attempt number.
///
/// Keying by `(task_id, attempt)` instead of the queue's per-delivery
/// identifier keeps retry history together: each redelivery writes a new
/// attempt row and earlier rows stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptKey {
    pub task_id: String,
    pub attempt: u32,
}

impl AttemptKey {
    pub fn new(task_id: impl Into<String>, attempt: u32) -> Self {
        Self {
            task_id: task_id.into(),
            attempt,
        }
    }
}

impl fmt::Display for AttemptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.task_id, self.attempt)
    }
}

/// One persisted attempt row.
///
/// Design: all state transitions happen through the methods below so store
/// implementations agree on upsert semantics (overwrite, not additive).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub attempt: u32,
    pub status: TaskStatus,
    pub worker_id: Option<WorkerId>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl TaskRecord {
    /// Fresh row for a claimed attempt.
    pub fn processing(key: &AttemptKey, worker_id: WorkerId, now: DateTime<Utc>) -> Self {
        Self {
            task_id: key.task_id.clone(),
            attempt: key.attempt,
            status: TaskStatus::Processing,
            worker_id: Some(worker_id),
            started_at: Some(now),
            completed_at: None,
            result: None,
            error_message: None,
        }
    }

    /// Overwrite into processing (idempotent re-claim of the same attempt).
    pub fn mark_processing(&mut self, worker_id: WorkerId, now: DateTime<Utc>) {
        self.status = TaskStatus::Processing;
        self.worker_id = Some(worker_id);
        self.started_at = Some(now);
    }

    /// Terminal success: last write wins, including over an earlier failure.
    pub fn mark_completed(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(now);
    }

    /// Terminal failure for this attempt.
    pub fn mark_failed(&mut self, error_message: impl Into<String>, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(now);
    }
}
