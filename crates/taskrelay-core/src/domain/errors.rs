//! Message-level failures: everything recorded as a failed attempt.

use thiserror::Error;

use super::TaskType;

/// Why one delivery failed.
///
/// All three variants take the same path through the worker: record the
/// failure on the attempt row and leave the message for queue-driven
/// redelivery (or drop it once the redelivery budget is spent). None of
/// them may escape the loop.
#[derive(Debug, Error)]
pub enum TaskFailure {
    /// Body is not a valid envelope (bad JSON, missing task_id or type).
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// No handler registered for the envelope's type.
    #[error("unknown task type: {0}")]
    UnknownType(TaskType),

    /// The handler returned an error (or panicked).
    #[error("{0}")]
    Handler(String),
}
