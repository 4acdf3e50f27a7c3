//! Queue port: receive, acknowledge, and lease-extend deliveries.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Delivery, ReceiptHandle};

/// Queue-side failure. These are infrastructure errors: the loop logs them
/// and backs off; they are never recorded as task failures.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl QueueError {
    pub fn backend(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(source))
    }
}

/// Client contract against the durable queue.
///
/// Design intent:
/// - The queue owns redelivery: a message that is received but never
///   deleted becomes visible again after its visibility timeout.
/// - At-least-once: the same logical task can be delivered more than once,
///   each time with a fresh receipt and an incremented receive count.
/// - The worker owns acknowledgment and must only `delete` after the
///   outcome is durably recorded.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Long-poll for up to `max_messages` deliveries, waiting at most
    /// `wait`. An empty batch on timeout is normal, not an error.
    async fn receive(
        &self,
        max_messages: u16,
        wait: Duration,
    ) -> Result<Vec<Delivery>, QueueError>;

    /// Acknowledge one delivery so the message is never redelivered.
    /// Idempotent: deleting an already-deleted message is not an error.
    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Push the delivery's visibility deadline out by `duration` from now.
    async fn extend_visibility(
        &self,
        receipt: &ReceiptHandle,
        duration: Duration,
    ) -> Result<(), QueueError>;
}
