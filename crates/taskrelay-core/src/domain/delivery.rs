//! Delivery: what the queue hands the worker for one receive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue-assigned message identifier.
///
/// Stable for the message's lifetime in the queue; used for operational
/// logging when the body cannot be parsed into an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque receipt token for one delivery.
///
/// Changes on every redelivery; required for delete and visibility
/// extension. Never parsed by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One received message: queue identity plus the raw body.
///
/// `receive_count` is how many times the queue has handed this message to a
/// worker, this delivery included. It doubles as the attempt number for the
/// status store.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message_id: MessageId,
    pub receipt: ReceiptHandle,
    pub body: String,
    pub receive_count: u32,
}
