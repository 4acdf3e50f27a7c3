//! In-memory queue with at-least-once delivery semantics.
//!
//! Faithful to the durable-queue contract the worker is written against:
//! received messages become invisible for a visibility timeout, an
//! un-deleted message is redelivered with a fresh receipt and an
//! incremented receive count, and `delete` is idempotent.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::{Delivery, MessageId, ReceiptHandle};
use crate::ports::{QueueClient, QueueError};

const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Visibility deadline entry for the priority queue.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
/// Entries are lazy: `extend_visibility` pushes a new entry instead of
/// rewriting the old one, so each entry is checked against the
/// authoritative in-flight table before it triggers redelivery.
#[derive(Debug, Clone, PartialEq, Eq)]
struct VisibilityEntry {
    deadline: Instant,
    message_id: MessageId,
    receipt: ReceiptHandle,
}

impl PartialOrd for VisibilityEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VisibilityEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

/// A message held by the queue, visible or not.
#[derive(Debug)]
struct StoredMessage {
    body: String,
    receive_count: u32,
}

/// The receipt and deadline of the current outstanding delivery.
#[derive(Debug)]
struct OutstandingDelivery {
    receipt: ReceiptHandle,
    deadline: Instant,
}

struct InMemoryQueueState {
    /// All messages (single source of truth).
    messages: HashMap<MessageId, StoredMessage>,

    /// Visible messages, delivery order.
    ready: VecDeque<MessageId>,

    /// Messages received and not yet deleted or expired.
    in_flight: HashMap<MessageId, OutstandingDelivery>,

    /// Visibility deadlines (lazy, see VisibilityEntry).
    deadlines: BinaryHeap<VisibilityEntry>,

    next_message_seq: u64,
    next_receipt_seq: u64,
}

impl InMemoryQueueState {
    fn new() -> Self {
        Self {
            messages: HashMap::new(),
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            deadlines: BinaryHeap::new(),
            next_message_seq: 1,
            next_receipt_seq: 1,
        }
    }

    /// Move expired in-flight messages back to ready.
    fn promote_expired(&mut self, now: Instant) {
        while let Some(entry) = self.deadlines.peek() {
            if entry.deadline > now {
                break; // heap is sorted, nothing later can be due
            }
            let entry = self.deadlines.pop().unwrap();

            // Stale entries (deleted message, superseded receipt, extended
            // deadline) are dropped without effect.
            let current = match self.in_flight.get(&entry.message_id) {
                Some(outstanding)
                    if outstanding.receipt == entry.receipt && outstanding.deadline <= now =>
                {
                    true
                }
                _ => false,
            };
            if current && self.messages.contains_key(&entry.message_id) {
                self.in_flight.remove(&entry.message_id);
                self.ready.push_back(entry.message_id);
            }
        }
    }

    /// Hand out the next visible message, if any.
    fn deliver_next(&mut self, now: Instant, visibility: Duration) -> Option<Delivery> {
        loop {
            let message_id = self.ready.pop_front()?;
            let Some(stored) = self.messages.get_mut(&message_id) else {
                continue; // deleted while queued
            };
            stored.receive_count += 1;
            let receive_count = stored.receive_count;
            let body = stored.body.clone();

            let receipt = ReceiptHandle::new(format!("rcpt-{}", self.next_receipt_seq));
            self.next_receipt_seq += 1;
            let deadline = now + visibility;

            self.in_flight.insert(
                message_id.clone(),
                OutstandingDelivery {
                    receipt: receipt.clone(),
                    deadline,
                },
            );
            self.deadlines.push(VisibilityEntry {
                deadline,
                message_id: message_id.clone(),
                receipt: receipt.clone(),
            });

            return Some(Delivery {
                message_id,
                receipt,
                body,
                receive_count,
            });
        }
    }

    /// Find the in-flight message a receipt currently belongs to.
    fn holder_of(&self, receipt: &ReceiptHandle) -> Option<MessageId> {
        self.in_flight
            .iter()
            .find(|(_, outstanding)| &outstanding.receipt == receipt)
            .map(|(message_id, _)| message_id.clone())
    }
}

/// In-memory queue implementation.
pub struct InMemoryQueue {
    state: Mutex<InMemoryQueueState>,
    notify: Notify,
    visibility_timeout: Duration,
}

impl InMemoryQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(InMemoryQueueState::new()),
            notify: Notify::new(),
            visibility_timeout,
        }
    }

    /// Producer side: enqueue a raw message body.
    pub async fn send(&self, body: impl Into<String>) -> MessageId {
        let message_id = {
            let mut state = self.state.lock().await;
            let message_id = MessageId::new(format!("msg-{}", state.next_message_seq));
            state.next_message_seq += 1;
            state.messages.insert(
                message_id.clone(),
                StoredMessage {
                    body: body.into(),
                    receive_count: 0,
                },
            );
            state.ready.push_back(message_id.clone());
            message_id
        };
        self.notify.notify_one();
        message_id
    }

    /// Messages still held by the queue (visible or in flight).
    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Messages currently deliverable.
    pub async fn visible_len(&self) -> usize {
        let mut state = self.state.lock().await;
        state.promote_expired(Instant::now());
        state.ready.len()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_TIMEOUT)
    }
}

#[async_trait]
impl QueueClient for InMemoryQueue {
    async fn receive(
        &self,
        max_messages: u16,
        wait: Duration,
    ) -> Result<Vec<Delivery>, QueueError> {
        let wait_deadline = Instant::now() + wait;

        loop {
            let (batch, next_wake) = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.promote_expired(now);

                let mut batch = Vec::new();
                while batch.len() < max_messages as usize {
                    match state.deliver_next(now, self.visibility_timeout) {
                        Some(delivery) => batch.push(delivery),
                        None => break,
                    }
                }
                (batch, state.deadlines.peek().map(|entry| entry.deadline))
            };

            if !batch.is_empty() {
                return Ok(batch);
            }
            let now = Instant::now();
            if now >= wait_deadline {
                return Ok(Vec::new()); // long-poll timeout, not an error
            }

            // Wait for a send OR the next visibility expiry, bounded by the
            // long-poll deadline.
            let wake = next_wake.map_or(wait_deadline, |w| w.min(wait_deadline));
            tokio::select! {
                _ = self.notify.notified() => {},
                _ = tokio::time::sleep_until(wake) => {},
            }
        }
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(message_id) = state.holder_of(receipt) {
            state.in_flight.remove(&message_id);
            state.messages.remove(&message_id);
        }
        // Unknown or superseded receipt: already acknowledged, idempotent.
        Ok(())
    }

    async fn extend_visibility(
        &self,
        receipt: &ReceiptHandle,
        duration: Duration,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(message_id) = state.holder_of(receipt) {
            let deadline = Instant::now() + duration;
            if let Some(outstanding) = state.in_flight.get_mut(&message_id) {
                outstanding.deadline = deadline;
            }
            state.deadlines.push(VisibilityEntry {
                deadline,
                message_id,
                receipt: receipt.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_on_empty_queue_times_out_with_empty_batch() {
        let queue = InMemoryQueue::default();
        let batch = queue
            .receive(1, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn sent_message_is_received_with_count_one() {
        let queue = InMemoryQueue::default();
        queue.send(r#"{"task_id":"t1","type":"noop"}"#).await;

        let batch = queue.receive(1, Duration::from_millis(100)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].receive_count, 1);
        assert_eq!(batch[0].body, r#"{"task_id":"t1","type":"noop"}"#);
    }

    #[tokio::test]
    async fn received_message_is_invisible_until_the_timeout() {
        let queue = InMemoryQueue::new(Duration::from_secs(30));
        queue.send("body").await;

        let first = queue.receive(1, Duration::from_millis(100)).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = queue.receive(1, Duration::from_millis(20)).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn undeleted_message_is_redelivered_with_a_fresh_receipt() {
        let queue = InMemoryQueue::new(Duration::from_secs(30));
        queue.send("body").await;

        let first = queue.receive(1, Duration::from_secs(1)).await.unwrap();
        let redelivered = queue.receive(1, Duration::from_secs(60)).await.unwrap();

        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].message_id, first[0].message_id);
        assert_ne!(redelivered[0].receipt, first[0].receipt);
        assert_eq!(redelivered[0].receive_count, 2);
    }

    #[tokio::test]
    async fn delete_removes_the_message_and_is_idempotent() {
        let queue = InMemoryQueue::default();
        queue.send("body").await;

        let batch = queue.receive(1, Duration::from_millis(100)).await.unwrap();
        queue.delete(&batch[0].receipt).await.unwrap();
        assert!(queue.is_empty().await);

        // second delete with the same receipt is a no-op
        queue.delete(&batch[0].receipt).await.unwrap();
        assert!(queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_receipt_cannot_delete_a_redelivered_message() {
        let queue = InMemoryQueue::new(Duration::from_secs(30));
        queue.send("body").await;

        let first = queue.receive(1, Duration::from_secs(1)).await.unwrap();
        let second = queue.receive(1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(second[0].receive_count, 2);

        queue.delete(&first[0].receipt).await.unwrap();
        assert_eq!(queue.len().await, 1);

        queue.delete(&second[0].receipt).await.unwrap();
        assert!(queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn extend_visibility_defers_redelivery() {
        let queue = InMemoryQueue::new(Duration::from_secs(10));
        queue.send("body").await;

        let batch = queue.receive(1, Duration::from_secs(1)).await.unwrap();
        queue
            .extend_visibility(&batch[0].receipt, Duration::from_secs(120))
            .await
            .unwrap();

        // well past the original deadline, still invisible
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(queue.visible_len().await, 0);

        // past the extended deadline, visible again
        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(queue.visible_len().await, 1);
    }

    #[tokio::test]
    async fn batch_receive_respects_max_messages() {
        let queue = InMemoryQueue::default();
        for i in 0..5 {
            queue.send(format!("body-{i}")).await;
        }

        let batch = queue.receive(3, Duration::from_millis(100)).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(queue.visible_len().await, 2);
    }
}
