//! Amazon SQS implementation of the taskrelay queue client.
//!
//! SQS already provides exactly the delivery model the worker is written
//! against: per-receive receipt handles, visibility timeouts, redelivery of
//! un-deleted messages, and `ApproximateReceiveCount` as the attempt
//! number. This crate is a thin mapping onto that model.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::types::MessageSystemAttributeName;

use taskrelay_core::domain::{Delivery, MessageId, ReceiptHandle, TaskEnvelope};
use taskrelay_core::ports::{QueueClient, QueueError};

/// Hard SQS limits per receive call.
const MAX_BATCH: i32 = 10;
const MAX_WAIT_SECONDS: i32 = 20;

/// Queue client bound to one SQS queue URL.
///
/// Credentials resolve through the SDK's default provider chain
/// (environment, profile, instance role).
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    pub async fn connect(region: impl Into<String>, queue_url: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;
        Self {
            client: aws_sdk_sqs::Client::new(&config),
            queue_url: queue_url.into(),
        }
    }

    /// Wrap a preconfigured client (tests against localstack, shared SDK
    /// config).
    pub fn with_client(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Producer side: enqueue an envelope, returning the queue-assigned
    /// message id.
    pub async fn send(&self, envelope: &TaskEnvelope) -> Result<MessageId, QueueError> {
        let body = envelope.to_body().map_err(QueueError::backend)?;
        let out = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(QueueError::backend)?;
        Ok(MessageId::new(out.message_id().unwrap_or_default()))
    }
}

#[async_trait]
impl QueueClient for SqsQueue {
    async fn receive(
        &self,
        max_messages: u16,
        wait: Duration,
    ) -> Result<Vec<Delivery>, QueueError> {
        let out = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages((max_messages as i32).clamp(1, MAX_BATCH))
            .wait_time_seconds((wait.as_secs() as i32).min(MAX_WAIT_SECONDS))
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .send()
            .await
            .map_err(QueueError::backend)?;

        let mut deliveries = Vec::new();
        for message in out.messages.unwrap_or_default() {
            let (Some(message_id), Some(receipt), Some(body)) = (
                message.message_id.as_deref(),
                message.receipt_handle.as_deref(),
                message.body.as_deref(),
            ) else {
                tracing::warn!("skipping SQS message without id, receipt, or body");
                continue;
            };
            let receive_count = message
                .attributes()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .and_then(|count| count.parse().ok())
                .unwrap_or(1);

            deliveries.push(Delivery {
                message_id: MessageId::new(message_id),
                receipt: ReceiptHandle::new(receipt),
                body: body.to_string(),
                receive_count,
            });
        }
        Ok(deliveries)
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt.as_str())
            .send()
            .await
            .map_err(QueueError::backend)?;
        Ok(())
    }

    async fn extend_visibility(
        &self,
        receipt: &ReceiptHandle,
        duration: Duration,
    ) -> Result<(), QueueError> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt.as_str())
            .visibility_timeout(duration.as_secs() as i32)
            .send()
            .await
            .map_err(QueueError::backend)?;
        Ok(())
    }
}
