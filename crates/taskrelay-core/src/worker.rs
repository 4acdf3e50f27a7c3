//! The worker loop: receive, transition, dispatch, finalize.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::domain::{AttemptKey, Delivery, TaskEnvelope, TaskFailure, WorkerId};
use crate::ports::{QueueClient, QueueError, StatusStore, StoreError};
use crate::registry::{HandlerRegistry, TaskHandler};

/// Tunables for one worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Batch size per receive call.
    pub max_messages: u16,

    /// Long-poll duration per receive call.
    pub wait_time: Duration,

    /// Queue visibility timeout; also the heartbeat extension amount.
    pub visibility_timeout: Duration,

    /// Redelivery budget: a delivery that fails at or past this receive
    /// count is recorded and then dropped instead of retried forever.
    pub max_receive_count: u32,

    /// Pause after an infrastructure error before the next iteration.
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_messages: 1,
            wait_time: Duration::from_secs(20),
            visibility_timeout: Duration::from_secs(30),
            max_receive_count: 5,
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Infrastructure failure while processing one delivery.
///
/// Distinct from [`TaskFailure`]: these mean the queue or the store is
/// unhealthy, so nothing is recorded and the message is left un-deleted
/// for the queue to redeliver.
#[derive(Debug, Error)]
enum InfraError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Sequential worker: one delivery is fully processed before the next
/// receive call is issued. Horizontal scaling is more processes, each with
/// its own [`WorkerId`], competing on the same queue.
pub struct Worker {
    queue: Arc<dyn QueueClient>,
    store: Arc<dyn StatusStore>,
    registry: Arc<HandlerRegistry>,
    worker_id: WorkerId,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn QueueClient>,
        store: Arc<dyn StatusStore>,
        registry: Arc<HandlerRegistry>,
        worker_id: WorkerId,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            store,
            registry,
            worker_id,
            config,
        }
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Poll until the shutdown flag flips.
    ///
    /// Shutdown is cooperative: the flag stops new receive calls, and the
    /// delivery currently in flight is finished before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(worker_id = %self.worker_id, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            // receive blocks for up to wait_time, so race it with shutdown
            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break; // sender dropped, nothing can un-stop us
                    }
                    continue;
                }
                received = self.queue.receive(self.config.max_messages, self.config.wait_time) => received,
            };

            match received {
                // an empty batch is a long-poll timeout: re-poll immediately
                Ok(deliveries) => {
                    for delivery in deliveries {
                        if let Err(error) = self.process(&delivery).await {
                            tracing::error!(
                                error = %error,
                                message_id = %delivery.message_id,
                                "infrastructure error, leaving message for redelivery"
                            );
                            tokio::time::sleep(self.config.error_backoff).await;
                        }
                    }
                }
                Err(error) => {
                    tracing::error!(error = %error, "receive failed");
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }

        tracing::info!(worker_id = %self.worker_id, "worker stopped");
    }

    /// Drive one delivery through the state machine:
    /// parse -> mark_processing -> dispatch -> mark_completed + delete,
    /// or -> mark_failed (+ delete once the redelivery budget is spent).
    ///
    /// Task failures never escape; only queue/store trouble is returned.
    async fn process(&self, delivery: &Delivery) -> Result<(), InfraError> {
        let envelope = match TaskEnvelope::parse(&delivery.body) {
            Ok(envelope) => envelope,
            Err(source) => {
                // No task identity, so there is no row to write. The raw
                // message id is the only operational handle.
                let failure = TaskFailure::Malformed(source);
                tracing::warn!(
                    message_id = %delivery.message_id,
                    receive_count = delivery.receive_count,
                    error = %failure,
                    "received malformed envelope"
                );
                self.retire_if_exhausted(delivery).await?;
                return Ok(());
            }
        };

        let key = AttemptKey::new(envelope.task_id(), delivery.receive_count);
        self.store.mark_processing(&key, &self.worker_id).await?;
        tracing::info!(
            task_id = %key.task_id,
            attempt = key.attempt,
            task_type = %envelope.task_type(),
            "processing task"
        );

        let outcome = match self.registry.get(envelope.task_type()) {
            None => Err(TaskFailure::UnknownType(envelope.task_type().clone())),
            Some(handler) => self
                .run_handler(handler, delivery, envelope.payload())
                .await
                .map_err(TaskFailure::Handler),
        };

        match outcome {
            Ok(result) => {
                // record first, delete second: a crash in between means
                // redelivery, never a lost outcome
                self.store.mark_completed(&key, result).await?;
                self.queue.delete(&delivery.receipt).await?;
                tracing::info!(task_id = %key.task_id, attempt = key.attempt, "task completed");
            }
            Err(failure) => {
                self.store.mark_failed(&key, &failure.to_string()).await?;
                tracing::warn!(
                    task_id = %key.task_id,
                    attempt = key.attempt,
                    error = %failure,
                    "task failed"
                );
                self.retire_if_exhausted(delivery).await?;
            }
        }

        Ok(())
    }

    /// Failed deliveries stay queued so the queue's visibility timeout
    /// drives redelivery, until the receive count reaches the budget; then
    /// the message is dropped with its failure on record.
    async fn retire_if_exhausted(&self, delivery: &Delivery) -> Result<(), QueueError> {
        if delivery.receive_count >= self.config.max_receive_count {
            tracing::warn!(
                message_id = %delivery.message_id,
                receive_count = delivery.receive_count,
                "redelivery budget exhausted, dropping message"
            );
            self.queue.delete(&delivery.receipt).await?;
        }
        Ok(())
    }

    /// Invoke the handler, extending message visibility while it runs.
    ///
    /// No per-task timeout: a handler that never returns stalls the worker.
    /// The heartbeat keeps the message leased so a slow handler does not
    /// race a redelivered copy of itself. The handler runs in its own task
    /// so a panic surfaces as a failure string instead of tearing the loop
    /// down.
    async fn run_handler(
        &self,
        handler: &Arc<dyn TaskHandler>,
        delivery: &Delivery,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        let heartbeat_every = (self.config.visibility_timeout / 3).max(Duration::from_millis(10));
        let mut heartbeat = tokio::time::interval(heartbeat_every);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await; // the first tick completes immediately

        let handler = Arc::clone(handler);
        let payload = payload.clone();
        let mut invocation = tokio::spawn(async move { handler.handle(&payload).await });

        loop {
            tokio::select! {
                joined = &mut invocation => {
                    return match joined {
                        Ok(outcome) => outcome,
                        Err(join_error) => Err(format!("handler panicked: {join_error}")),
                    };
                }
                _ = heartbeat.tick() => {
                    if let Err(error) = self
                        .queue
                        .extend_visibility(&delivery.receipt, self.config.visibility_timeout)
                        .await
                    {
                        tracing::warn!(
                            error = %error,
                            message_id = %delivery.message_id,
                            "failed to extend message visibility"
                        );
                    }
                }
            }
        }
    }
}
