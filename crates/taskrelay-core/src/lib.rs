//! taskrelay-core
//!
//! Core building blocks for the taskrelay worker.
//!
//! # Module layout
//! - **domain**: envelope, delivery, attempt records, worker identity, errors
//! - **ports**: abstraction layer (QueueClient, StatusStore, Clock)
//! - **registry**: task_type -> handler dispatch table
//! - **worker**: the poll/dispatch/finalize loop
//! - **impls**: in-memory implementations of the ports (tests, local dev)
//!
//! Backend implementations live in sibling crates: `taskrelay-sqlx`
//! (PostgreSQL status store) and `taskrelay-sqs` (Amazon SQS queue).

pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod registry;
pub mod worker;

pub use domain::{
    AttemptKey, Delivery, MessageId, ReceiptHandle, TaskEnvelope, TaskFailure, TaskRecord,
    TaskStatus, TaskType, WorkerId,
};
pub use ports::{Clock, FixedClock, QueueClient, QueueError, StatusStore, StoreError, SystemClock};
pub use registry::{HandlerRegistry, RegistryError, TaskHandler};
pub use worker::{Worker, WorkerConfig};
