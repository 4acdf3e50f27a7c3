//! Ports: the abstraction seams for external systems.
//!
//! Each trait hides one dependency (the durable queue, the status store,
//! the wall clock) so the worker loop can be exercised entirely in-memory.

pub mod clock;
pub mod queue;
pub mod store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::queue::{QueueClient, QueueError};
pub use self::store::{StatusStore, StoreError};
