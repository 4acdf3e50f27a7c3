//! Domain model (envelope, delivery, records, identity, errors).

pub mod delivery;
pub mod envelope;
pub mod errors;
pub mod record;
pub mod worker_id;

pub use self::delivery::{Delivery, MessageId, ReceiptHandle};
pub use self::envelope::{TaskEnvelope, TaskType};
pub use self::errors::TaskFailure;
pub use self::record::{AttemptKey, TaskRecord, TaskStatus};
pub use self::worker_id::WorkerId;
