//! Worker identity: attributes a processing row to one worker process.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Process-scoped worker identifier, e.g. `worker-4242-01JD3...`.
///
/// Stable for the process lifetime; not persisted beyond the attempt rows
/// it claims. The pid makes it greppable on the host, the ULID makes it
/// unique across hosts without coordination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn generate() -> Self {
        let ulid = Ulid::from_parts(Utc::now().timestamp_millis() as u64, rand::random());
        Self(format!("worker-{}-{}", std::process::id(), ulid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for WorkerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = WorkerId::generate();
        let b = WorkerId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn generated_ids_carry_the_pid() {
        let id = WorkerId::generate();
        assert!(id.as_str().starts_with(&format!("worker-{}-", std::process::id())));
    }
}
