//! Status views for operational visibility.

use serde::{Deserialize, Serialize};

/// Attempt-row totals by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn total(&self) -> usize {
        self.processing + self.completed + self.failed
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
