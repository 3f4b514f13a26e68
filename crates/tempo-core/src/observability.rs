use serde::{Deserialize, Serialize};

/// Number of tasks per bucket. Cancelled tasks are filed with completed ones
/// but counted separately here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
}

impl SchedulerCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.cancelled + self.failed
    }
}
