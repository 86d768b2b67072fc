use crate::priority::{PRIORITY_COUNT, QueuePriority};
use std::time::Duration;

/// Tunables for selection fairness and wake-up precision.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SchedulerSettings {
    /// Extra selection rounds a priority may be passed over, indexed by
    /// [`QueuePriority::index`]. Control and BestEffort entries are ignored.
    pub starvation_tolerance: [i64; PRIORITY_COUNT],
    /// Consecutive delayed-over-immediate picks at one priority before an
    /// immediate task is forced through.
    pub max_delayed_starvation_tasks: usize,
    /// Delayed tasks posted with a shorter delay ask for a high resolution wake-up.
    pub high_resolution_threshold: Duration,
}

impl SchedulerSettings {
    pub fn starvation_tolerance_for(&self, priority: QueuePriority) -> i64 {
        self.starvation_tolerance[priority.index()]
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            starvation_tolerance: [0, 0, 3, 8, 33, 0],
            max_delayed_starvation_tasks: 3,
            high_resolution_threshold: Duration::from_millis(32),
        }
    }
}
