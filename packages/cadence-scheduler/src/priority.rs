use crate::error::SchedulerError;
use std::fmt;

/// Number of distinct [`QueuePriority`] levels.
pub const PRIORITY_COUNT: usize = 6;

/// Urgency class of a task queue, ordered from "run first" to "run last".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum QueuePriority {
    /// Preempts everything else whenever it has ready work.
    Control = 0,
    Highest = 1,
    High = 2,
    #[default]
    Normal = 3,
    Low = 4,
    /// Only runs when no other priority has ready work.
    BestEffort = 5,
}

impl QueuePriority {
    pub const ALL: [QueuePriority; PRIORITY_COUNT] = [
        QueuePriority::Control,
        QueuePriority::Highest,
        QueuePriority::High,
        QueuePriority::Normal,
        QueuePriority::Low,
        QueuePriority::BestEffort,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            QueuePriority::Control => "control",
            QueuePriority::Highest => "highest",
            QueuePriority::High => "high",
            QueuePriority::Normal => "normal",
            QueuePriority::Low => "low",
            QueuePriority::BestEffort => "best_effort",
        }
    }
}

impl TryFrom<u8> for QueuePriority {
    type Error = SchedulerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(usize::from(value)).ok_or(SchedulerError::InvalidPriority(value))
    }
}

impl From<QueuePriority> for u8 {
    fn from(priority: QueuePriority) -> u8 {
        priority as u8
    }
}

impl fmt::Display for QueuePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
