use crate::queue::QueueId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("task queue {0:?} is not registered with this scheduler")]
    UnknownQueue(QueueId),
    #[error("{0} is not a valid queue priority")]
    InvalidPriority(u8),
    #[error("the scheduler behind this task runner has been dropped")]
    SchedulerGone,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
