pub mod enqueue_order;
pub mod error;
pub mod heap;
pub mod priority;
pub mod queue;
pub mod scheduler;
pub mod selector;
pub mod settings;
pub mod small_priority_queue;
pub mod task;
pub mod wake_up;
pub mod wake_up_queue;
pub mod work_queue_sets;

use cadence_time::TimeTicks;
use std::time::Duration;

/// Posts work onto a single-threaded scheduler.
/// Lets code that only produces tasks stay independent of which runtime runs them.
pub trait TaskRunner {
    /// Queue a task to run as soon as the scheduler selects its queue.
    fn post_task(&self, task: Box<dyn FnOnce()>) -> Result<()>;

    /// Queue a task that becomes eligible once `delay` has elapsed.
    fn post_delayed_task(&self, delay: Duration, task: Box<dyn FnOnce()>) -> Result<TaskHandle>;

    /// Get the current time from the scheduler's clock (monotonic).
    fn now(&self) -> TimeTicks;
}

pub use enqueue_order::{EnqueueOrder, EnqueueOrderGenerator};
pub use error::{Result, SchedulerError};
pub use priority::{PRIORITY_COUNT, QueuePriority};
pub use queue::QueueId;
pub use scheduler::{LocalScheduler, QueueTaskRunner};
pub use selector::{SelectTaskOption, SelectorObserver, TaskQueueSelector, WorkQueueFronts};
pub use settings::SchedulerSettings;
pub use task::TaskHandle;
pub use wake_up::{DelayPolicy, WakeUp, WakeUpResolution};
pub use wake_up_queue::{WakeUpHandler, WakeUpHost, WakeUpQueue};
pub use work_queue_sets::{WorkQueueRef, WorkQueueSets, WorkQueueType};
