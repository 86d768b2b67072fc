use crate::enqueue_order::EnqueueOrder;
use crate::wake_up::DelayPolicy;
use cadence_time::TimeTicks;
use std::cell::Cell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

pub type TaskFn = Box<dyn FnOnce()>;

/// Cancels a posted delayed task.
///
/// Canceling is lazy: the task stays queued until it reaches the front of its
/// queue or a sweep trims it, but it will never run.
#[derive(Clone, Default)]
pub struct TaskHandle {
    canceled: Rc<Cell<bool>>,
}

impl TaskHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.set(true);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.get()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

/// A task that is ready to run.
pub(crate) struct Task {
    pub enqueue_order: EnqueueOrder,
    callback: TaskFn,
    handle: Option<TaskHandle>,
}

impl Task {
    pub fn new(enqueue_order: EnqueueOrder, callback: TaskFn, handle: Option<TaskHandle>) -> Self {
        Self {
            enqueue_order,
            callback,
            handle,
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.handle.as_ref().is_some_and(TaskHandle::is_canceled)
    }

    pub fn run(self) {
        (self.callback)();
    }
}

/// A task waiting for its run time.
pub(crate) struct DelayedTask {
    pub delayed_run_time: TimeTicks,
    pub leeway: Duration,
    pub delay_policy: DelayPolicy,
    pub high_resolution: bool,
    // Tie-break for equal run times: post order.
    pub sequence_num: u64,
    pub callback: TaskFn,
    pub handle: TaskHandle,
}

impl DelayedTask {
    pub fn earliest_run_time(&self) -> TimeTicks {
        match self.delay_policy {
            DelayPolicy::FlexiblePreferEarly => self.delayed_run_time - self.leeway,
            DelayPolicy::FlexibleNoSooner | DelayPolicy::Precise => self.delayed_run_time,
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.handle.is_canceled()
    }

    pub fn into_task(self, enqueue_order: EnqueueOrder) -> Task {
        Task::new(enqueue_order, self.callback, Some(self.handle))
    }
}

// `BinaryHeap` is a max-heap, so the ordering is reversed: the task that may
// run first compares greatest.
impl Ord for DelayedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .earliest_run_time()
            .cmp(&self.earliest_run_time())
            .then_with(|| other.sequence_num.cmp(&self.sequence_num))
    }
}

impl PartialOrd for DelayedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DelayedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DelayedTask {}
