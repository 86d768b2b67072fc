use crate::enqueue_order::EnqueueOrder;
use crate::priority::QueuePriority;
use crate::selector::WorkQueueFronts;
use crate::task::{DelayedTask, Task};
use crate::wake_up::{WakeUp, WakeUpResolution};
use crate::work_queue_sets::WorkQueueType;
use cadence_time::TimeTicks;
use slotmap::new_key_type;
use std::collections::{BinaryHeap, VecDeque};

new_key_type! {
    pub struct QueueId;
}

/// A FIFO of ready tasks.
/// Since LocalScheduler is single-threaded, the owning queue is mutated in place.
pub(crate) struct WorkQueue {
    kind: WorkQueueType,
    tasks: VecDeque<Task>,
}

impl WorkQueue {
    pub fn new(kind: WorkQueueType) -> Self {
        Self {
            kind,
            tasks: VecDeque::new(),
        }
    }

    /// Returns true if the queue was empty, i.e. the front changed.
    pub fn push(&mut self, task: Task) -> bool {
        debug_assert!(
            self.tasks
                .back()
                .is_none_or(|last| last.enqueue_order <= task.enqueue_order),
            "{:?} work queue must stay in enqueue order",
            self.kind
        );
        let was_empty = self.tasks.is_empty();
        self.tasks.push_back(task);
        was_empty
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn front_order(&self) -> Option<EnqueueOrder> {
        self.tasks.front().map(|t| t.enqueue_order)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Host-side storage for one task queue: ready work plus the delayed tasks
/// that have not reached their run time.
pub(crate) struct TaskQueue {
    pub name: String,
    pub priority: QueuePriority,
    pub enabled: bool,
    pub waking: bool,
    pub immediate: WorkQueue,
    pub delayed: WorkQueue,
    delayed_incoming: BinaryHeap<DelayedTask>,
    pending_high_res_tasks: usize,
    next_sequence_num: u64,
}

impl TaskQueue {
    pub fn new(name: String, waking: bool) -> Self {
        Self {
            name,
            priority: QueuePriority::default(),
            enabled: true,
            waking,
            immediate: WorkQueue::new(WorkQueueType::Immediate),
            delayed: WorkQueue::new(WorkQueueType::Delayed),
            delayed_incoming: BinaryHeap::new(),
            pending_high_res_tasks: 0,
            next_sequence_num: 0,
        }
    }

    pub fn work_queue_mut(&mut self, kind: WorkQueueType) -> &mut WorkQueue {
        match kind {
            WorkQueueType::Immediate => &mut self.immediate,
            WorkQueueType::Delayed => &mut self.delayed,
        }
    }

    pub fn fronts(&self) -> WorkQueueFronts {
        WorkQueueFronts {
            immediate: self.immediate.front_order(),
            delayed: self.delayed.front_order(),
        }
    }

    pub fn next_sequence_num(&mut self) -> u64 {
        let seq = self.next_sequence_num;
        self.next_sequence_num += 1;
        seq
    }

    pub fn push_delayed(&mut self, task: DelayedTask) {
        if task.high_resolution {
            self.pending_high_res_tasks += 1;
        }
        self.delayed_incoming.push(task);
    }

    /// The wake-up this queue wants, if it is enabled and has delayed work.
    pub fn next_wake_up(&self) -> Option<WakeUp> {
        if !self.enabled {
            return None;
        }
        let top = self.delayed_incoming.peek()?;
        let resolution = if self.pending_high_res_tasks > 0 {
            WakeUpResolution::High
        } else {
            WakeUpResolution::Low
        };
        Some(WakeUp {
            time: top.delayed_run_time,
            leeway: top.leeway,
            resolution,
            delay_policy: top.delay_policy,
        })
    }

    /// Moves delayed tasks due at `now` onto the delayed work queue, all
    /// stamped with `order`. Canceled tasks are handed to `canceled` so the
    /// caller decides when their captures are dropped.
    /// Returns true if the delayed work queue gained a front task.
    pub fn move_ready_delayed_tasks(
        &mut self,
        now: TimeTicks,
        order: EnqueueOrder,
        canceled: &mut Vec<DelayedTask>,
    ) -> bool {
        let was_empty = self.delayed.is_empty();
        while self
            .delayed_incoming
            .peek()
            .is_some_and(|t| t.earliest_run_time() <= now)
        {
            let Some(task) = self.pop_delayed() else {
                break;
            };
            if task.is_canceled() {
                canceled.push(task);
                continue;
            }
            self.delayed.push(task.into_task(order));
        }
        was_empty && !self.delayed.is_empty()
    }

    pub fn remove_all_canceled_delayed_tasks_from_front(
        &mut self,
        canceled: &mut Vec<DelayedTask>,
    ) -> bool {
        let before = canceled.len();
        while self.delayed_incoming.peek().is_some_and(DelayedTask::is_canceled) {
            canceled.extend(self.pop_delayed());
        }
        canceled.len() != before
    }

    pub fn pending_task_count(&self) -> usize {
        self.immediate.len() + self.delayed.len() + self.delayed_incoming.len()
    }

    /// True if a delayed task that will actually run is due at `now`.
    pub fn has_ready_delayed_task(&self, now: TimeTicks) -> bool {
        self.delayed_incoming
            .iter()
            .any(|t| t.earliest_run_time() <= now && !t.is_canceled())
    }

    fn pop_delayed(&mut self) -> Option<DelayedTask> {
        let task = self.delayed_incoming.pop()?;
        if task.high_resolution {
            self.pending_high_res_tasks -= 1;
        }
        Some(task)
    }
}
