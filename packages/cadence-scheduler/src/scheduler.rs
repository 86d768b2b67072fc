use crate::enqueue_order::{EnqueueOrder, EnqueueOrderGenerator};
use crate::error::{Result, SchedulerError};
use crate::priority::QueuePriority;
use crate::queue::{QueueId, TaskQueue};
use crate::selector::{SelectTaskOption, SelectorObserver, TaskQueueSelector};
use crate::settings::SchedulerSettings;
use crate::task::{DelayedTask, Task, TaskHandle};
use crate::wake_up::{DelayPolicy, WakeUp};
use crate::wake_up_queue::{WakeUpHandler, WakeUpHost, WakeUpQueue};
use crate::work_queue_sets::{WorkQueueRef, WorkQueueType};
use crate::TaskRunner;
use cadence_time::{Clock, LazyNow, TimeTicks};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Single-threaded runtime that owns a set of task queues and runs their
/// tasks one at a time in selector order.
///
/// All methods take `&self`, so a running task can post more work through an
/// `Rc<LocalScheduler>` or a [`QueueTaskRunner`].
pub struct LocalScheduler {
    clock: Rc<dyn Clock>,
    inner: RefCell<SchedulerInner>,
    work_requested: Rc<Cell<bool>>,
    scheduled_wake_up: Rc<Cell<Option<WakeUp>>>,
}

struct SchedulerInner {
    settings: SchedulerSettings,
    queues: slotmap::SlotMap<QueueId, TaskQueue>,
    names: FxHashMap<String, QueueId>,
    selector: TaskQueueSelector,
    wake_up_queue: WakeUpQueue,
    non_waking_wake_up_queue: WakeUpQueue,
    enqueue_order_generator: EnqueueOrderGenerator,
    tasks_run: u64,
}

/// Raises the "work requested" flag when a queue is re-enabled.
struct WorkRequest(Rc<Cell<bool>>);

impl SelectorObserver for WorkRequest {
    fn on_task_queue_enabled(&mut self, _queue: QueueId) {
        self.0.set(true);
    }
}

/// Stands in for the host timer: remembers the last wake-up it was armed with.
struct TimerSlot(Rc<Cell<Option<WakeUp>>>);

impl WakeUpHandler for TimerSlot {
    fn on_next_wake_up_changed(&mut self, now: TimeTicks, wake_up: Option<WakeUp>) {
        tracing::debug!(%now, ?wake_up, "re-arming wake-up timer");
        self.0.set(wake_up);
    }
}

/// The queues as seen by a wake-up queue.
///
/// Canceled delayed tasks removed along the way are collected in `canceled`
/// and must be dropped only once the scheduler is no longer borrowed.
struct QueueHost<'a> {
    queues: &'a mut slotmap::SlotMap<QueueId, TaskQueue>,
    selector: &'a mut TaskQueueSelector,
    canceled: Vec<DelayedTask>,
}

impl WakeUpHost for QueueHost<'_> {
    fn on_wake_up(&mut self, queue: QueueId, now: TimeTicks, order: EnqueueOrder) -> Option<WakeUp> {
        let task_queue = self.queues.get_mut(queue)?;
        if task_queue.move_ready_delayed_tasks(now, order, &mut self.canceled) {
            self.selector.on_work_queue_front_changed(
                queue,
                WorkQueueType::Delayed,
                task_queue.delayed.front_order(),
            );
        }
        task_queue.next_wake_up()
    }

    fn update_wake_up(&mut self, queue: QueueId, _now: TimeTicks) -> Option<WakeUp> {
        self.queues.get(queue).and_then(TaskQueue::next_wake_up)
    }

    fn remove_all_canceled_delayed_tasks_from_front(&mut self, queue: QueueId, _now: TimeTicks) -> bool {
        self.queues.get_mut(queue).is_some_and(|task_queue| {
            task_queue.remove_all_canceled_delayed_tasks_from_front(&mut self.canceled)
        })
    }
}

impl SchedulerInner {
    fn queue_mut(&mut self, queue: QueueId) -> Result<&mut TaskQueue> {
        self.queues
            .get_mut(queue)
            .ok_or(SchedulerError::UnknownQueue(queue))
    }

    fn queue(&self, queue: QueueId) -> Result<&TaskQueue> {
        self.queues.get(queue).ok_or(SchedulerError::UnknownQueue(queue))
    }

    fn wake_up_queue_for(&mut self, waking: bool) -> &mut WakeUpQueue {
        if waking {
            &mut self.wake_up_queue
        } else {
            &mut self.non_waking_wake_up_queue
        }
    }

    fn update_wake_up(&mut self, queue: QueueId, now: TimeTicks) -> Result<()> {
        let task_queue = self.queue(queue)?;
        let (waking, next) = (task_queue.waking, task_queue.next_wake_up());
        self.wake_up_queue_for(waking)
            .set_next_wake_up_for_queue(queue, now, next);
        Ok(())
    }

    fn has_due_wake_up(&self, now: TimeTicks) -> bool {
        [&self.wake_up_queue, &self.non_waking_wake_up_queue]
            .iter()
            .any(|q| q.next_wake_up().is_some_and(|w| w.is_ready(now)))
    }

    /// Promotes due delayed tasks. Returns the canceled ones it skipped.
    fn move_ready_delayed_tasks(&mut self, now: TimeTicks) -> Vec<DelayedTask> {
        if !self.has_due_wake_up(now) {
            return Vec::new();
        }
        let order = self.enqueue_order_generator.generate_next();
        let mut host = QueueHost {
            queues: &mut self.queues,
            selector: &mut self.selector,
            canceled: Vec::new(),
        };
        self.wake_up_queue
            .move_ready_delayed_tasks_to_work_queues(now, order, &mut host);
        self.non_waking_wake_up_queue
            .move_ready_delayed_tasks_to_work_queues(now, order, &mut host);
        host.canceled
    }

    fn take_next_task(&mut self) -> Option<Task> {
        let selected = self
            .selector
            .select_work_queue_to_service(SelectTaskOption::Default)?;
        let Some(task) = self.take_task(selected) else {
            debug_assert!(false, "selected {selected:?} has no task");
            tracing::warn!(?selected, "selected work queue was empty");
            return None;
        };
        if !task.is_canceled() {
            self.tasks_run += 1;
        }
        Some(task)
    }

    fn take_task(&mut self, selected: WorkQueueRef) -> Option<Task> {
        let task_queue = self.queues.get_mut(selected.queue)?;
        let work_queue = task_queue.work_queue_mut(selected.kind);
        let task = work_queue.pop()?;
        let front = work_queue.front_order();
        self.selector
            .on_work_queue_front_changed(selected.queue, selected.kind, front);
        Some(task)
    }
}

impl LocalScheduler {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self::with_settings(clock, SchedulerSettings::default())
    }

    pub fn with_settings(clock: Rc<dyn Clock>, settings: SchedulerSettings) -> Self {
        let work_requested = Rc::new(Cell::new(false));
        let scheduled_wake_up = Rc::new(Cell::new(None));

        let mut selector = TaskQueueSelector::with_settings(settings.clone());
        selector.set_observer(Box::new(WorkRequest(work_requested.clone())));

        Self {
            clock,
            inner: RefCell::new(SchedulerInner {
                settings,
                queues: slotmap::SlotMap::with_key(),
                names: FxHashMap::default(),
                selector,
                wake_up_queue: WakeUpQueue::waking(Box::new(TimerSlot(scheduled_wake_up.clone()))),
                non_waking_wake_up_queue: WakeUpQueue::non_waking(),
                enqueue_order_generator: EnqueueOrderGenerator::new(),
                tasks_run: 0,
            }),
            work_requested,
            scheduled_wake_up,
        }
    }

    pub fn now(&self) -> TimeTicks {
        self.clock.now()
    }

    /// Creates a queue whose delayed tasks arm the wake-up timer.
    pub fn create_task_queue(&self, name: impl Into<String>) -> QueueId {
        self.create_queue(name.into(), true)
    }

    /// Creates a queue whose delayed tasks never wake the thread by
    /// themselves; they run once something else has woken it.
    pub fn create_non_waking_task_queue(&self, name: impl Into<String>) -> QueueId {
        self.create_queue(name.into(), false)
    }

    fn create_queue(&self, name: String, waking: bool) -> QueueId {
        let mut inner = self.inner.borrow_mut();
        let task_queue = TaskQueue::new(name.clone(), waking);
        let fronts = task_queue.fronts();
        let id = inner.queues.insert(task_queue);
        inner.selector.add_queue(id, fronts);
        tracing::debug!(?id, %name, waking, "task queue created");
        inner.names.entry(name).or_insert(id);
        id
    }

    /// Unregisters `queue` and drops every task still in it.
    pub fn remove_task_queue(&self, queue: QueueId) -> Result<()> {
        let now = self.clock.now();
        let removed = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let task_queue = inner
                .queues
                .remove(queue)
                .ok_or(SchedulerError::UnknownQueue(queue))?;
            inner.selector.remove_queue(queue);
            inner
                .wake_up_queue_for(task_queue.waking)
                .unregister_queue(queue, now);
            if inner.names.get(&task_queue.name) == Some(&queue) {
                inner.names.remove(&task_queue.name);
            }
            tracing::debug!(?queue, name = %task_queue.name, "task queue removed");
            task_queue
        };
        // Pending tasks go with the queue, after the borrow is released, since
        // their captures may post to the scheduler from their destructors.
        drop(removed);
        Ok(())
    }

    pub fn queue_by_name(&self, name: &str) -> Option<QueueId> {
        self.inner.borrow().names.get(name).copied()
    }

    pub fn queue_priority(&self, queue: QueueId) -> Result<QueuePriority> {
        Ok(self.inner.borrow().queue(queue)?.priority)
    }

    pub fn set_queue_priority(&self, queue: QueueId, priority: QueuePriority) -> Result<()> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let task_queue = inner.queue_mut(queue)?;
        if task_queue.priority == priority {
            return Ok(());
        }
        tracing::debug!(?queue, from = %task_queue.priority, to = %priority, "queue priority changed");
        task_queue.priority = priority;
        inner.selector.set_queue_priority(queue, priority);
        Ok(())
    }

    pub fn is_queue_enabled(&self, queue: QueueId) -> Result<bool> {
        Ok(self.inner.borrow().queue(queue)?.enabled)
    }

    /// A disabled queue keeps its tasks but none of them are selected and its
    /// delayed tasks do not arm wake-ups.
    pub fn set_queue_enabled(&self, queue: QueueId, enabled: bool) -> Result<()> {
        let now = self.clock.now();
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let task_queue = inner.queue_mut(queue)?;
        if task_queue.enabled == enabled {
            return Ok(());
        }
        task_queue.enabled = enabled;
        if enabled {
            inner.selector.enable_queue(queue);
        } else {
            inner.selector.disable_queue(queue);
        }
        inner.update_wake_up(queue, now)
    }

    pub fn post_task(&self, queue: QueueId, task: impl FnOnce() + 'static) -> Result<()> {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        let task_queue = inner
            .queues
            .get_mut(queue)
            .ok_or(SchedulerError::UnknownQueue(queue))?;
        let order = inner.enqueue_order_generator.generate_next();
        let enabled = task_queue.enabled;
        if task_queue.immediate.push(Task::new(order, Box::new(task), None)) {
            inner
                .selector
                .on_work_queue_front_changed(queue, WorkQueueType::Immediate, Some(order));
        }
        tracing::trace!(?queue, %order, "task posted");
        if enabled {
            self.work_requested.set(true);
        }
        Ok(())
    }

    pub fn post_delayed_task(
        &self,
        queue: QueueId,
        delay: Duration,
        task: impl FnOnce() + 'static,
    ) -> Result<TaskHandle> {
        self.post_delayed_task_with_policy(
            queue,
            delay,
            Duration::ZERO,
            DelayPolicy::FlexibleNoSooner,
            task,
        )
    }

    pub fn post_delayed_task_with_policy(
        &self,
        queue: QueueId,
        delay: Duration,
        leeway: Duration,
        delay_policy: DelayPolicy,
        task: impl FnOnce() + 'static,
    ) -> Result<TaskHandle> {
        let now = self.clock.now();
        let mut inner = self.inner.borrow_mut();
        let high_resolution = delay < inner.settings.high_resolution_threshold;
        let task_queue = inner.queue_mut(queue)?;
        let handle = TaskHandle::new();
        let sequence_num = task_queue.next_sequence_num();
        task_queue.push_delayed(DelayedTask {
            delayed_run_time: now + delay,
            leeway,
            delay_policy,
            high_resolution,
            sequence_num,
            callback: Box::new(task),
            handle: handle.clone(),
        });
        tracing::trace!(?queue, ?delay, "delayed task posted");
        inner.update_wake_up(queue, now)?;
        Ok(handle)
    }

    /// Runs the next selected task. Returns false when nothing was ready.
    pub fn run_next_task(&self) -> bool {
        loop {
            let (task, canceled) = {
                let mut inner = self.inner.borrow_mut();
                let mut lazy_now = LazyNow::new(self.clock.as_ref());
                let canceled = inner.move_ready_delayed_tasks(lazy_now.now());
                (inner.take_next_task(), canceled)
            };

            // Destructors of canceled tasks may post new work.
            let dropped_any = !canceled.is_empty();
            drop(canceled);

            match task {
                Some(task) if task.is_canceled() => continue,
                Some(task) => {
                    task.run();
                    return true;
                }
                None if dropped_any => continue,
                None => return false,
            }
        }
    }

    /// Runs tasks until nothing is ready. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut count = 0;
        while self.run_next_task() {
            count += 1;
        }
        count
    }

    /// Drops canceled delayed tasks that would otherwise hold up wake-ups.
    pub fn sweep_canceled_delayed_tasks(&self) {
        let now = self.clock.now();
        let canceled = {
            let mut guard = self.inner.borrow_mut();
            let inner = &mut *guard;
            let mut host = QueueHost {
                queues: &mut inner.queues,
                selector: &mut inner.selector,
                canceled: Vec::new(),
            };
            inner
                .wake_up_queue
                .remove_all_canceled_delayed_tasks_from_front(now, &mut host);
            inner
                .non_waking_wake_up_queue
                .remove_all_canceled_delayed_tasks_from_front(now, &mut host);
            host.canceled
        };
        tracing::trace!(swept = canceled.len(), "canceled delayed tasks swept");
        drop(canceled);
    }

    /// True when no task is ready to run right now. Canceled delayed tasks
    /// do not count.
    pub fn is_idle(&self) -> bool {
        let now = self.clock.now();
        let inner = self.inner.borrow();
        inner.selector.all_empty()
            && !inner
                .queues
                .values()
                .any(|q| q.enabled && q.has_ready_delayed_task(now))
    }

    /// Earliest wake-up wanted by queues that are allowed to wake the thread.
    pub fn next_wake_up(&self) -> Option<WakeUp> {
        self.inner.borrow().wake_up_queue.next_wake_up()
    }

    /// The wake-up the timer was last armed with.
    pub fn scheduled_wake_up(&self) -> Option<WakeUp> {
        self.scheduled_wake_up.get()
    }

    /// Returns and clears the flag raised by posts and queue enablement.
    pub fn take_work_request(&self) -> bool {
        self.work_requested.replace(false)
    }

    pub fn has_pending_high_resolution_tasks(&self) -> bool {
        let inner = self.inner.borrow();
        inner.wake_up_queue.has_pending_high_resolution_tasks()
            || inner.non_waking_wake_up_queue.has_pending_high_resolution_tasks()
    }

    pub fn pending_task_count(&self, queue: QueueId) -> Result<usize> {
        Ok(self.inner.borrow().queue(queue)?.pending_task_count())
    }

    pub fn tasks_run(&self) -> u64 {
        self.inner.borrow().tasks_run
    }

    pub fn task_runner(self: &Rc<Self>, queue: QueueId) -> QueueTaskRunner {
        QueueTaskRunner {
            scheduler: Rc::downgrade(self),
            clock: self.clock.clone(),
            queue,
        }
    }
}

/// Posts into one queue of a [`LocalScheduler`] without keeping it alive.
#[derive(Clone)]
pub struct QueueTaskRunner {
    scheduler: Weak<LocalScheduler>,
    clock: Rc<dyn Clock>,
    queue: QueueId,
}

impl QueueTaskRunner {
    pub fn queue(&self) -> QueueId {
        self.queue
    }

    fn scheduler(&self) -> Result<Rc<LocalScheduler>> {
        self.scheduler.upgrade().ok_or(SchedulerError::SchedulerGone)
    }
}

impl TaskRunner for QueueTaskRunner {
    fn post_task(&self, task: Box<dyn FnOnce()>) -> Result<()> {
        self.scheduler()?.post_task(self.queue, task)
    }

    fn post_delayed_task(&self, delay: Duration, task: Box<dyn FnOnce()>) -> Result<TaskHandle> {
        self.scheduler()?.post_delayed_task(self.queue, delay, task)
    }

    fn now(&self) -> TimeTicks {
        self.clock.now()
    }
}
