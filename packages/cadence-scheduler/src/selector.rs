//! Priority selection across task queues.
//!
//! The selector decides which work queue the runtime should pop a task from
//! next. Each priority level with ready work has a sort key in a small
//! indexed priority queue; the level with the smallest key is serviced.
//! Control and BestEffort have fixed extreme keys. Every other level's key is
//! `selection_count + tolerance`, and `selection_count` grows on every
//! selection, so a level that keeps losing eventually holds the smallest key
//! and wins a round.
//!
//! Inside a level, the oldest ready task wins regardless of whether it is
//! immediate or delayed, except that after too many consecutive delayed picks
//! an available immediate task is forced through.

use crate::enqueue_order::EnqueueOrder;
use crate::priority::{PRIORITY_COUNT, QueuePriority};
use crate::queue::QueueId;
use crate::settings::SchedulerSettings;
use crate::small_priority_queue::SmallPriorityQueue;
use crate::work_queue_sets::{SetTransition, WorkQueueRef, WorkQueueSets, WorkQueueType};
use slotmap::SecondaryMap;

/// Notified when a disabled queue becomes selectable again.
pub trait SelectorObserver {
    fn on_task_queue_enabled(&mut self, queue: QueueId);
}

/// Enqueue order of the front task of each half of a task queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkQueueFronts {
    pub immediate: Option<EnqueueOrder>,
    pub delayed: Option<EnqueueOrder>,
}

impl WorkQueueFronts {
    fn get_mut(&mut self, kind: WorkQueueType) -> &mut Option<EnqueueOrder> {
        match kind {
            WorkQueueType::Immediate => &mut self.immediate,
            WorkQueueType::Delayed => &mut self.delayed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectTaskOption {
    #[default]
    Default,
    /// Only consider immediate work queues.
    SkipDelayed,
}

#[derive(Debug, Clone, Copy)]
struct QueueRecord {
    priority: QueuePriority,
    enabled: bool,
    fronts: WorkQueueFronts,
}

pub struct TaskQueueSelector {
    settings: SchedulerSettings,
    queues: SecondaryMap<QueueId, QueueRecord>,
    delayed_work_queue_sets: WorkQueueSets,
    immediate_work_queue_sets: WorkQueueSets,
    active_priorities: SmallPriorityQueue<PRIORITY_COUNT>,
    selection_count: u64,
    immediate_starvation_count: usize,
    observer: Option<Box<dyn SelectorObserver>>,
}

impl TaskQueueSelector {
    pub fn new() -> Self {
        Self::with_settings(SchedulerSettings::default())
    }

    pub fn with_settings(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            queues: SecondaryMap::new(),
            delayed_work_queue_sets: WorkQueueSets::new(WorkQueueType::Delayed),
            immediate_work_queue_sets: WorkQueueSets::new(WorkQueueType::Immediate),
            active_priorities: SmallPriorityQueue::new(),
            selection_count: 0,
            immediate_starvation_count: 0,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn SelectorObserver>) {
        self.observer = Some(observer);
    }

    /// Registers an enabled queue at [`QueuePriority::Normal`].
    pub fn add_queue(&mut self, queue: QueueId, fronts: WorkQueueFronts) {
        if self.queues.contains_key(queue) {
            debug_assert!(false, "{queue:?} registered twice");
            tracing::warn!(?queue, "ignoring duplicate queue registration");
            return;
        }
        let priority = QueuePriority::Normal;
        self.queues.insert(
            queue,
            QueueRecord {
                priority,
                enabled: true,
                fronts,
            },
        );
        self.add_to_sets(queue, priority, fronts);
        tracing::trace!(?queue, "selector: queue added");
    }

    pub fn remove_queue(&mut self, queue: QueueId) {
        let Some(record) = self.queues.remove(queue) else {
            debug_assert!(false, "{queue:?} is not registered");
            return;
        };
        if record.enabled {
            self.remove_from_sets(queue);
        }
        tracing::trace!(?queue, "selector: queue removed");
    }

    pub fn enable_queue(&mut self, queue: QueueId) {
        let Some(record) = self.queues.get_mut(queue) else {
            debug_assert!(false, "{queue:?} is not registered");
            return;
        };
        if record.enabled {
            debug_assert!(false, "{queue:?} is already enabled");
            return;
        }
        record.enabled = true;
        let (priority, fronts) = (record.priority, record.fronts);
        self.add_to_sets(queue, priority, fronts);
        tracing::debug!(?queue, %priority, "selector: queue enabled");

        if let Some(observer) = self.observer.as_mut() {
            observer.on_task_queue_enabled(queue);
        }
    }

    pub fn disable_queue(&mut self, queue: QueueId) {
        let Some(record) = self.queues.get_mut(queue) else {
            debug_assert!(false, "{queue:?} is not registered");
            return;
        };
        if !record.enabled {
            debug_assert!(false, "{queue:?} is already disabled");
            return;
        }
        record.enabled = false;
        self.remove_from_sets(queue);
        tracing::debug!(?queue, "selector: queue disabled");
    }

    pub fn set_queue_priority(&mut self, queue: QueueId, priority: QueuePriority) {
        let Some(record) = self.queues.get_mut(queue) else {
            debug_assert!(false, "{queue:?} is not registered");
            return;
        };
        if record.priority == priority {
            return;
        }
        record.priority = priority;
        if !record.enabled {
            return;
        }
        for transition in self
            .immediate_work_queue_sets
            .change_set_index(queue, priority)
        {
            self.apply_transition(transition);
        }
        for transition in self.delayed_work_queue_sets.change_set_index(queue, priority) {
            self.apply_transition(transition);
        }
    }

    /// Records that the front task of one half of `queue` changed.
    ///
    /// `front` is `None` when that work queue is now empty.
    pub fn on_work_queue_front_changed(
        &mut self,
        queue: QueueId,
        kind: WorkQueueType,
        front: Option<EnqueueOrder>,
    ) {
        let Some(record) = self.queues.get_mut(queue) else {
            debug_assert!(false, "{queue:?} is not registered");
            return;
        };
        *record.fronts.get_mut(kind) = front;
        if !record.enabled {
            return;
        }
        let priority = record.priority;
        let sets = self.sets_mut(kind);
        let transition = match front {
            Some(order) if sets.contains(queue) => {
                sets.on_queue_front_changed(queue, order);
                None
            }
            Some(order) => sets.add_queue(queue, priority, order),
            None => sets.remove_queue(queue),
        };
        if let Some(transition) = transition {
            self.apply_transition(transition);
        }
    }

    /// Picks the work queue whose front task should run next, or `None` when
    /// nothing is ready.
    pub fn select_work_queue_to_service(&mut self, option: SelectTaskOption) -> Option<WorkQueueRef> {
        let priority = self.highest_pending_priority(option)?;
        let selected = self.choose_with_priority(priority, option)?;

        if selected.kind == WorkQueueType::Delayed
            && !self.immediate_work_queue_sets.is_set_empty(priority)
        {
            self.immediate_starvation_count += 1;
        } else {
            self.immediate_starvation_count = 0;
        }

        self.selection_count += 1;
        let key = self.sort_key_for(priority);
        self.active_priorities.change_key(priority.index(), key);

        tracing::trace!(
            queue = ?selected.queue,
            kind = ?selected.kind,
            %priority,
            selection_count = self.selection_count,
            "selected work queue"
        );
        Some(selected)
    }

    /// The priority the next selection would service.
    pub fn highest_pending_priority(&self, option: SelectTaskOption) -> Option<QueuePriority> {
        match option {
            SelectTaskOption::Default => self
                .active_priorities
                .min_id()
                .and_then(QueuePriority::from_index),
            SelectTaskOption::SkipDelayed => QueuePriority::ALL
                .into_iter()
                .find(|&p| !self.immediate_work_queue_sets.is_set_empty(p)),
        }
    }

    /// True when no enabled queue has ready work.
    pub fn all_empty(&self) -> bool {
        self.active_priorities.is_empty()
    }

    pub fn queue_priority(&self, queue: QueueId) -> Option<QueuePriority> {
        self.queues.get(queue).map(|r| r.priority)
    }

    pub fn is_queue_enabled(&self, queue: QueueId) -> bool {
        self.queues.get(queue).is_some_and(|r| r.enabled)
    }

    pub fn is_registered(&self, queue: QueueId) -> bool {
        self.queues.contains_key(queue)
    }

    pub fn selection_count(&self) -> u64 {
        self.selection_count
    }

    pub fn immediate_starvation_count(&self) -> usize {
        self.immediate_starvation_count
    }

    fn choose_with_priority(
        &self,
        priority: QueuePriority,
        option: SelectTaskOption,
    ) -> Option<WorkQueueRef> {
        let immediate = self
            .immediate_work_queue_sets
            .oldest_queue_in_set(priority)
            .map(|(queue, order)| (immediate_ref(queue), order));
        if option == SelectTaskOption::SkipDelayed {
            return immediate.map(|(selected, _)| selected);
        }
        let delayed = self
            .delayed_work_queue_sets
            .oldest_queue_in_set(priority)
            .map(|(queue, order)| (delayed_ref(queue), order));

        if self.immediate_starvation_count >= self.settings.max_delayed_starvation_tasks {
            return immediate.or(delayed).map(|(selected, _)| selected);
        }

        match (immediate, delayed) {
            (Some((imm, imm_order)), Some((del, del_order))) => {
                Some(if imm_order <= del_order { imm } else { del })
            }
            (Some((imm, _)), None) => Some(imm),
            (None, Some((del, _))) => Some(del),
            (None, None) => None,
        }
    }

    fn sort_key_for(&self, priority: QueuePriority) -> i64 {
        match priority {
            QueuePriority::Control => i64::MIN,
            QueuePriority::BestEffort => i64::MAX,
            _ => i64::try_from(self.selection_count)
                .unwrap_or(i64::MAX)
                .saturating_add(self.settings.starvation_tolerance_for(priority)),
        }
    }

    fn sets_mut(&mut self, kind: WorkQueueType) -> &mut WorkQueueSets {
        match kind {
            WorkQueueType::Immediate => &mut self.immediate_work_queue_sets,
            WorkQueueType::Delayed => &mut self.delayed_work_queue_sets,
        }
    }

    fn add_to_sets(&mut self, queue: QueueId, priority: QueuePriority, fronts: WorkQueueFronts) {
        if let Some(front) = fronts.immediate {
            if let Some(t) = self
                .immediate_work_queue_sets
                .add_queue(queue, priority, front)
            {
                self.apply_transition(t);
            }
        }
        if let Some(front) = fronts.delayed {
            if let Some(t) = self.delayed_work_queue_sets.add_queue(queue, priority, front) {
                self.apply_transition(t);
            }
        }
    }

    fn remove_from_sets(&mut self, queue: QueueId) {
        if let Some(t) = self.immediate_work_queue_sets.remove_queue(queue) {
            self.apply_transition(t);
        }
        if let Some(t) = self.delayed_work_queue_sets.remove_queue(queue) {
            self.apply_transition(t);
        }
    }

    fn apply_transition(&mut self, transition: SetTransition) {
        match transition {
            SetTransition::BecameNonEmpty(priority) => {
                if !self.active_priorities.contains(priority.index()) {
                    let key = self.sort_key_for(priority);
                    self.active_priorities.insert(priority.index(), key);
                }
            }
            SetTransition::BecameEmpty(priority) => {
                if self.immediate_work_queue_sets.is_set_empty(priority)
                    && self.delayed_work_queue_sets.is_set_empty(priority)
                {
                    self.active_priorities.erase(priority.index());
                }
            }
        }
    }
}

impl Default for TaskQueueSelector {
    fn default() -> Self {
        Self::new()
    }
}

fn immediate_ref(queue: QueueId) -> WorkQueueRef {
    WorkQueueRef {
        queue,
        kind: WorkQueueType::Immediate,
    }
}

fn delayed_ref(queue: QueueId) -> WorkQueueRef {
    WorkQueueRef {
        queue,
        kind: WorkQueueType::Delayed,
    }
}
