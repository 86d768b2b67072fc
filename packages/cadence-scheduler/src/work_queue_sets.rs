use crate::enqueue_order::EnqueueOrder;
use crate::heap::IndexedHeap;
use crate::priority::{PRIORITY_COUNT, QueuePriority};
use crate::queue::QueueId;
use slotmap::SecondaryMap;
use smallvec::SmallVec;

/// Which half of a task queue a work queue holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkQueueType {
    Immediate,
    Delayed,
}

/// Names one work queue: the immediate or delayed half of a task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkQueueRef {
    pub queue: QueueId,
    pub kind: WorkQueueType,
}

/// A set for one priority gained its first member or lost its last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTransition {
    BecameNonEmpty(QueuePriority),
    BecameEmpty(QueuePriority),
}

pub type SetTransitions = SmallVec<[SetTransition; 2]>;

/// Per-priority sets of non-empty work queues of a single [`WorkQueueType`].
///
/// Within a set, queues are ordered by the enqueue order of their front task,
/// so the queue holding the oldest ready task is found in O(1). Membership
/// changes report [`SetTransition`]s that the caller folds into its view of
/// which priorities have work.
#[derive(Debug)]
pub struct WorkQueueSets {
    kind: WorkQueueType,
    sets: [IndexedHeap<QueueId, EnqueueOrder>; PRIORITY_COUNT],
    membership: SecondaryMap<QueueId, QueuePriority>,
}

impl WorkQueueSets {
    pub fn new(kind: WorkQueueType) -> Self {
        Self {
            kind,
            sets: std::array::from_fn(|_| IndexedHeap::new()),
            membership: SecondaryMap::new(),
        }
    }

    pub fn kind(&self) -> WorkQueueType {
        self.kind
    }

    pub fn contains(&self, queue: QueueId) -> bool {
        self.membership.contains_key(queue)
    }

    pub fn priority_of(&self, queue: QueueId) -> Option<QueuePriority> {
        self.membership.get(queue).copied()
    }

    pub fn len(&self) -> usize {
        self.membership.len()
    }

    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    pub fn is_set_empty(&self, priority: QueuePriority) -> bool {
        self.sets[priority.index()].is_empty()
    }

    /// The queue whose front task was enqueued first at `priority`.
    pub fn oldest_queue_in_set(&self, priority: QueuePriority) -> Option<(QueueId, EnqueueOrder)> {
        self.sets[priority.index()]
            .peek()
            .map(|(queue, order)| (queue, *order))
    }

    pub fn add_queue(
        &mut self,
        queue: QueueId,
        priority: QueuePriority,
        front: EnqueueOrder,
    ) -> Option<SetTransition> {
        if self.membership.contains_key(queue) {
            debug_assert!(false, "{queue:?} already in {:?} sets", self.kind);
            tracing::warn!(?queue, kind = ?self.kind, "ignoring duplicate work queue insert");
            return None;
        }
        let set = &mut self.sets[priority.index()];
        let was_empty = set.is_empty();
        set.insert(queue, front);
        self.membership.insert(queue, priority);
        was_empty.then_some(SetTransition::BecameNonEmpty(priority))
    }

    pub fn remove_queue(&mut self, queue: QueueId) -> Option<SetTransition> {
        let priority = self.membership.remove(queue)?;
        let set = &mut self.sets[priority.index()];
        set.remove(queue);
        set.is_empty()
            .then_some(SetTransition::BecameEmpty(priority))
    }

    /// The front task of a member queue changed but the queue is still non-empty.
    pub fn on_queue_front_changed(&mut self, queue: QueueId, front: EnqueueOrder) {
        match self.membership.get(queue) {
            Some(&priority) => self.sets[priority.index()].insert(queue, front),
            None => debug_assert!(false, "{queue:?} not in {:?} sets", self.kind),
        }
    }

    /// Moves a member queue to the set for `priority`.
    pub fn change_set_index(&mut self, queue: QueueId, priority: QueuePriority) -> SetTransitions {
        let mut transitions = SetTransitions::new();
        let Some(&old) = self.membership.get(queue) else {
            return transitions;
        };
        if old == priority {
            return transitions;
        }
        let Some(front) = self.sets[old.index()].get(queue).copied() else {
            return transitions;
        };
        transitions.extend(self.remove_queue(queue));
        transitions.extend(self.add_queue(queue, priority, front));
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn queue_ids(n: usize) -> Vec<QueueId> {
        let mut map = SlotMap::<QueueId, ()>::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn order(n: u64) -> EnqueueOrder {
        EnqueueOrder::from_raw(n)
    }

    #[test]
    fn reports_first_and_last_member() {
        let q = queue_ids(2);
        let mut sets = WorkQueueSets::new(WorkQueueType::Immediate);

        assert_eq!(
            sets.add_queue(q[0], QueuePriority::High, order(4)),
            Some(SetTransition::BecameNonEmpty(QueuePriority::High))
        );
        assert_eq!(sets.add_queue(q[1], QueuePriority::High, order(2)), None);
        assert_eq!(sets.oldest_queue_in_set(QueuePriority::High), Some((q[1], order(2))));

        assert_eq!(sets.remove_queue(q[1]), None);
        assert_eq!(
            sets.remove_queue(q[0]),
            Some(SetTransition::BecameEmpty(QueuePriority::High))
        );
        assert!(sets.is_set_empty(QueuePriority::High));
        assert_eq!(sets.remove_queue(q[0]), None);
    }

    #[test]
    fn front_change_reorders_set() {
        let q = queue_ids(2);
        let mut sets = WorkQueueSets::new(WorkQueueType::Delayed);
        sets.add_queue(q[0], QueuePriority::Normal, order(1));
        sets.add_queue(q[1], QueuePriority::Normal, order(3));

        sets.on_queue_front_changed(q[0], order(5));
        assert_eq!(sets.oldest_queue_in_set(QueuePriority::Normal), Some((q[1], order(3))));
    }

    #[test]
    fn change_set_index_moves_between_priorities() {
        let q = queue_ids(1);
        let mut sets = WorkQueueSets::new(WorkQueueType::Immediate);
        sets.add_queue(q[0], QueuePriority::Low, order(9));

        let transitions = sets.change_set_index(q[0], QueuePriority::Highest);
        assert_eq!(
            transitions.as_slice(),
            &[
                SetTransition::BecameEmpty(QueuePriority::Low),
                SetTransition::BecameNonEmpty(QueuePriority::Highest),
            ]
        );
        assert_eq!(sets.priority_of(q[0]), Some(QueuePriority::Highest));
        assert_eq!(
            sets.oldest_queue_in_set(QueuePriority::Highest),
            Some((q[0], order(9)))
        );
        assert!(sets.change_set_index(q[0], QueuePriority::Highest).is_empty());
    }
}
