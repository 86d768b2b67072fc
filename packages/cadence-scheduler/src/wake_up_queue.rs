//! Delayed-task wake-ups.
//!
//! Every task queue with pending delayed work owns at most one entry in a
//! min-heap keyed by the earliest time its next delayed task may run. The
//! heap top is the next instant at which anything can become ready.

use crate::enqueue_order::EnqueueOrder;
use crate::heap::IndexedHeap;
use crate::queue::QueueId;
use crate::wake_up::{ScheduledWakeUp, WakeUp, WakeUpResolution};
use cadence_time::TimeTicks;
use smallvec::SmallVec;

/// Receives the new earliest wake-up whenever it changes, so the host can
/// re-arm its timer.
pub trait WakeUpHandler {
    fn on_next_wake_up_changed(&mut self, now: TimeTicks, wake_up: Option<WakeUp>);
}

/// Queue-side callbacks the wake-up queue drives.
///
/// Each callback that can change a queue's delayed work returns that queue's
/// next wake-up; the wake-up queue reschedules it.
pub trait WakeUpHost {
    /// Moves every delayed task of `queue` that is due at `now` into its
    /// delayed work queue, stamping it with `order`.
    fn on_wake_up(&mut self, queue: QueueId, now: TimeTicks, order: EnqueueOrder)
    -> Option<WakeUp>;

    /// Recomputes the wake-up `queue` currently wants.
    fn update_wake_up(&mut self, queue: QueueId, now: TimeTicks) -> Option<WakeUp>;

    /// Drops canceled tasks from the front of `queue`'s delayed work.
    /// Returns true if anything was removed.
    fn remove_all_canceled_delayed_tasks_from_front(&mut self, queue: QueueId, now: TimeTicks)
    -> bool;
}

struct NonWaking;

impl WakeUpHandler for NonWaking {
    fn on_next_wake_up_changed(&mut self, _now: TimeTicks, _wake_up: Option<WakeUp>) {}
}

pub struct WakeUpQueue {
    wake_ups: IndexedHeap<QueueId, ScheduledWakeUp>,
    pending_high_res_wake_up_count: usize,
    handler: Box<dyn WakeUpHandler>,
    waking: bool,
}

impl WakeUpQueue {
    /// A wake-up queue whose earliest wake-up is forwarded to `handler`.
    pub fn waking(handler: Box<dyn WakeUpHandler>) -> Self {
        Self {
            wake_ups: IndexedHeap::new(),
            pending_high_res_wake_up_count: 0,
            handler,
            waking: true,
        }
    }

    /// A wake-up queue that never asks the host to wake up. Its delayed tasks
    /// are promoted only when something else wakes the thread.
    pub fn non_waking() -> Self {
        Self {
            wake_ups: IndexedHeap::new(),
            pending_high_res_wake_up_count: 0,
            handler: Box::new(NonWaking),
            waking: false,
        }
    }

    pub fn is_waking(&self) -> bool {
        self.waking
    }

    pub fn len(&self) -> usize {
        self.wake_ups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wake_ups.is_empty()
    }

    pub fn next_wake_up(&self) -> Option<WakeUp> {
        self.wake_ups.peek().map(|(_, scheduled)| scheduled.0)
    }

    pub fn wake_up_for_queue(&self, queue: QueueId) -> Option<WakeUp> {
        self.wake_ups.get(queue).map(|scheduled| scheduled.0)
    }

    pub fn has_pending_high_resolution_tasks(&self) -> bool {
        self.pending_high_res_wake_up_count > 0
    }

    /// Replaces, or with `None` removes, the wake-up for `queue`.
    ///
    /// A disabled queue may only be given `None`.
    pub fn set_next_wake_up_for_queue(
        &mut self,
        queue: QueueId,
        now: TimeTicks,
        wake_up: Option<WakeUp>,
    ) {
        let previous = self.next_wake_up();
        let previous_resolution = self.wake_ups.get(queue).map(|s| s.0.resolution);

        match wake_up {
            Some(wake_up) => self.wake_ups.insert(queue, ScheduledWakeUp(wake_up)),
            None => {
                self.wake_ups.remove(queue);
            }
        }

        if previous_resolution == Some(WakeUpResolution::High) {
            debug_assert!(self.pending_high_res_wake_up_count > 0);
            self.pending_high_res_wake_up_count =
                self.pending_high_res_wake_up_count.saturating_sub(1);
        }
        if wake_up.is_some_and(|w| w.resolution == WakeUpResolution::High) {
            self.pending_high_res_wake_up_count += 1;
        }

        let next = self.next_wake_up();
        if next != previous {
            tracing::trace!(?queue, ?next, waking = self.waking, "next wake-up changed");
            self.handler.on_next_wake_up_changed(now, next);
        }
    }

    pub fn unregister_queue(&mut self, queue: QueueId, now: TimeTicks) {
        if self.wake_ups.contains(queue) {
            self.set_next_wake_up_for_queue(queue, now, None);
        }
    }

    /// Wakes every queue whose wake-up is due at `now`. Returns how many
    /// wake-ups fired.
    pub fn move_ready_delayed_tasks_to_work_queues<H: WakeUpHost + ?Sized>(
        &mut self,
        now: TimeTicks,
        order: EnqueueOrder,
        host: &mut H,
    ) -> usize {
        let mut fired = 0;
        let mut deferred: SmallVec<[(QueueId, WakeUp); 2]> = SmallVec::new();

        loop {
            let Some((queue, top)) = self.wake_ups.peek().map(|(q, s)| (q, s.0)) else {
                break;
            };
            if !top.is_ready(now) {
                break;
            }
            let next = host.on_wake_up(queue, now, order);
            fired += 1;
            match next {
                // Re-inserting it now would spin. It is put back once the drain ends.
                Some(wake_up) if wake_up.is_ready(now) => {
                    tracing::warn!(?queue, "queue left due delayed work after waking");
                    self.set_next_wake_up_for_queue(queue, now, None);
                    deferred.push((queue, wake_up));
                }
                next => self.set_next_wake_up_for_queue(queue, now, next),
            }
        }
        for (queue, wake_up) in deferred {
            self.set_next_wake_up_for_queue(queue, now, Some(wake_up));
        }

        if fired == 0 {
            return 0;
        }
        tracing::trace!(fired, %now, "promoted delayed work");

        // Waking a queue may push back the wake-ups of queues that share
        // state with it. Refresh the top until it stops changing.
        let Some(mut queue) = self.wake_ups.peek_key() else {
            return fired;
        };
        let next = host.update_wake_up(queue, now);
        self.set_next_wake_up_for_queue(queue, now, next);
        while let Some(top) = self.wake_ups.peek_key() {
            if top == queue {
                break;
            }
            queue = top;
            let next = host.update_wake_up(queue, now);
            self.set_next_wake_up_for_queue(queue, now, next);
        }
        fired
    }

    /// Trims canceled delayed tasks from whichever queue wakes first until
    /// that queue has nothing left to trim.
    pub fn remove_all_canceled_delayed_tasks_from_front<H: WakeUpHost + ?Sized>(
        &mut self,
        now: TimeTicks,
        host: &mut H,
    ) {
        while let Some(queue) = self.wake_ups.peek_key() {
            if !host.remove_all_canceled_delayed_tasks_from_front(queue, now) {
                break;
            }
            let next = host.update_wake_up(queue, now);
            self.set_next_wake_up_for_queue(queue, now, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::{SecondaryMap, SlotMap};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorded(Rc<RefCell<Vec<Option<TimeTicks>>>>);

    impl WakeUpHandler for Recorded {
        fn on_next_wake_up_changed(&mut self, _now: TimeTicks, wake_up: Option<WakeUp>) {
            self.0.borrow_mut().push(wake_up.map(|w| w.time));
        }
    }

    /// Delayed run times per queue, with a canceled flag per task.
    #[derive(Default)]
    struct FakeHost {
        delayed: SecondaryMap<QueueId, VecDeque<(TimeTicks, bool)>>,
        woken: Vec<(QueueId, EnqueueOrder)>,
    }

    impl FakeHost {
        fn front(&self, queue: QueueId) -> Option<WakeUp> {
            self.delayed
                .get(queue)
                .and_then(|d| d.front())
                .map(|(t, _)| WakeUp::at(*t))
        }
    }

    impl WakeUpHost for FakeHost {
        fn on_wake_up(&mut self, queue: QueueId, now: TimeTicks, order: EnqueueOrder) -> Option<WakeUp> {
            self.woken.push((queue, order));
            if let Some(d) = self.delayed.get_mut(queue) {
                while d.front().is_some_and(|(t, _)| *t <= now) {
                    d.pop_front();
                }
            }
            self.front(queue)
        }

        fn update_wake_up(&mut self, queue: QueueId, _now: TimeTicks) -> Option<WakeUp> {
            self.front(queue)
        }

        fn remove_all_canceled_delayed_tasks_from_front(&mut self, queue: QueueId, _now: TimeTicks) -> bool {
            let Some(d) = self.delayed.get_mut(queue) else {
                return false;
            };
            let before = d.len();
            while d.front().is_some_and(|(_, canceled)| *canceled) {
                d.pop_front();
            }
            d.len() != before
        }
    }

    fn queue_ids(n: usize) -> Vec<QueueId> {
        let mut map = SlotMap::<QueueId, ()>::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    fn ms(n: u64) -> TimeTicks {
        TimeTicks::from_millis(n)
    }

    #[test]
    fn notifies_only_when_minimum_changes() {
        let q = queue_ids(2);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut wake_ups = WakeUpQueue::waking(Box::new(Recorded(seen.clone())));

        wake_ups.set_next_wake_up_for_queue(q[0], ms(0), Some(WakeUp::at(ms(50))));
        wake_ups.set_next_wake_up_for_queue(q[1], ms(0), Some(WakeUp::at(ms(80))));
        wake_ups.set_next_wake_up_for_queue(q[1], ms(0), Some(WakeUp::at(ms(20))));
        wake_ups.set_next_wake_up_for_queue(q[0], ms(0), None);
        wake_ups.unregister_queue(q[1], ms(0));

        assert_eq!(*seen.borrow(), vec![Some(ms(50)), Some(ms(20)), None]);
        assert_eq!(wake_ups.next_wake_up(), None);
    }

    #[test]
    fn tracks_high_resolution_wake_ups() {
        let q = queue_ids(2);
        let mut wake_ups = WakeUpQueue::non_waking();
        let high = WakeUp::at(ms(5)).with_resolution(WakeUpResolution::High);

        wake_ups.set_next_wake_up_for_queue(q[0], ms(0), Some(high));
        wake_ups.set_next_wake_up_for_queue(q[1], ms(0), Some(high));
        assert!(wake_ups.has_pending_high_resolution_tasks());

        wake_ups.set_next_wake_up_for_queue(q[0], ms(0), Some(WakeUp::at(ms(9))));
        assert!(wake_ups.has_pending_high_resolution_tasks());
        wake_ups.set_next_wake_up_for_queue(q[1], ms(0), None);
        assert!(!wake_ups.has_pending_high_resolution_tasks());
    }

    #[test]
    fn promotes_only_due_queues() {
        let q = queue_ids(2);
        let mut host = FakeHost::default();
        host.delayed.insert(q[0], VecDeque::from([(ms(100), false)]));
        host.delayed.insert(q[1], VecDeque::from([(ms(40), false), (ms(150), false)]));

        let mut wake_ups = WakeUpQueue::non_waking();
        for &queue in &q {
            let next = host.front(queue);
            wake_ups.set_next_wake_up_for_queue(queue, ms(0), next);
        }

        let order = EnqueueOrder::from_raw(7);
        assert_eq!(wake_ups.move_ready_delayed_tasks_to_work_queues(ms(30), order, &mut host), 0);
        assert!(host.woken.is_empty());

        assert_eq!(wake_ups.move_ready_delayed_tasks_to_work_queues(ms(100), order, &mut host), 2);
        assert_eq!(host.woken.len(), 2);
        assert_eq!(wake_ups.wake_up_for_queue(q[0]), None);
        assert_eq!(wake_ups.next_wake_up().map(|w| w.time), Some(ms(150)));
    }

    /// Waking `trigger` pushes `sibling`'s next run time back, as when two
    /// queues share a budget.
    struct CoupledHost {
        fronts: SecondaryMap<QueueId, TimeTicks>,
        trigger: QueueId,
        sibling: QueueId,
        pushed_to: TimeTicks,
    }

    impl WakeUpHost for CoupledHost {
        fn on_wake_up(&mut self, queue: QueueId, now: TimeTicks, _order: EnqueueOrder) -> Option<WakeUp> {
            self.fronts.remove(queue);
            if queue == self.trigger {
                self.fronts.insert(self.sibling, self.pushed_to);
            }
            self.update_wake_up(queue, now)
        }

        fn update_wake_up(&mut self, queue: QueueId, _now: TimeTicks) -> Option<WakeUp> {
            self.fronts.get(queue).map(|t| WakeUp::at(*t))
        }

        fn remove_all_canceled_delayed_tasks_from_front(&mut self, _queue: QueueId, _now: TimeTicks) -> bool {
            false
        }
    }

    #[test]
    fn waking_refreshes_pushed_back_siblings() {
        let q = queue_ids(3);
        let mut host = CoupledHost {
            fronts: SecondaryMap::new(),
            trigger: q[0],
            sibling: q[1],
            pushed_to: ms(50),
        };
        for (queue, at) in q.iter().zip([10, 20, 30]) {
            host.fronts.insert(*queue, ms(at));
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut wake_ups = WakeUpQueue::waking(Box::new(Recorded(seen.clone())));
        for &queue in &q {
            let next = host.update_wake_up(queue, ms(0));
            wake_ups.set_next_wake_up_for_queue(queue, ms(0), next);
        }

        let fired = wake_ups.move_ready_delayed_tasks_to_work_queues(ms(10), EnqueueOrder::from_raw(1), &mut host);
        assert_eq!(fired, 1);
        assert_eq!(wake_ups.wake_up_for_queue(q[1]).map(|w| w.time), Some(ms(50)));
        assert_eq!(wake_ups.next_wake_up().map(|w| w.time), Some(ms(30)));
        assert_eq!(seen.borrow().last(), Some(&Some(ms(30))));
    }

    /// Never manages to promote anything.
    struct StuckHost {
        at: TimeTicks,
        wakes: usize,
    }

    impl WakeUpHost for StuckHost {
        fn on_wake_up(&mut self, _queue: QueueId, _now: TimeTicks, _order: EnqueueOrder) -> Option<WakeUp> {
            self.wakes += 1;
            Some(WakeUp::at(self.at))
        }

        fn update_wake_up(&mut self, _queue: QueueId, _now: TimeTicks) -> Option<WakeUp> {
            Some(WakeUp::at(self.at))
        }

        fn remove_all_canceled_delayed_tasks_from_front(&mut self, _queue: QueueId, _now: TimeTicks) -> bool {
            false
        }
    }

    #[test]
    fn still_due_wake_up_is_deferred_not_respun() {
        let q = queue_ids(1);
        let mut host = StuckHost { at: ms(10), wakes: 0 };
        let mut wake_ups = WakeUpQueue::non_waking();
        wake_ups.set_next_wake_up_for_queue(q[0], ms(0), Some(WakeUp::at(ms(10))));

        let fired = wake_ups.move_ready_delayed_tasks_to_work_queues(ms(15), EnqueueOrder::from_raw(1), &mut host);
        assert_eq!(fired, 1);
        assert_eq!(host.wakes, 1);
        // Kept, so the next pass retries it.
        assert_eq!(wake_ups.wake_up_for_queue(q[0]).map(|w| w.time), Some(ms(10)));
        assert_eq!(wake_ups.len(), 1);
    }

    #[test]
    fn canceled_front_trimming_converges() {
        let q = queue_ids(2);
        let mut host = FakeHost::default();
        host.delayed.insert(q[0], VecDeque::from([(ms(10), true), (ms(90), false)]));
        host.delayed.insert(q[1], VecDeque::from([(ms(20), true), (ms(30), true), (ms(60), false)]));

        let mut wake_ups = WakeUpQueue::non_waking();
        for &queue in &q {
            let next = host.front(queue);
            wake_ups.set_next_wake_up_for_queue(queue, ms(0), next);
        }

        wake_ups.remove_all_canceled_delayed_tasks_from_front(ms(0), &mut host);
        assert_eq!(wake_ups.next_wake_up().map(|w| w.time), Some(ms(60)));
        assert_eq!(wake_ups.wake_up_for_queue(q[0]).map(|w| w.time), Some(ms(90)));

        wake_ups.remove_all_canceled_delayed_tasks_from_front(ms(0), &mut host);
        assert_eq!(wake_ups.next_wake_up().map(|w| w.time), Some(ms(60)));
        assert_eq!(wake_ups.len(), 2);
    }
}
