use cadence_scheduler::{LocalScheduler, QueuePriority};
use cadence_time::TestClock;
use std::cell::RefCell;
use std::rc::Rc;

fn new_scheduler() -> Rc<LocalScheduler> {
    Rc::new(LocalScheduler::new(Rc::new(TestClock::new())))
}

#[test]
fn test_execution_order() {
    let scheduler = new_scheduler();
    let log = Rc::new(RefCell::new(Vec::new()));

    let default = scheduler.create_task_queue("default");
    let background = scheduler.create_task_queue("background");
    let control = scheduler.create_task_queue("control");
    scheduler
        .set_queue_priority(background, QueuePriority::Low)
        .unwrap();
    scheduler
        .set_queue_priority(control, QueuePriority::Control)
        .unwrap();

    // Posted lowest-urgency-last so post order alone would not explain the result.
    for (queue, label) in [(default, "default"), (background, "background"), (control, "control")] {
        let log = log.clone();
        scheduler
            .post_task(queue, move || log.borrow_mut().push(label))
            .unwrap();
    }

    assert_eq!(scheduler.run_until_idle(), 3);
    assert_eq!(*log.borrow(), vec!["control", "default", "background"]);
}

#[test]
fn test_control_burst_ages_waiting_priorities() {
    let scheduler = new_scheduler();
    let log = Rc::new(RefCell::new(String::new()));

    let control = scheduler.create_task_queue("control");
    let highest = scheduler.create_task_queue("highest");
    let normal = scheduler.create_task_queue("normal");
    scheduler
        .set_queue_priority(control, QueuePriority::Control)
        .unwrap();
    scheduler
        .set_queue_priority(highest, QueuePriority::Highest)
        .unwrap();

    for (queue, label, count) in [(control, 'C', 20), (highest, 'H', 5), (normal, 'N', 1)] {
        for _ in 0..count {
            let log = log.clone();
            scheduler
                .post_task(queue, move || log.borrow_mut().push(label))
                .unwrap();
        }
    }

    scheduler.run_until_idle();
    assert_eq!(*log.borrow(), format!("{}HNHHHH", "C".repeat(20)));
}

#[test]
fn test_highest_priority_wins_over_enqueue_order() {
    let scheduler = new_scheduler();
    let log = Rc::new(RefCell::new(Vec::new()));

    let q1 = scheduler.create_task_queue("q1");
    let q2 = scheduler.create_task_queue("q2");
    let q3 = scheduler.create_task_queue("q3");
    scheduler.set_queue_priority(q1, QueuePriority::Highest).unwrap();
    scheduler.set_queue_priority(q2, QueuePriority::Normal).unwrap();
    scheduler
        .set_queue_priority(q3, QueuePriority::BestEffort)
        .unwrap();

    for (queue, label) in [(q3, "q3"), (q2, "q2"), (q1, "q1")] {
        let log = log.clone();
        scheduler
            .post_task(queue, move || log.borrow_mut().push(label))
            .unwrap();
    }

    assert!(scheduler.run_next_task());
    assert_eq!(*log.borrow(), vec!["q1"]);

    scheduler.run_until_idle();
    assert_eq!(*log.borrow(), vec!["q1", "q2", "q3"]);
}

#[test]
fn test_fifo_within_priority() {
    let scheduler = new_scheduler();
    let log = Rc::new(RefCell::new(Vec::new()));

    let a = scheduler.create_task_queue("a");
    let b = scheduler.create_task_queue("b");

    for (queue, label) in [(a, "a1"), (b, "b1"), (a, "a2"), (b, "b2"), (b, "b3")] {
        let log = log.clone();
        scheduler
            .post_task(queue, move || log.borrow_mut().push(label))
            .unwrap();
    }

    scheduler.run_until_idle();
    assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2", "b3"]);
}

#[test]
fn test_task_chaining() {
    // Tasks posted by running tasks land behind work already queued.
    let scheduler = new_scheduler();
    let log = Rc::new(RefCell::new(Vec::new()));
    let queue = scheduler.create_task_queue("main");

    {
        let log = log.clone();
        let sch = scheduler.clone();
        scheduler
            .post_task(queue, move || {
                log.borrow_mut().push("task1");

                // Schedule another
                let log = log.clone();
                sch.post_task(queue, move || log.borrow_mut().push("task3"))
                    .unwrap();
            })
            .unwrap();
    }
    {
        let log = log.clone();
        scheduler
            .post_task(queue, move || log.borrow_mut().push("task2"))
            .unwrap();
    }

    assert_eq!(scheduler.run_until_idle(), 3);
    assert_eq!(*log.borrow(), vec!["task1", "task2", "task3"]);
}

#[test]
fn test_priority_change_applies_to_queued_tasks() {
    let scheduler = new_scheduler();
    let log = Rc::new(RefCell::new(Vec::new()));

    let first = scheduler.create_task_queue("first");
    let second = scheduler.create_task_queue("second");
    for (queue, label) in [(first, "first"), (second, "second")] {
        let log = log.clone();
        scheduler
            .post_task(queue, move || log.borrow_mut().push(label))
            .unwrap();
    }

    scheduler.set_queue_priority(second, QueuePriority::High).unwrap();
    assert_eq!(scheduler.queue_priority(second).unwrap(), QueuePriority::High);

    scheduler.run_until_idle();
    assert_eq!(*log.borrow(), vec!["second", "first"]);
}
