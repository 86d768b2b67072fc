use crate::TimeTicks;
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Source of monotonic time for a scheduler.
///
/// Implementations must never go backwards.
pub trait Clock {
    fn now(&self) -> TimeTicks;
}

/// Reads [`Instant`] relative to the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> TimeTicks {
        TimeTicks::from_duration(self.origin.elapsed())
    }
}

/// A manually driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct TestClock {
    now: Cell<TimeTicks>,
}

impl TestClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(now: TimeTicks) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }

    /// Moves the clock to `now`. Moving backwards is ignored.
    pub fn set(&self, now: TimeTicks) {
        if now > self.now.get() {
            self.now.set(now);
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> TimeTicks {
        self.now.get()
    }
}

/// Reads the clock at most once and caches the answer.
///
/// Scheduling passes that touch many queues share one `LazyNow` so that every
/// decision within the pass sees the same instant.
pub struct LazyNow<'a> {
    clock: Option<&'a dyn Clock>,
    now: Option<TimeTicks>,
}

impl<'a> LazyNow<'a> {
    pub fn new(clock: &'a dyn Clock) -> Self {
        Self {
            clock: Some(clock),
            now: None,
        }
    }

    pub fn from_time(now: TimeTicks) -> Self {
        Self {
            clock: None,
            now: Some(now),
        }
    }

    pub fn now(&mut self) -> TimeTicks {
        if let Some(now) = self.now {
            return now;
        }
        let now = self.clock.map(|c| c.now()).unwrap_or_default();
        self.now = Some(now);
        now
    }

    pub fn has_value(&self) -> bool {
        self.now.is_some()
    }
}
