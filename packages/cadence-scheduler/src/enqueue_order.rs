use std::cell::Cell;
use std::fmt;

/// Global FIFO stamp for a task. Smaller means enqueued earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EnqueueOrder(u64);

impl EnqueueOrder {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EnqueueOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out strictly increasing [`EnqueueOrder`]s, starting at 1.
#[derive(Debug)]
pub struct EnqueueOrderGenerator {
    next: Cell<u64>,
}

impl EnqueueOrderGenerator {
    pub fn new() -> Self {
        Self { next: Cell::new(1) }
    }

    pub fn generate_next(&self) -> EnqueueOrder {
        let order = self.next.get();
        self.next.set(order + 1);
        EnqueueOrder(order)
    }
}

impl Default for EnqueueOrderGenerator {
    fn default() -> Self {
        Self::new()
    }
}
