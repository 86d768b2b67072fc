use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;

/// A point on a monotonic timeline, measured from an arbitrary origin.
///
/// Only differences and ordering are meaningful; the origin is whatever the
/// producing [`Clock`](crate::Clock) chose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeTicks {
    since_origin: Duration,
}

impl TimeTicks {
    /// The origin itself.
    pub const ZERO: TimeTicks = TimeTicks {
        since_origin: Duration::ZERO,
    };

    /// Latest representable instant. Useful as an "never" sentinel.
    pub const MAX: TimeTicks = TimeTicks {
        since_origin: Duration::MAX,
    };

    pub const fn from_duration(since_origin: Duration) -> Self {
        Self { since_origin }
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self::from_duration(Duration::from_millis(millis))
    }

    pub const fn from_micros(micros: u64) -> Self {
        Self::from_duration(Duration::from_micros(micros))
    }

    pub const fn since_origin(self) -> Duration {
        self.since_origin
    }

    pub fn is_zero(self) -> bool {
        self.since_origin.is_zero()
    }

    pub fn saturating_add(self, delta: Duration) -> Self {
        Self::from_duration(self.since_origin.saturating_add(delta))
    }

    pub fn saturating_sub(self, delta: Duration) -> Self {
        Self::from_duration(self.since_origin.saturating_sub(delta))
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: TimeTicks) -> Duration {
        self.since_origin.saturating_sub(earlier.since_origin)
    }
}

impl Add<Duration> for TimeTicks {
    type Output = TimeTicks;

    fn add(self, rhs: Duration) -> TimeTicks {
        self.saturating_add(rhs)
    }
}

impl AddAssign<Duration> for TimeTicks {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub<Duration> for TimeTicks {
    type Output = TimeTicks;

    fn sub(self, rhs: Duration) -> TimeTicks {
        self.saturating_sub(rhs)
    }
}

impl Sub<TimeTicks> for TimeTicks {
    type Output = Duration;

    fn sub(self, rhs: TimeTicks) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Display for TimeTicks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.since_origin)
    }
}
