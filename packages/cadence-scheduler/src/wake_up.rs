use cadence_time::TimeTicks;
use std::cmp::Ordering;
use std::time::Duration;

/// Timer precision a wake-up needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum WakeUpResolution {
    #[default]
    Low,
    High,
}

/// How much a delayed task's run time may move within its leeway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum DelayPolicy {
    /// May run up to `leeway` after the requested time, never before.
    #[default]
    FlexibleNoSooner,
    /// May run up to `leeway` before the requested time.
    FlexiblePreferEarly,
    /// Runs as close to the requested time as possible.
    Precise,
}

/// A point in time at which a queue wants to be woken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct WakeUp {
    pub time: TimeTicks,
    pub leeway: Duration,
    pub resolution: WakeUpResolution,
    pub delay_policy: DelayPolicy,
}

impl WakeUp {
    pub fn at(time: TimeTicks) -> Self {
        Self {
            time,
            leeway: Duration::ZERO,
            resolution: WakeUpResolution::Low,
            delay_policy: DelayPolicy::FlexibleNoSooner,
        }
    }

    pub fn with_resolution(mut self, resolution: WakeUpResolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_leeway(mut self, leeway: Duration, delay_policy: DelayPolicy) -> Self {
        self.leeway = leeway;
        self.delay_policy = delay_policy;
        self
    }

    /// Earliest instant at which the wake-up may fire.
    pub fn earliest_time(&self) -> TimeTicks {
        match self.delay_policy {
            DelayPolicy::FlexiblePreferEarly => self.time - self.leeway,
            DelayPolicy::FlexibleNoSooner | DelayPolicy::Precise => self.time,
        }
    }

    /// Latest instant at which the wake-up should fire.
    pub fn latest_time(&self) -> TimeTicks {
        match self.delay_policy {
            DelayPolicy::FlexibleNoSooner => self.time + self.leeway,
            DelayPolicy::FlexiblePreferEarly | DelayPolicy::Precise => self.time,
        }
    }

    pub fn is_ready(&self, now: TimeTicks) -> bool {
        self.earliest_time() <= now
    }
}

/// Heap ordering for wake-ups: earliest firing time first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScheduledWakeUp(pub(crate) WakeUp);

impl ScheduledWakeUp {
    fn sort_key(&self) -> (TimeTicks, TimeTicks) {
        (self.0.earliest_time(), self.0.latest_time())
    }
}

impl Ord for ScheduledWakeUp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.0.time.cmp(&other.0.time))
            .then_with(|| self.0.leeway.cmp(&other.0.leeway))
            .then_with(|| rank_resolution(self.0.resolution).cmp(&rank_resolution(other.0.resolution)))
            .then_with(|| rank_policy(self.0.delay_policy).cmp(&rank_policy(other.0.delay_policy)))
    }
}

impl PartialOrd for ScheduledWakeUp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn rank_resolution(resolution: WakeUpResolution) -> u8 {
    match resolution {
        WakeUpResolution::High => 0,
        WakeUpResolution::Low => 1,
    }
}

fn rank_policy(policy: DelayPolicy) -> u8 {
    match policy {
        DelayPolicy::Precise => 0,
        DelayPolicy::FlexiblePreferEarly => 1,
        DelayPolicy::FlexibleNoSooner => 2,
    }
}
