use crate::firing::FiringId;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Why a timeout was registered. Each reason hands out ids from its own
/// counter, so ids of different reasons may share the same numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reason {
    TimeoutOrInterval,
    IdleCallbackTimeout,
}

/// Throttling class of the script that registered a timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Classification {
    #[default]
    Normal,
    Tracking,
}

/// Handle returned by [`TimeoutManager::set`](crate::TimeoutManager::set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeoutId {
    reason: Reason,
    value: u32,
}

impl TimeoutId {
    /// Rebuilds a handle from the number previously exposed to script.
    pub fn new(reason: Reason, value: u32) -> Self {
        Self { reason, value }
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    pub fn value(&self) -> u32 {
        self.value
    }
}

impl fmt::Display for TimeoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            Reason::TimeoutOrInterval => write!(f, "#{}", self.value),
            Reason::IdleCallbackTimeout => write!(f, "idle#{}", self.value),
        }
    }
}

/// Time left on an entry. Which variant holds is toggled only by
/// freeze and thaw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Absolute deadline on the monotonic clock.
    Active(Instant),
    /// Time left, measured from the freeze instant. `overdue` is how far
    /// past its deadline the entry already was when frozen; at most one of
    /// the two is non-zero.
    Frozen { remaining: Duration, overdue: Duration },
}

impl TimerState {
    /// Frozen state for an entry with `remaining` time left.
    pub fn frozen(remaining: Duration) -> Self {
        TimerState::Frozen {
            remaining,
            overdue: Duration::ZERO,
        }
    }

    /// Frozen state for an entry due at `deadline`, frozen at `at`.
    pub fn frozen_from(deadline: Instant, at: Instant) -> Self {
        TimerState::Frozen {
            remaining: deadline.saturating_duration_since(at),
            overdue: at.saturating_duration_since(deadline),
        }
    }

    /// Absolute deadline relative to `base`: the deadline itself when
    /// active, `base + remaining - overdue` when frozen.
    pub fn deadline_from(&self, base: Instant) -> Instant {
        match *self {
            TimerState::Active(deadline) => deadline,
            TimerState::Frozen { remaining, overdue } => base
                .checked_add(remaining)
                .and_then(|at| at.checked_sub(overdue))
                .unwrap_or(base),
        }
    }
}

/// One scheduled callback.
pub struct TimeoutEntry<H> {
    pub id: TimeoutId,
    /// Registration order, used to break deadline ties.
    pub seq: u64,
    pub when: TimerState,
    pub interval: Duration,
    pub is_interval: bool,
    pub classification: Classification,
    pub running: bool,
    pub cleared: bool,
    /// Pass that currently owns this entry, if any.
    pub firing_id: Option<FiringId>,
    pub nesting_level: u32,
    pub handler: Rc<H>,
}

impl<H> TimeoutEntry<H> {
    /// Deadline, if the entry is not frozen.
    pub fn deadline(&self) -> Option<Instant> {
        match self.when {
            TimerState::Active(deadline) => Some(deadline),
            TimerState::Frozen { .. } => None,
        }
    }

    /// Remaining time, if the entry is frozen.
    pub fn remaining(&self) -> Option<Duration> {
        match self.when {
            TimerState::Active(_) => None,
            TimerState::Frozen { remaining, .. } => Some(remaining),
        }
    }

    /// Ordering key: the deadline, or for a frozen entry the synthetic
    /// deadline `frozen_at + remaining - overdue`.
    pub fn order_key(&self, frozen_at: Option<Instant>) -> Option<Instant> {
        match (self.when, frozen_at) {
            (TimerState::Active(deadline), _) => Some(deadline),
            (state @ TimerState::Frozen { .. }, Some(base)) => Some(state.deadline_from(base)),
            (TimerState::Frozen { .. }, None) => None,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.firing_id.is_some()
    }
}

impl<H> fmt::Debug for TimeoutEntry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutEntry")
            .field("id", &self.id)
            .field("when", &self.when)
            .field("is_interval", &self.is_interval)
            .field("interval", &self.interval)
            .field("classification", &self.classification)
            .field("running", &self.running)
            .field("cleared", &self.cleared)
            .field("firing_id", &self.firing_id)
            .field("nesting_level", &self.nesting_level)
            .finish_non_exhaustive()
    }
}
