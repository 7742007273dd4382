use crate::clamp::{clamped_delay, next_nesting_level};
use crate::config::TimerConfig;
use crate::entry::{Classification, Reason, TimeoutEntry, TimeoutId, TimerState};
use crate::error::{Result, TimerError};
use crate::firing::{FiringId, FiringPasses};
use crate::freeze;
use crate::platform::{CallbackExecutor, MonotonicClock, PlatformTimer};
use crate::queue::PendingSet;
use crate::stats::TimerStats;

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

/// How a timeout should behave once registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerOptions {
    pub repeating: bool,
    pub classification: Classification,
    pub reason: Reason,
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            repeating: false,
            classification: Classification::Normal,
            reason: Reason::TimeoutOrInterval,
        }
    }
}

impl TimerOptions {
    pub fn timeout() -> Self {
        Self::default()
    }

    pub fn interval() -> Self {
        Self {
            repeating: true,
            ..Self::default()
        }
    }

    pub fn tracking(mut self) -> Self {
        self.classification = Classification::Tracking;
        self
    }

    pub fn with_reason(mut self, reason: Reason) -> Self {
        self.reason = reason;
        self
    }
}

struct State<H> {
    pending: PendingSet<H>,
    passes: FiringPasses,
    next_timeout_id: u32,
    next_idle_id: u32,
    next_seq: u64,
    /// Nesting level of the callback currently on the stack.
    nesting: Option<u32>,
    /// Deadline the platform timer is currently armed for.
    armed_for: Option<Instant>,
    stats: TimerStats,
}

impl<H> State<H> {
    fn new() -> Self {
        Self {
            pending: PendingSet::new(),
            passes: FiringPasses::new(),
            next_timeout_id: 0,
            next_idle_id: 0,
            next_seq: 0,
            nesting: None,
            armed_for: None,
            stats: TimerStats::default(),
        }
    }

    fn mint_id(&mut self, reason: Reason) -> Option<TimeoutId> {
        let counter = match reason {
            Reason::TimeoutOrInterval => &mut self.next_timeout_id,
            Reason::IdleCallbackTimeout => &mut self.next_idle_id,
        };
        *counter = counter.checked_add(1)?;
        Some(TimeoutId::new(reason, *counter))
    }
}

/// Timeout scheduler for one execution context.
///
/// Single-threaded and re-entrant: callbacks run with no internal borrow
/// held, so they may call [`set`](Self::set), [`clear`](Self::clear) or
/// even [`run_expired`](Self::run_expired) on the same manager. The platform
/// timer only holds a `Weak` back-reference, so dropping the last `Rc`
/// tears down every pending entry.
pub struct TimeoutManager<H> {
    config: TimerConfig,
    clock: Box<dyn MonotonicClock>,
    timer: Box<dyn PlatformTimer>,
    executor: Box<dyn CallbackExecutor<H>>,
    state: RefCell<State<H>>,
    this: Weak<Self>,
}

impl<H: 'static> TimeoutManager<H> {
    pub fn new(
        config: TimerConfig,
        clock: impl MonotonicClock + 'static,
        timer: impl PlatformTimer + 'static,
        executor: impl CallbackExecutor<H> + 'static,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            config,
            clock: Box::new(clock),
            timer: Box::new(timer),
            executor: Box::new(executor),
            state: RefCell::new(State::new()),
            this: this.clone(),
        })
    }

    /// Registers `handler` to run after `delay`.
    pub fn set(&self, delay: Duration, options: TimerOptions, handler: H) -> Result<TimeoutId> {
        let now = self.clock.now();
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        if let Some(limit) = self.config.max_pending {
            if state.pending.len() >= limit {
                state.stats.rejected_count += 1;
                tracing::warn!(limit, "rejecting timeout: pending limit reached");
                return Err(TimerError::ResourceExhausted { limit });
            }
        }

        let Some(id) = state.mint_id(options.reason) else {
            state.stats.rejected_count += 1;
            tracing::warn!(reason = ?options.reason, "rejecting timeout: id space exhausted");
            return Err(TimerError::ResourceExhausted {
                limit: u32::MAX as usize,
            });
        };

        let nesting_level = next_nesting_level(&self.config, state.nesting);
        let effective = clamped_delay(
            &self.config,
            delay,
            nesting_level,
            options.classification,
            options.repeating,
        );
        let when = match state.pending.frozen_at() {
            Some(_) => TimerState::frozen(effective),
            None => TimerState::Active(now.checked_add(effective).unwrap_or(now)),
        };

        let seq = state.next_seq;
        state.next_seq += 1;
        state.stats.set_count += 1;

        state.pending.insert(TimeoutEntry {
            id,
            seq,
            when,
            interval: delay,
            is_interval: options.repeating,
            classification: options.classification,
            running: false,
            cleared: false,
            firing_id: None,
            nesting_level,
            handler: Rc::new(handler),
        });

        tracing::debug!(
            %id,
            ?effective,
            repeating = options.repeating,
            nesting_level,
            "timeout set"
        );

        drop(guard);
        self.rearm();
        Ok(id)
    }

    /// Cancels `id`. Unknown or already-retired ids are ignored. A callback
    /// that is already running finishes, but never fires again.
    pub fn clear(&self, id: TimeoutId) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;

        let Some(entry) = state.pending.get_mut(id) else {
            tracing::trace!(%id, "clear: no such timeout");
            return;
        };
        if entry.cleared {
            return;
        }

        state.stats.cleared_count += 1;
        if entry.running || entry.is_claimed() {
            // The owning pass retires it.
            entry.cleared = true;
            tracing::debug!(%id, "timeout flagged as cleared");
        } else {
            state.pending.remove(id);
            tracing::debug!(%id, "timeout cleared");
        }

        drop(guard);
        self.rearm();
    }

    /// Retires every entry, as when the owning context goes away.
    pub fn clear_all(&self) {
        let dropped = {
            let mut state = self.state.borrow_mut();
            let dropped = state.pending.drain();
            state.stats.cleared_count += dropped as u64;
            state.armed_for = None;
            dropped
        };
        self.timer.cancel();
        tracing::debug!(dropped, "all timeouts cleared");
    }

    /// Runs one firing pass for everything due at or before `at`.
    ///
    /// Safe to call from inside a callback. A nested pass leaves alone the
    /// entries an outer pass has already claimed; the outer pass fires them
    /// when it resumes.
    pub fn run_expired(&self, at: Instant) {
        let (pass, claimed) = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;

            if state.pending.frozen_at().is_some() {
                tracing::trace!("run_expired ignored while frozen");
                return;
            }

            let pass = state.passes.begin();
            state.stats.pass_count += 1;

            // Claimed entries leave the index, so nested passes cannot see them.
            let claimed = state.pending.pop_due_by(at);
            for id in &claimed {
                if let Some(entry) = state.pending.get_mut(*id) {
                    entry.firing_id = Some(pass);
                }
            }
            (pass, claimed)
        };

        tracing::debug!(%pass, due = claimed.len(), "firing pass started");

        for id in claimed {
            self.fire_one(id, pass, at);
        }

        self.state.borrow_mut().passes.end(pass);
        tracing::debug!(%pass, "firing pass finished");
        self.rearm();
    }

    pub fn run_expired_now(&self) {
        self.run_expired(self.clock.now());
    }

    /// Suspends all pending timeouts, keeping only their remaining time.
    pub fn freeze(&self, at: Instant) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            if state.passes.any_active() {
                return Err(TimerError::InvalidState {
                    operation: "freeze",
                });
            }
            if !freeze::freeze(&mut state.pending, at) {
                return Ok(());
            }
            state.armed_for = None;
            tracing::debug!(pending = state.pending.len(), "timeouts frozen");
        }
        self.timer.cancel();
        Ok(())
    }

    /// Resumes pending timeouts relative to `at`.
    pub fn thaw(&self, at: Instant) {
        {
            let mut state = self.state.borrow_mut();
            if !freeze::thaw(&mut state.pending, at) {
                return;
            }
            tracing::debug!(pending = state.pending.len(), "timeouts thawed");
        }
        self.rearm();
    }

    pub fn len(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().pending.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.state.borrow().pending.frozen_at().is_some()
    }

    pub fn is_firing(&self) -> bool {
        self.state.borrow().passes.any_active()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.borrow().pending.peek_next_deadline()
    }

    /// Nesting level of the callback currently running, if any.
    pub fn nesting_level(&self) -> Option<u32> {
        self.state.borrow().nesting
    }

    pub fn stats(&self) -> TimerStats {
        self.state.borrow().stats
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    fn fire_one(&self, id: TimeoutId, pass: FiringId, pass_time: Instant) {
        let (handler, previous_nesting) = {
            let mut guard = self.state.borrow_mut();
            let state = &mut *guard;

            let Some(entry) = state.pending.get_mut(id) else {
                return;
            };
            if entry.cleared {
                state.pending.remove(id);
                tracing::trace!(%id, %pass, "skipping cleared timeout");
                return;
            }

            entry.running = true;
            let handler = Rc::clone(&entry.handler);
            let previous = state.nesting.replace(entry.nesting_level);
            (handler, previous)
        };

        tracing::trace!(%id, %pass, "invoking timeout");
        let outcome = self.executor.invoke(&handler);

        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.nesting = previous_nesting;
        state.stats.fired_count += 1;

        if let Err(err) = outcome {
            state.stats.failed_count += 1;
            let failure = TimerError::CallbackFailure {
                id,
                reason: err.to_string(),
            };
            tracing::warn!(%pass, "{failure}");
        }

        let frozen_at = state.pending.frozen_at();
        let Some(entry) = state.pending.get_mut(id) else {
            // Dropped by clear_all while running.
            return;
        };
        entry.running = false;

        if entry.cleared || !entry.is_interval {
            state.pending.remove(id);
            return;
        }

        let period = clamped_delay(
            &self.config,
            entry.interval,
            entry.nesting_level,
            entry.classification,
            true,
        );
        let base = self.clock.now().max(pass_time);
        entry.when = match frozen_at {
            Some(_) => TimerState::frozen(period),
            None => TimerState::Active(base.checked_add(period).unwrap_or(base)),
        };
        entry.firing_id = None;
        state.pending.relink(id);
        tracing::trace!(%id, ?period, "interval rescheduled");
    }

    /// Points the platform timer at the soonest deadline, or releases it.
    fn rearm(&self) {
        let next = {
            let mut state = self.state.borrow_mut();
            let next = state.pending.peek_next_deadline();
            if next == state.armed_for {
                return;
            }
            state.armed_for = next;
            next
        };

        match next {
            Some(deadline) => {
                let delay = deadline.saturating_duration_since(self.clock.now());
                let this = self.this.clone();
                self.timer.arm(
                    delay,
                    Box::new(move || {
                        if let Some(manager) = this.upgrade() {
                            manager.on_platform_timer(deadline);
                        }
                    }),
                );
                tracing::trace!(?delay, "platform timer armed");
            }
            None => {
                self.timer.cancel();
                tracing::trace!("platform timer released");
            }
        }
    }

    /// A platform timer may wake slightly early; the entry it was armed for
    /// still fires in this pass.
    fn on_platform_timer(&self, armed_deadline: Instant) {
        {
            let mut state = self.state.borrow_mut();
            if state.armed_for == Some(armed_deadline) {
                state.armed_for = None;
            }
        }
        let at = self.clock.now().max(armed_deadline);
        self.run_expired(at);
    }
}

impl<H> Drop for TimeoutManager<H> {
    fn drop(&mut self) {
        self.timer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CallbackError;
    use crate::platform::{ManualClock, ManualTimer};
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<u32>>>;

    fn manager(config: TimerConfig) -> (Rc<TimeoutManager<u32>>, Rc<ManualClock>, Rc<ManualTimer>, Log) {
        let clock = Rc::new(ManualClock::new());
        let timer = Rc::new(ManualTimer::new());
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let manager = TimeoutManager::new(
            config,
            clock.clone(),
            timer.clone(),
            move |tag: &u32| -> std::result::Result<(), CallbackError> {
                sink.borrow_mut().push(*tag);
                Ok(())
            },
        );
        (manager, clock, timer, log)
    }

    #[test]
    fn set_arms_platform_timer_for_soonest() {
        let (manager, _clock, timer, _log) = manager(TimerConfig::default());
        manager.set(Duration::from_millis(50), TimerOptions::timeout(), 1).unwrap();
        assert_eq!(timer.armed_delay(), Some(Duration::from_millis(50)));

        manager.set(Duration::from_millis(10), TimerOptions::timeout(), 2).unwrap();
        assert_eq!(timer.armed_delay(), Some(Duration::from_millis(10)));

        // A later entry does not touch the arm.
        manager.set(Duration::from_millis(90), TimerOptions::timeout(), 3).unwrap();
        assert_eq!(timer.arm_count(), 2);
    }

    #[test]
    fn platform_fire_runs_due_entries_and_rearms() {
        let (manager, clock, timer, log) = manager(TimerConfig::default());
        manager.set(Duration::from_millis(10), TimerOptions::timeout(), 1).unwrap();
        manager.set(Duration::from_millis(30), TimerOptions::timeout(), 2).unwrap();

        clock.advance(Duration::from_millis(10));
        assert!(timer.fire());
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(timer.armed_delay(), Some(Duration::from_millis(20)));

        clock.advance(Duration::from_millis(20));
        assert!(timer.fire());
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert!(!timer.is_armed());
        assert!(manager.is_empty());
    }

    #[test]
    fn early_platform_wakeup_still_fires_target() {
        let (manager, clock, timer, log) = manager(TimerConfig::default());
        manager.set(Duration::from_millis(10), TimerOptions::timeout(), 1).unwrap();

        clock.advance(Duration::from_millis(9));
        assert!(timer.fire());
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn pending_cap_rejects_new_entries() {
        let config = TimerConfig {
            max_pending: Some(2),
            ..TimerConfig::default()
        };
        let (manager, _clock, _timer, _log) = manager(config);
        manager.set(Duration::ZERO, TimerOptions::timeout(), 1).unwrap();
        manager.set(Duration::ZERO, TimerOptions::timeout(), 2).unwrap();

        let err = manager.set(Duration::ZERO, TimerOptions::timeout(), 3).unwrap_err();
        assert_eq!(err, TimerError::ResourceExhausted { limit: 2 });
        assert_eq!(manager.stats().rejected_count, 1);
    }

    #[test]
    fn reasons_have_independent_ids() {
        let (manager, _clock, _timer, _log) = manager(TimerConfig::default());
        let a = manager.set(Duration::ZERO, TimerOptions::timeout(), 1).unwrap();
        let b = manager
            .set(
                Duration::ZERO,
                TimerOptions::timeout().with_reason(Reason::IdleCallbackTimeout),
                2,
            )
            .unwrap();
        assert_eq!(a.value(), 1);
        assert_eq!(b.value(), 1);

        manager.clear(TimeoutId::new(Reason::IdleCallbackTimeout, 1));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn clear_all_releases_timer() {
        let (manager, clock, timer, log) = manager(TimerConfig::default());
        manager.set(Duration::from_millis(5), TimerOptions::interval(), 1).unwrap();
        manager.set(Duration::from_millis(5), TimerOptions::timeout(), 2).unwrap();

        manager.clear_all();
        assert!(manager.is_empty());
        assert!(!timer.is_armed());

        manager.run_expired(clock.now() + Duration::from_secs(1));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn dropping_manager_cancels_timer() {
        let (manager, _clock, timer, _log) = manager(TimerConfig::default());
        manager.set(Duration::from_millis(5), TimerOptions::timeout(), 1).unwrap();
        drop(manager);
        assert!(!timer.is_armed());
    }
}
