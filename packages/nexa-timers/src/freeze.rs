use crate::entry::TimerState;
use crate::queue::PendingSet;
use std::time::Instant;

/// Converts every deadline into time remaining from `at`.
///
/// Returns `false` when the set was already frozen. Overdue entries keep
/// how late they already were, so they stay ahead of later deadlines and
/// are due as soon as the set is thawed.
pub fn freeze<H>(set: &mut PendingSet<H>, at: Instant) -> bool {
    if set.frozen_at().is_some() {
        return false;
    }

    for entry in set.entries_mut() {
        if let TimerState::Active(deadline) = entry.when {
            entry.when = TimerState::frozen_from(deadline, at);
        }
    }
    set.set_frozen_at(Some(at));
    set.reindex();
    true
}

/// Rebuilds absolute deadlines from `at`. Returns `false` when the set was
/// not frozen.
pub fn thaw<H>(set: &mut PendingSet<H>, at: Instant) -> bool {
    if set.frozen_at().is_none() {
        return false;
    }

    for entry in set.entries_mut() {
        if let TimerState::Frozen { .. } = entry.when {
            entry.when = TimerState::Active(entry.when.deadline_from(at));
        }
    }
    set.set_frozen_at(None);
    set.reindex();
    true
}
