use crate::entry::{TimeoutEntry, TimeoutId};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::time::Instant;

/// Arena of live entries plus a due-time index over the pending ones.
///
/// Entries claimed by a firing pass stay in the arena (so `clear` can still
/// flag them) but leave the index until they are rescheduled or retired.
/// Index keys are `(deadline, seq)`, so equal deadlines pop in registration
/// order. While frozen the key is the synthetic deadline `frozen_at + remaining`.
pub struct PendingSet<H> {
    entries: FxHashMap<TimeoutId, TimeoutEntry<H>>,
    order: BTreeMap<(Instant, u64), TimeoutId>,
    frozen_at: Option<Instant>,
}

impl<H> Default for PendingSet<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> PendingSet<H> {
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
            order: BTreeMap::new(),
            frozen_at: None,
        }
    }

    pub fn insert(&mut self, entry: TimeoutEntry<H>) {
        let id = entry.id;
        if let Some(key) = entry.order_key(self.frozen_at) {
            self.order.insert((key, entry.seq), id);
        } else {
            tracing::warn!(%id, "inserted entry has no usable ordering key");
        }
        self.entries.insert(id, entry);
    }

    /// Drops an entry from both the arena and the index.
    pub fn remove(&mut self, id: TimeoutId) -> Option<TimeoutEntry<H>> {
        let entry = self.entries.remove(&id)?;
        self.unlink_entry(&entry);
        Some(entry)
    }

    pub fn remove_by_id(&mut self, id: TimeoutId) -> bool {
        self.remove(id).is_some()
    }

    /// Puts an arena entry back into the index after its deadline changed.
    pub fn relink(&mut self, id: TimeoutId) {
        let frozen_at = self.frozen_at;
        if let Some(entry) = self.entries.get(&id) {
            if let Some(key) = entry.order_key(frozen_at) {
                self.order.insert((key, entry.seq), id);
            }
        }
    }

    /// Pops the ids of every indexed entry due at or before `now`, in firing
    /// order. Popped entries stay in the arena but are never yielded again
    /// until relinked. Never yields anything while frozen.
    pub fn pop_due_by(&mut self, now: Instant) -> Vec<TimeoutId> {
        if self.frozen_at.is_some() {
            return Vec::new();
        }

        let due: Vec<(Instant, u64)> = self
            .order
            .range(..=(now, u64::MAX))
            .map(|(key, _)| *key)
            .collect();

        due.into_iter()
            .filter_map(|key| self.order.remove(&key))
            .inspect(|id| {
                debug_assert!(self.entries.get(id).is_some_and(|entry| !entry.running));
            })
            .collect()
    }

    pub fn peek_next_deadline(&self) -> Option<Instant> {
        if self.frozen_at.is_some() {
            return None;
        }
        self.order.keys().next().map(|(deadline, _)| *deadline)
    }

    pub fn get(&self, id: TimeoutId) -> Option<&TimeoutEntry<H>> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: TimeoutId) -> Option<&mut TimeoutEntry<H>> {
        self.entries.get_mut(&id)
    }

    /// Whether the entry is waiting in the index (not claimed by a pass).
    pub fn is_indexed(&self, id: TimeoutId) -> bool {
        self.entries
            .get(&id)
            .and_then(|entry| {
                entry
                    .order_key(self.frozen_at)
                    .map(|key| self.order.get(&(key, entry.seq)) == Some(&id))
            })
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn frozen_at(&self) -> Option<Instant> {
        self.frozen_at
    }

    pub(crate) fn set_frozen_at(&mut self, frozen_at: Option<Instant>) {
        self.frozen_at = frozen_at;
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut TimeoutEntry<H>> {
        self.entries.values_mut()
    }

    /// Recomputes index keys after a bulk change of entry state.
    /// Only entries that were indexed before stay indexed.
    pub(crate) fn reindex(&mut self) {
        let indexed: Vec<TimeoutId> = self.order.values().copied().collect();
        self.order.clear();
        for id in indexed {
            self.relink(id);
        }
    }

    /// Retires every entry at once, returning how many were dropped.
    pub fn drain(&mut self) -> usize {
        let count = self.entries.len();
        self.order.clear();
        self.entries.clear();
        count
    }

    fn unlink_entry(&mut self, entry: &TimeoutEntry<H>) {
        if let Some(key) = entry.order_key(self.frozen_at) {
            if self.order.get(&(key, entry.seq)) == Some(&entry.id) {
                self.order.remove(&(key, entry.seq));
            }
        }
    }
}
