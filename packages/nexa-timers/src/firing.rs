use smallvec::SmallVec;
use std::fmt;

/// Identifies one firing pass. Strictly increasing per manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiringId(u64);

impl fmt::Display for FiringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass-{}", self.0)
    }
}

/// Bookkeeping for nested firing passes.
///
/// A callback may pump the scheduler synchronously, so passes nest like a
/// call stack. Claiming an entry tags it with the pass id and takes it out
/// of the due-time index, so an inner pass never sees entries an outer pass
/// still owns. The tag stays until the entry is retired or rescheduled.
#[derive(Debug, Default)]
pub struct FiringPasses {
    next: u64,
    active: SmallVec<[FiringId; 4]>,
}

impl FiringPasses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a fresh id and marks it active.
    pub fn begin(&mut self) -> FiringId {
        self.next += 1;
        let id = FiringId(self.next);
        self.active.push(id);
        id
    }

    /// Ends `id`. Passes end in LIFO order; an out-of-order end still only
    /// removes the given id.
    pub fn end(&mut self, id: FiringId) {
        if self.active.last() == Some(&id) {
            self.active.pop();
        } else if let Some(pos) = self.active.iter().position(|active| *active == id) {
            tracing::warn!(%id, "firing pass ended out of order");
            self.active.remove(pos);
        }
    }

    pub fn is_active(&self, id: FiringId) -> bool {
        self.active.contains(&id)
    }

    pub fn any_active(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.active.len()
    }
}
