//! Guard set that blocks resurrection of habits mid-deletion.

use std::collections::HashSet;
use std::sync::Mutex;

/// Habit ids with a deletion in flight. Consulted by the pull merge and
/// by habit creation during merge, so a deletion on one path cannot be
/// undone by a concurrent pull on another.
///
/// Discipline: `mark` before touching either side, do the remote/local
/// work, `clear` after both sides are confirmed. The lock is only held
/// for the set/check/clear itself, never across an await.
#[derive(Default)]
pub struct RecentlyDeletedGuard {
    ids: Mutex<HashSet<String>>,
}

impl RecentlyDeletedGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a deletion in flight. Returns false when already marked.
    pub fn mark(&self, habit_id: &str) -> bool {
        self.with_ids(|ids| ids.insert(habit_id.to_string()))
    }

    /// Clear the mark once both sides of the deletion are confirmed.
    pub fn clear(&self, habit_id: &str) {
        self.with_ids(|ids| ids.remove(habit_id));
    }

    pub fn contains(&self, habit_id: &str) -> bool {
        self.with_ids(|ids| ids.contains(habit_id))
    }

    /// Drop every mark. Test hook for reuse between cases.
    pub fn reset(&self) {
        self.with_ids(HashSet::clear);
    }

    fn with_ids<R>(&self, f: impl FnOnce(&mut HashSet<String>) -> R) -> R {
        let mut ids = self
            .ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut ids)
    }
}
