//! Change-index tracking for blocking-query watch loops.
//!
//! A [`WatchState`] belongs to exactly one loop per watched resource and is
//! passed by `&mut`, so it needs no internal locking.

/// Last observed store index with a one-slot rollback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchState {
    last_index: u64,
    previous_index: u64,
}

impl WatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `new_index`; returns whether it differs from the last one.
    ///
    /// A lower index than before means the store was reset, which counts as
    /// a change.
    pub fn observe(
        &mut self,
        new_index: u64,
    ) -> bool {
        if new_index == self.last_index {
            return false;
        }
        self.previous_index = self.last_index;
        self.last_index = new_index;
        true
    }

    /// Undoes the last observed change so the next wait re-fetches the same
    /// change set.
    pub fn rollback(&mut self) {
        self.last_index = self.previous_index;
    }

    /// Back to index 0, the next wait returns immediately
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    pub fn previous_index(&self) -> u64 {
        self.previous_index
    }
}

/// Outcome of one watch call
#[derive(Debug, Clone, PartialEq)]
pub enum WatchUpdate<T> {
    /// Wait elapsed without the index moving
    Unchanged,
    /// Index moved; carries the decoded payload
    Changed(T),
}

impl<T> WatchUpdate<T> {
    pub fn is_changed(&self) -> bool {
        matches!(self, WatchUpdate::Changed(_))
    }

    pub fn changed(self) -> Option<T> {
        match self {
            WatchUpdate::Changed(value) => Some(value),
            WatchUpdate::Unchanged => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(
        self,
        f: F,
    ) -> WatchUpdate<U> {
        match self {
            WatchUpdate::Changed(value) => WatchUpdate::Changed(f(value)),
            WatchUpdate::Unchanged => WatchUpdate::Unchanged,
        }
    }
}
