//! Bounded, newest-first change history.

use std::collections::VecDeque;
use std::path::Path;

use crate::watcher::{Change, ChangeType};

/// Default number of retained changes.
pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Fixed-capacity ring of accepted changes, newest first.
#[derive(Debug)]
pub struct HistoryRing {
    entries: VecDeque<Change>,
    capacity: usize,
}

impl HistoryRing {
    /// Create an empty ring holding at most `capacity` changes.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_MAX_HISTORY)),
            capacity,
        }
    }

    /// Insert a change at the front, evicting the oldest once full.
    pub fn push(&mut self, change: Change) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_back();
        }
        self.entries.push_front(change);
    }

    /// Up to `limit` most recent changes.
    #[must_use]
    pub fn recent(&self, limit: Option<usize>) -> Vec<Change> {
        self.select(limit, |_| true)
    }

    /// Up to `limit` most recent changes of one type.
    #[must_use]
    pub fn by_type(&self, change_type: ChangeType, limit: Option<usize>) -> Vec<Change> {
        self.select(limit, |c| c.change_type == change_type)
    }

    /// Up to `limit` most recent changes to exactly `path`.
    #[must_use]
    pub fn for_path(&self, path: &Path, limit: Option<usize>) -> Vec<Change> {
        self.select(limit, |c| c.path == path)
    }

    fn select(&self, limit: Option<usize>, keep: impl Fn(&Change) -> bool) -> Vec<Change> {
        self.entries
            .iter()
            .filter(|c| keep(c))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}
