//! Per-path debouncing.
//!
//! Each path has at most one pending slot. Scheduling a change for a path
//! that already has one aborts the old timer and replaces both the timer and
//! the carried change, so a burst collapses to whatever is current when the
//! last timer expires.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::watcher::Change;

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

struct PendingChange {
    seq: u64,
    change: Change,
    timer: JoinHandle<()>,
}

/// Single-slot, cancel-and-replace timer registry keyed by path.
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, PendingChange>,
    next_seq: u64,
}

impl Debouncer {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Arm (or re-arm) the slot for `change.path`.
    ///
    /// `arm` receives the path, the slot's sequence number and the window,
    /// and must start a timer that later calls [`Debouncer::take_if_current`]
    /// with the same path and sequence number.
    pub fn schedule<F>(&mut self, change: Change, arm: F)
    where
        F: FnOnce(PathBuf, u64, Duration) -> JoinHandle<()>,
    {
        self.next_seq += 1;
        let seq = self.next_seq;
        let path = change.path.clone();

        if let Some(previous) = self.pending.remove(&path) {
            previous.timer.abort();
            tracing::trace!(path = %path.display(), "Superseded pending change");
        }

        let timer = arm(path.clone(), seq, self.window);
        self.pending.insert(path, PendingChange { seq, change, timer });
    }

    /// Claim the carried change if `seq` still owns the slot.
    ///
    /// A timer that lost a race with a newer `schedule` gets `None`.
    pub fn take_if_current(&mut self, path: &Path, seq: u64) -> Option<Change> {
        match self.pending.get(path) {
            Some(pending) if pending.seq == seq => {
                self.pending.remove(path).map(|p| p.change)
            }
            _ => None,
        }
    }

    /// Cancel every slot at or beneath `root`. Returns how many were cancelled.
    pub fn cancel_under(&mut self, root: &Path) -> usize {
        let doomed: Vec<PathBuf> = self
            .pending
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect();
        for path in &doomed {
            if let Some(pending) = self.pending.remove(path) {
                pending.timer.abort();
            }
        }
        doomed.len()
    }

    /// Cancel every slot. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, pending) in self.pending.drain() {
            pending.timer.abort();
        }
        count
    }

    /// Number of armed slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
