//! File system watcher using notify-rs.
//!
//! Each watched root owns exactly one native handle. Handles never classify
//! anything themselves: their callbacks forward raw notifications over a
//! channel to a single dispatch thread, which stats the affected path,
//! consults the [`PathTracker`] and emits typed [`WatchEvent`]s.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use super::events::{Change, PathKind, WatchEvent, WatchedPath};
use super::scanner::scan_tree;
use super::tracker::{Classification, PathTracker, TrackedStat};
use crate::error::WatcherError;
use crate::Result;

/// Options for a single `watch()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Observe the whole subtree of a directory root.
    pub recursive: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self { recursive: true }
    }
}

/// Watcher counters reported alongside monitor statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherStats {
    /// Roots registered, including ones whose handle failed.
    pub watched_paths: usize,
    /// Paths with a cached baseline.
    pub tracked_files: usize,
    /// Native handles currently installed.
    pub active_watchers: usize,
}

/// Receiving half of the watcher's event stream.
pub type WatchEventReceiver = mpsc::UnboundedReceiver<WatchEvent>;

/// Raw notification forwarded from a native handle callback.
struct RawNotification {
    root: PathBuf,
    handle_id: u64,
    result: notify::Result<notify::Event>,
}

enum DispatchMsg {
    Notification(RawNotification),
    Shutdown,
}

struct WatchedRoot {
    info: WatchedPath,
    handle_id: u64,
    /// `None` once the handle failed and was torn down.
    handle: Option<RecommendedWatcher>,
}

struct WatcherInner {
    roots: HashMap<PathBuf, WatchedRoot>,
    tracker: PathTracker,
    events: mpsc::UnboundedSender<WatchEvent>,
    next_handle_id: u64,
    closed: bool,
}

/// File system watcher.
pub struct FileWatcher {
    inner: Arc<Mutex<WatcherInner>>,
    raw_tx: Sender<DispatchMsg>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl FileWatcher {
    /// Create a new file watcher and the receiver for its events.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatch thread cannot be spawned.
    pub fn new() -> Result<(Self, WatchEventReceiver)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (raw_tx, raw_rx) = crossbeam_channel::unbounded();

        let inner = Arc::new(Mutex::new(WatcherInner {
            roots: HashMap::new(),
            tracker: PathTracker::new(),
            events: event_tx,
            next_handle_id: 0,
            closed: false,
        }));

        let dispatch_inner = Arc::clone(&inner);
        let dispatcher = std::thread::Builder::new()
            .name("fswatch-dispatch".to_string())
            .spawn(move || dispatch_loop(&dispatch_inner, &raw_rx))?;

        Ok((
            Self {
                inner,
                raw_tx,
                dispatcher: Mutex::new(Some(dispatcher)),
            },
            event_rx,
        ))
    }

    /// Start watching `path`.
    ///
    /// Directories get a baseline scan before the native handle is
    /// installed. Watching a root that is already being watched is a no-op.
    /// Returns the resolved absolute path.
    ///
    /// # Errors
    ///
    /// Returns `PathNotFound` if the path does not exist, `WatchFailed` if
    /// the native handle cannot be installed, and `Closed` after `close()`.
    pub fn watch(&self, path: impl AsRef<Path>, options: WatchOptions) -> Result<PathBuf> {
        let requested = path.as_ref();
        let resolved = std::fs::canonicalize(requested).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WatcherError::path_not_found(requested)
            } else {
                WatcherError::watch_failed(requested, e)
            }
        })?;

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(WatcherError::Closed.into());
        }

        if inner
            .roots
            .get(&resolved)
            .is_some_and(|root| root.handle.is_some())
        {
            tracing::debug!(path = %resolved.display(), "Already watching");
            return Ok(resolved);
        }

        let Some(root_stat) = TrackedStat::from_path(&resolved)
            .map_err(|e| WatcherError::watch_failed(&resolved, e))?
        else {
            return Err(WatcherError::path_not_found(&resolved).into());
        };

        let kind = if root_stat.is_directory {
            PathKind::Directory
        } else {
            PathKind::File
        };
        let recursive = kind == PathKind::Directory && options.recursive;

        let baseline = if kind == PathKind::Directory {
            scan_tree(&resolved, recursive).entries
        } else {
            vec![(resolved.clone(), root_stat)]
        };

        inner.next_handle_id += 1;
        let handle_id = inner.next_handle_id;
        let handle = self.install_handle(&resolved, handle_id, recursive)?;

        // the lock is still held, so the dispatch thread cannot classify
        // anything for this root before its baseline is complete
        for (entry, stat) in baseline {
            inner.tracker.record(entry, stat);
        }

        inner.roots.insert(
            resolved.clone(),
            WatchedRoot {
                info: WatchedPath {
                    path: resolved.clone(),
                    kind,
                    recursive,
                },
                handle_id,
                handle: Some(handle),
            },
        );

        tracing::info!(path = %resolved.display(), %kind, recursive, "Watching path");
        inner.emit(WatchEvent::Watching {
            path: resolved.clone(),
            kind,
        });

        Ok(resolved)
    }

    /// Stop watching the root at `path`.
    ///
    /// Returns `false` when the path was not being watched.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after `close()`.
    pub fn unwatch(&self, path: impl AsRef<Path>) -> Result<bool> {
        let resolved = resolve_path(path.as_ref());
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(WatcherError::Closed.into());
        }
        Ok(inner.remove_root(&resolved))
    }

    /// Stop watching every root and forget all tracked state.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after `close()`.
    pub fn unwatch_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(WatcherError::Closed.into());
        }
        inner.remove_all_roots();
        Ok(())
    }

    /// Close every handle and stop the dispatch thread.
    ///
    /// Emits a final [`WatchEvent::Closed`]. Calling this more than once is
    /// harmless.
    pub fn close(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return;
            }
            inner.remove_all_roots();
            inner.closed = true;
            inner.emit(WatchEvent::Closed);
        }

        let _ = self.raw_tx.send(DispatchMsg::Shutdown);
        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Watcher dispatch thread panicked");
            }
        }
        tracing::info!("File watcher closed");
    }

    /// Whether `close()` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Whether changes tagged with `root` and `generation` come from a handle
    /// that is still installed.
    ///
    /// Changes already queued when their root was unwatched, replaced or
    /// failed fail this check.
    #[must_use]
    pub fn is_current(&self, root: &Path, generation: u64) -> bool {
        self.inner.lock().is_current(root, generation)
    }

    /// Currently registered roots.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<WatchedPath> {
        let inner = self.inner.lock();
        let mut paths: Vec<WatchedPath> = inner.roots.values().map(|r| r.info.clone()).collect();
        paths.sort_by(|a, b| a.path.cmp(&b.path));
        paths
    }

    /// Snapshot of the watcher counters.
    #[must_use]
    pub fn stats(&self) -> WatcherStats {
        let inner = self.inner.lock();
        WatcherStats {
            watched_paths: inner.roots.len(),
            tracked_files: inner.tracker.len(),
            active_watchers: inner.roots.values().filter(|r| r.handle.is_some()).count(),
        }
    }

    fn install_handle(
        &self,
        root: &Path,
        handle_id: u64,
        recursive: bool,
    ) -> Result<RecommendedWatcher> {
        let raw_tx = self.raw_tx.clone();
        let callback_root = root.to_path_buf();

        let mut handle = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            let _ = raw_tx.send(DispatchMsg::Notification(RawNotification {
                root: callback_root.clone(),
                handle_id,
                result,
            }));
        })
        .map_err(|e| WatcherError::watch_failed(root, e))?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        handle
            .watch(root, mode)
            .map_err(|e| WatcherError::watch_failed(root, e))?;

        Ok(handle)
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolve `path` to an absolute form without requiring it to exist.
#[must_use]
pub fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn dispatch_loop(inner: &Mutex<WatcherInner>, raw_rx: &Receiver<DispatchMsg>) {
    tracing::debug!("Watcher dispatch thread started");
    for msg in raw_rx {
        match msg {
            DispatchMsg::Notification(raw) => inner.lock().handle_notification(raw),
            DispatchMsg::Shutdown => break,
        }
    }
    tracing::debug!("Watcher dispatch thread stopped");
}

impl WatcherInner {
    fn emit(&self, event: WatchEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Watch event dropped, no receiver");
        }
    }

    fn handle_notification(&mut self, raw: RawNotification) {
        if self.closed {
            return;
        }

        let (recursive, kind) = match self.roots.get(&raw.root) {
            Some(root) if root.handle_id == raw.handle_id && root.handle.is_some() => {
                (root.info.recursive, root.info.kind)
            }
            _ => {
                tracing::trace!(root = %raw.root.display(), "Dropping stale notification");
                return;
            }
        };

        let event = match raw.result {
            Ok(event) => event,
            Err(e) => {
                self.fail_root(&raw.root, &e.to_string());
                return;
            }
        };

        if event.need_rescan() {
            self.rescan_root(&raw.root, raw.handle_id, kind, recursive);
            return;
        }

        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }

        for path in event.paths {
            self.process_path(&raw.root, raw.handle_id, &path, recursive);
        }
    }

    /// Whether `generation` is the live handle of `root`.
    fn is_current(&self, root: &Path, generation: u64) -> bool {
        self.roots
            .get(root)
            .is_some_and(|r| r.handle_id == generation && r.handle.is_some())
    }

    fn emit_change(&self, root: &Path, generation: u64, path: PathBuf, classified: Classification) {
        tracing::debug!(
            path = %path.display(),
            change = %classified.change_type,
            "Classified change"
        );
        self.emit(WatchEvent::Change {
            root: root.to_path_buf(),
            generation,
            change: Change::new(
                classified.change_type,
                path,
                classified.new_stats,
                classified.old_stats,
            ),
        });
    }

    fn process_path(&mut self, root: &Path, generation: u64, path: &Path, recursive: bool) {
        let current = match TrackedStat::from_path(path) {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to stat changed path");
                return;
            }
        };

        let Some(classified) = self.tracker.classify(path, current) else {
            return;
        };

        let is_new_dir = classified.old_stats.is_none()
            && classified.new_stats.is_some_and(|s| s.is_directory);

        self.emit_change(root, generation, path.to_path_buf(), classified);

        if is_new_dir && recursive {
            let outcome = scan_tree(path, true);
            for (entry, stat) in outcome.entries {
                if entry != path {
                    self.tracker.record(entry, stat);
                }
            }
        }
    }

    /// Re-synchronise a root after the OS reported dropped notifications.
    fn rescan_root(&mut self, root: &Path, generation: u64, kind: PathKind, recursive: bool) {
        tracing::warn!(root = %root.display(), "Notification overflow, rescanning root");

        let present = if kind == PathKind::Directory {
            scan_tree(root, recursive).entries
        } else {
            TrackedStat::from_path(root)
                .ok()
                .flatten()
                .map(|stat| vec![(root.to_path_buf(), stat)])
                .unwrap_or_default()
        };

        let mut seen = HashSet::new();
        for (entry, stat) in present {
            seen.insert(entry.clone());
            if let Some(classified) = self.tracker.classify(&entry, Some(stat)) {
                self.emit_change(root, generation, entry, classified);
            }
        }

        let mut vanished: Vec<PathBuf> = self
            .tracker
            .paths_under(root)
            .into_iter()
            .filter(|p| !seen.contains(p))
            .collect();
        vanished.sort();
        for path in vanished {
            // an ancestor's deletion may already have evicted it
            if let Some(classified) = self.tracker.classify(&path, None) {
                self.emit_change(root, generation, path, classified);
            }
        }
    }

    fn fail_root(&mut self, root: &Path, reason: &str) {
        let Some(entry) = self.roots.get_mut(root) else {
            return;
        };
        // dropped here, on the dispatch thread, never inside a native callback
        entry.handle = None;

        let error = WatcherError::watch_failed(root, reason);
        tracing::warn!(root = %root.display(), error = %error, "Watch handle failed");
        self.emit(WatchEvent::Error {
            path: root.to_path_buf(),
            error: error.to_string(),
        });
    }

    fn remove_root(&mut self, root: &Path) -> bool {
        let Some(removed) = self.roots.remove(root) else {
            return false;
        };
        drop(removed.handle);

        // keep baselines still covered by another root
        let orphaned: Vec<PathBuf> = self
            .tracker
            .paths_under(root)
            .into_iter()
            .filter(|p| !self.roots.keys().any(|other| p.starts_with(other)))
            .collect();
        for path in &orphaned {
            self.tracker.forget(path);
        }

        tracing::info!(path = %root.display(), "Stopped watching path");
        self.emit(WatchEvent::Unwatched {
            path: root.to_path_buf(),
        });
        true
    }

    fn remove_all_roots(&mut self) {
        let mut roots: Vec<PathBuf> = self.roots.keys().cloned().collect();
        roots.sort();
        for root in roots {
            self.remove_root(&root);
        }
        self.tracker.clear();
    }
}
