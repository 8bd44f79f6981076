//! The monitor: filtering, debouncing, history and statistics on top of the
//! file watcher, republished as a single event stream.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::debounce::{Debouncer, DEFAULT_DEBOUNCE};
use super::events::{MonitorEvent, Subscription, Topic};
use super::filter::{ChangeFilter, FilterOptions};
use super::history::{HistoryRing, DEFAULT_MAX_HISTORY};
use super::stats::{MonitorStats, StatsSnapshot};
use crate::watcher::{
    resolve_path, Change, ChangeType, FileWatcher, WatchEvent, WatchEventReceiver, WatchOptions,
    WatchedPath,
};
use crate::{Error, Result};

/// Default capacity of the broadcast channel feeding subscribers.
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Quiet period a path must observe before its change is emitted.
    pub debounce: Duration,
    /// Number of changes retained in history.
    pub max_history: usize,
    /// Events buffered per subscriber before it starts lagging.
    pub event_capacity: usize,
    /// Default recursion for `watch()`.
    pub recursive: bool,
    pub filter: FilterOptions,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            max_history: DEFAULT_MAX_HISTORY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            recursive: true,
            filter: FilterOptions::default(),
        }
    }
}

impl MonitorConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.max_history == 0 {
            return Err(Error::config("max_history cannot be 0"));
        }
        if self.event_capacity == 0 {
            return Err(Error::config("event_capacity cannot be 0"));
        }
        if self.debounce > Duration::from_secs(60) {
            return Err(Error::config("debounce cannot exceed 60s"));
        }
        Ok(())
    }
}

struct MonitorState {
    closed: bool,
    filter: Arc<ChangeFilter>,
    stats: MonitorStats,
    history: HistoryRing,
    debouncer: Debouncer,
}

struct Shared {
    state: Mutex<MonitorState>,
    watcher: FileWatcher,
    events: broadcast::Sender<MonitorEvent>,
    runtime: Handle,
}

impl Shared {
    fn publish(&self, event: MonitorEvent) {
        // no subscribers is not an error
        let _ = self.events.send(event);
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Handle one raw change from the watcher.
    ///
    /// Changes from a handle that is no longer installed are dropped. The
    /// check runs under the monitor lock, which `unwatch` holds while it
    /// removes the root.
    fn ingest(self: &Arc<Self>, root: &Path, generation: u64, change: Change) {
        let mut state = self.state.lock();
        if !self.watcher.is_current(root, generation) {
            tracing::trace!(path = %change.path.display(), "Dropping change from removed root");
            return;
        }
        self.accept(&mut state, change);
    }

    /// Count, filter and debounce one change.
    fn accept(self: &Arc<Self>, state: &mut MonitorState, change: Change) {
        if state.closed {
            return;
        }

        state.stats.total_changes += 1;
        if !state.filter.should_process(&change) {
            state.stats.filtered_changes += 1;
            tracing::debug!(path = %change.path.display(), change = %change.change_type, "Change filtered");
            return;
        }

        let weak = Arc::downgrade(self);
        let runtime = self.runtime.clone();
        state.debouncer.schedule(change, move |path, seq, window| {
            runtime.spawn(fire_after(weak, path, seq, window))
        });
    }

    /// Emit the pending change for `path` if `seq` still owns its slot.
    fn flush(&self, path: &Path, seq: u64) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        let Some(change) = state.debouncer.take_if_current(path, seq) else {
            return;
        };

        state.stats.record_emitted(change.change_type);
        state.history.push(change.clone());
        tracing::debug!(path = %change.path.display(), change = %change.change_type, "Change emitted");
        // published under the lock so shutdown cannot interleave
        self.publish(MonitorEvent::Change(change));
    }
}

async fn fire_after(shared: Weak<Shared>, path: PathBuf, seq: u64, window: Duration) {
    tokio::time::sleep(window).await;
    if let Some(shared) = shared.upgrade() {
        shared.flush(&path, seq);
    }
}

async fn pump(shared: Arc<Shared>, mut rx: WatchEventReceiver) {
    while let Some(event) = rx.recv().await {
        if shared.is_closed() {
            break;
        }
        match event {
            WatchEvent::Change {
                root,
                generation,
                change,
            } => shared.ingest(&root, generation, change),
            WatchEvent::Watching { path, kind } => {
                shared.publish(MonitorEvent::Watching { path, kind });
            }
            WatchEvent::Unwatched { path } => shared.publish(MonitorEvent::Unwatched { path }),
            WatchEvent::Error { path, error } => {
                shared.publish(MonitorEvent::Error { path, error });
            }
            WatchEvent::Closed => break,
        }
    }
    tracing::debug!("Monitor event pump stopped");
}

/// File system change monitor.
///
/// Must be created inside a tokio runtime; debounce timers and the event
/// pump run as tasks on it.
pub struct Monitor {
    shared: Arc<Shared>,
    pump: JoinHandle<()>,
    recursive: bool,
}

impl Monitor {
    /// Create a monitor with no watched paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the filter cannot
    /// be compiled, no tokio runtime is running, or the watcher cannot
    /// start.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| Error::internal(format!("monitor requires a tokio runtime: {e}")))?;
        let filter = ChangeFilter::new(config.filter)?;

        let (watcher, watch_rx) = FileWatcher::new()?;
        let (events, _) = broadcast::channel(config.event_capacity);

        let shared = Arc::new(Shared {
            state: Mutex::new(MonitorState {
                closed: false,
                filter: Arc::new(filter),
                stats: MonitorStats::new(),
                history: HistoryRing::new(config.max_history),
                debouncer: Debouncer::new(config.debounce),
            }),
            watcher,
            events,
            runtime: runtime.clone(),
        });

        let pump = runtime.spawn(pump(Arc::clone(&shared), watch_rx));

        tracing::info!(
            debounce_ms = u64::try_from(config.debounce.as_millis()).unwrap_or(u64::MAX),
            max_history = config.max_history,
            "Monitor started"
        );

        Ok(Self {
            shared,
            pump,
            recursive: config.recursive,
        })
    }

    /// Subscribe to every event.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_to(Topic::All)
    }

    /// Subscribe to one topic, e.g. `Topic::ChangeOf(ChangeType::Deleted)`.
    #[must_use]
    pub fn subscribe_to(&self, topic: Topic) -> Subscription {
        Subscription::new(self.shared.events.subscribe(), topic)
    }

    /// Watch `path` with the configured default recursion.
    ///
    /// # Errors
    ///
    /// See [`Monitor::watch_with`].
    pub fn watch(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        self.watch_with(
            path,
            WatchOptions {
                recursive: self.recursive,
            },
        )
    }

    /// Watch `path`.
    ///
    /// Watch failures are published as an `error` event and also returned.
    ///
    /// # Errors
    ///
    /// Returns `MonitorClosed` after shutdown, or the watcher's error.
    pub fn watch_with(&self, path: impl AsRef<Path>, options: WatchOptions) -> Result<PathBuf> {
        self.ensure_open()?;
        let path = path.as_ref();

        match self.shared.watcher.watch(path, options) {
            Ok(resolved) => Ok(resolved),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to watch path");
                self.shared.publish(MonitorEvent::Error {
                    path: resolve_path(path),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Watch several paths; one bad path does not stop the others.
    ///
    /// Returns the resolved paths that are now watched. Failures surface only
    /// as `error` events.
    ///
    /// # Errors
    ///
    /// Returns `MonitorClosed` after shutdown.
    pub fn watch_many<I, P>(&self, paths: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.ensure_open()?;
        let mut watched = Vec::new();
        for path in paths {
            match self.watch(path) {
                Ok(resolved) => watched.push(resolved),
                Err(Error::MonitorClosed) => return Err(Error::MonitorClosed),
                Err(_) => {}
            }
        }
        Ok(watched)
    }

    /// Stop watching `path`, cancelling pending changes beneath it first.
    ///
    /// Returns `false` if it was not being watched.
    ///
    /// # Errors
    ///
    /// Returns `MonitorClosed` after shutdown.
    pub fn unwatch(&self, path: impl AsRef<Path>) -> Result<bool> {
        let resolved = resolve_path(path.as_ref());
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::MonitorClosed);
        }
        let cancelled = state.debouncer.cancel_under(&resolved);
        if cancelled > 0 {
            tracing::debug!(path = %resolved.display(), cancelled, "Cancelled pending changes");
        }
        // still under the monitor lock, so no queued change for this root
        // can be accepted once it returns
        self.shared.watcher.unwatch(&resolved)
    }

    /// Stop watching everything, cancelling every pending change first.
    ///
    /// # Errors
    ///
    /// Returns `MonitorClosed` after shutdown.
    pub fn unwatch_all(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::MonitorClosed);
        }
        state.debouncer.cancel_all();
        self.shared.watcher.unwatch_all()
    }

    /// Most recent changes, newest first.
    #[must_use]
    pub fn get_history(&self, limit: Option<usize>) -> Vec<Change> {
        self.shared.state.lock().history.recent(limit)
    }

    /// Most recent changes of one type, newest first.
    #[must_use]
    pub fn get_changes_by_type(&self, change_type: ChangeType, limit: Option<usize>) -> Vec<Change> {
        self.shared.state.lock().history.by_type(change_type, limit)
    }

    /// Most recent changes to `path`, newest first.
    #[must_use]
    pub fn get_changes_for_path(&self, path: impl AsRef<Path>, limit: Option<usize>) -> Vec<Change> {
        let resolved = resolve_path(path.as_ref());
        self.shared.state.lock().history.for_path(&resolved, limit)
    }

    /// Current statistics, derived fields computed now.
    #[must_use]
    pub fn get_stats(&self) -> StatsSnapshot {
        let watcher = self.shared.watcher.stats();
        let state = self.shared.state.lock();
        state
            .stats
            .snapshot(watcher, state.debouncer.len(), state.history.len())
    }

    /// Reset counters; history is left alone.
    ///
    /// # Errors
    ///
    /// Returns `MonitorClosed` after shutdown.
    pub fn reset_stats(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(Error::MonitorClosed);
            }
            state.stats = MonitorStats::new();
        }
        tracing::info!("Statistics reset");
        self.shared.publish(MonitorEvent::StatsReset);
        Ok(())
    }

    /// Drop all history; counters are left alone.
    ///
    /// # Errors
    ///
    /// Returns `MonitorClosed` after shutdown.
    pub fn clear_history(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(Error::MonitorClosed);
            }
            state.history.clear();
        }
        tracing::info!("History cleared");
        self.shared.publish(MonitorEvent::HistoryCleared);
        Ok(())
    }

    /// Replace the filter. Applies to the next change; history is not
    /// re-evaluated.
    ///
    /// # Errors
    ///
    /// Returns `MonitorClosed` after shutdown, or a configuration error if
    /// the options do not compile.
    pub fn update_filter(&self, options: FilterOptions) -> Result<()> {
        self.ensure_open()?;
        let filter = Arc::new(ChangeFilter::new(options.clone())?);
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(Error::MonitorClosed);
            }
            state.filter = filter;
        }
        tracing::info!(?options, "Filter updated");
        self.shared.publish(MonitorEvent::FilterUpdated(options));
        Ok(())
    }

    /// Options of the active filter.
    #[must_use]
    pub fn get_filter_options(&self) -> FilterOptions {
        self.shared.state.lock().filter.options().clone()
    }

    /// Currently registered roots.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<WatchedPath> {
        self.shared.watcher.watched_paths()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Stop everything.
    ///
    /// Pending debounce timers are cancelled before the watcher is closed;
    /// once this returns no further `change` event is ever published.
    /// Emits `shutting-down` then `shutdown`. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let cancelled = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            self.shared.publish(MonitorEvent::ShuttingDown);
            state.closed = true;
            state.debouncer.cancel_all()
        };

        self.pump.abort();
        self.shared.watcher.close();

        tracing::info!(cancelled, "Monitor shut down");
        self.shared.publish(MonitorEvent::Shutdown);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.is_closed() {
            Err(Error::MonitorClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.pump.abort();
        {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.debouncer.cancel_all();
        }
        // the aborted pump may release the last reference later
        self.shared.watcher.close();
    }
}
