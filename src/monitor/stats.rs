//! Aggregate monitor statistics.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::watcher::{ChangeType, WatcherStats};

/// Running counters. Derived rates are computed in [`MonitorStats::snapshot`].
#[derive(Debug)]
pub struct MonitorStats {
    /// Raw changes seen, accepted or not.
    pub total_changes: u64,
    /// Raw changes rejected by the filter.
    pub filtered_changes: u64,
    /// Debounced emissions per type.
    pub by_type: BTreeMap<ChangeType, u64>,
    pub start_time: DateTime<Utc>,
    started: Instant,
}

impl MonitorStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_changes: 0,
            filtered_changes: 0,
            by_type: BTreeMap::new(),
            start_time: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn record_emitted(&mut self, change_type: ChangeType) {
        *self.by_type.entry(change_type).or_insert(0) += 1;
    }

    /// Merge counters with watcher and monitor state into a report.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn snapshot(
        &self,
        watcher: WatcherStats,
        pending_changes: usize,
        history_size: usize,
    ) -> StatsSnapshot {
        let uptime = self.started.elapsed().as_secs_f64();
        let changes_per_second = if uptime > 0.0 {
            self.total_changes as f64 / uptime
        } else {
            0.0
        };
        let filter_rate = if self.total_changes > 0 {
            self.filtered_changes as f64 / self.total_changes as f64 * 100.0
        } else {
            0.0
        };

        StatsSnapshot {
            total_changes: self.total_changes,
            filtered_changes: self.filtered_changes,
            accepted_changes: self.total_changes - self.filtered_changes,
            by_type: self.by_type.clone(),
            start_time: self.start_time,
            uptime_secs: uptime,
            changes_per_second,
            filter_rate,
            watched_paths: watcher.watched_paths,
            tracked_files: watcher.tracked_files,
            active_watchers: watcher.active_watchers,
            pending_changes,
            history_size,
        }
    }
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time statistics report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_changes: u64,
    pub filtered_changes: u64,
    /// Raw changes that passed the filter (before debouncing).
    pub accepted_changes: u64,
    /// Debounced emissions per type.
    pub by_type: BTreeMap<ChangeType, u64>,
    pub start_time: DateTime<Utc>,
    /// Seconds since `start_time`.
    #[serde(rename = "uptime")]
    pub uptime_secs: f64,
    pub changes_per_second: f64,
    /// Percentage of raw changes rejected by the filter.
    pub filter_rate: f64,
    pub watched_paths: usize,
    pub tracked_files: usize,
    pub active_watchers: usize,
    /// Debounce timers currently armed.
    pub pending_changes: usize,
    pub history_size: usize,
}

impl StatsSnapshot {
    /// Sum of debounced emissions across all types.
    #[must_use]
    pub fn emitted_changes(&self) -> u64 {
        self.by_type.values().sum()
    }
}
