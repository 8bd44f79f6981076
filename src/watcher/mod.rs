//! File system watching and change classification.
//!
//! This module provides:
//! - Native watch handles per root using notify-rs
//! - Baseline scans so pre-existing entries are not reported as created
//! - Per-path stat tracking to turn raw notifications into typed changes

mod events;
mod file_watcher;
mod scanner;
mod tracker;

pub use events::{Change, ChangeType, PathKind, WatchEvent, WatchedPath};
pub use file_watcher::{
    resolve_path, FileWatcher, WatchEventReceiver, WatchOptions, WatcherStats,
};
pub use scanner::{scan_tree, ScanOutcome};
pub use tracker::{Classification, PathTracker, TrackedStat};
