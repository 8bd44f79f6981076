//! Change monitoring on top of the file watcher.
//!
//! This module provides:
//! - Rule-based filtering of classified changes
//! - Per-path debouncing so bursts collapse to one event
//! - A bounded history and running statistics
//! - A topic-filtered event stream for subscribers

mod debounce;
mod events;
mod filter;
mod history;
mod service;
mod stats;

pub use debounce::{Debouncer, DEFAULT_DEBOUNCE};
pub use events::{MonitorEvent, Subscription, Topic};
pub use filter::{ChangeFilter, FilterOptions};
pub use history::{HistoryRing, DEFAULT_MAX_HISTORY};
pub use service::{Monitor, MonitorConfig};
pub use stats::{MonitorStats, StatsSnapshot};
