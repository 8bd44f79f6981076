//! fswatch-monitor
//!
//! Real-time file system change monitor: typed change classification,
//! per-path debouncing, rule-based filtering, bounded history and statistics,
//! published as an observable event stream.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod monitor;
pub mod observability;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result, WatcherError};
pub use monitor::{FilterOptions, Monitor, MonitorConfig, MonitorEvent, Subscription, Topic};
pub use watcher::{Change, ChangeType, WatchOptions};
