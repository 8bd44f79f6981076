//! Error types and Result aliases for the monitor.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.
//!
//! Filtering and debouncing never fail; only path resolution, native
//! watch installation and calls into a closed monitor produce errors.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for monitor operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// A mutating call was issued after `shutdown()`.
    #[error("monitor is closed")]
    MonitorClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// File watcher errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatcherError {
    /// The path handed to `watch()` does not exist.
    #[error("path not found: '{path}'")]
    PathNotFound { path: String },

    /// The native watch handle could not be installed or failed while active.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// The watcher has been closed and accepts no further operations.
    #[error("watcher is closed")]
    Closed,
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error means the target path does not exist.
    #[must_use]
    pub const fn is_path_not_found(&self) -> bool {
        matches!(self, Self::Watcher(WatcherError::PathNotFound { .. }))
    }
}

impl WatcherError {
    /// Create a path-not-found error.
    pub fn path_not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::PathNotFound {
            path: path.as_ref().display().to_string(),
        }
    }

    /// Create a watch-failed error.
    pub fn watch_failed(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Self::WatchFailed {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }
}
