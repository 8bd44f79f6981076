//! Change records and watcher lifecycle events.

#![allow(clippy::missing_const_for_fn)]

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tracker::TrackedStat;

/// Semantic type of a file system change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeType {
    /// Path appeared and was not tracked before.
    Created,
    /// Content modification time moved.
    Modified,
    /// Path no longer exists.
    Deleted,
    /// Metadata-only change (permissions, ownership, link count).
    Changed,
    /// A directory appeared.
    DirectoryCreated,
}

impl ChangeType {
    /// All change types, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Created,
        Self::Modified,
        Self::Deleted,
        Self::Changed,
        Self::DirectoryCreated,
    ];

    /// Wire name of the change type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Changed => "changed",
            Self::DirectoryCreated => "directory-created",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown change type '{s}'"))
    }
}

/// A classified change to a single path.
///
/// Immutable once built; serialises to the camelCase JSON shape consumed
/// by dashboards and log sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub path: PathBuf,
    pub filename: String,
    pub directory: PathBuf,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<TrackedStat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_stats: Option<TrackedStat>,
}

impl Change {
    /// Build a change for `path`, stamped with the current time.
    #[must_use]
    pub fn new(
        change_type: ChangeType,
        path: impl Into<PathBuf>,
        stats: Option<TrackedStat>,
        old_stats: Option<TrackedStat>,
    ) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Self {
            change_type,
            path,
            filename,
            directory,
            timestamp: Utc::now(),
            stats,
            old_stats,
        }
    }

    /// Lower-cased extension including the leading dot, or `""`.
    #[must_use]
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default()
    }
}

/// Whether a watched root is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    File,
    Directory,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::Directory => f.write_str("directory"),
        }
    }
}

/// A resolved root under active observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedPath {
    pub path: PathBuf,
    pub kind: PathKind,
    /// Only meaningful for directories.
    pub recursive: bool,
}

/// Events produced by the file watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A root began being observed.
    Watching { path: PathBuf, kind: PathKind },
    /// A root stopped being observed.
    Unwatched { path: PathBuf },
    /// The native handle for a root failed and was torn down.
    Error { path: PathBuf, error: String },
    /// A classified change under `root`, produced by handle `generation`.
    Change {
        root: PathBuf,
        generation: u64,
        change: Change,
    },
    /// The watcher was closed; nothing follows.
    Closed,
}
