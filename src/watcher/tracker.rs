//! Per-path metadata cache used to classify raw notifications.

use std::collections::HashMap;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::ChangeType;

/// Cached metadata for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedStat {
    pub size: u64,
    pub modify_time: DateTime<Utc>,
    /// Inode change time. Falls back to `modify_time` where the platform
    /// does not expose it, which makes `changed` unreachable there.
    pub change_time: DateTime<Utc>,
    pub is_directory: bool,
}

impl TrackedStat {
    /// Build a stat from file system metadata.
    #[must_use]
    pub fn from_metadata(meta: &Metadata) -> Self {
        let modify_time = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_default();

        Self {
            size: meta.len(),
            modify_time,
            change_time: change_time(meta).unwrap_or(modify_time),
            is_directory: meta.is_dir(),
        }
    }

    /// Stat `path`, mapping "does not exist" to `None`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error other than `NotFound`.
    pub fn from_path(path: &Path) -> io::Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(Self::from_metadata(&meta))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn change_time(meta: &Metadata) -> Option<DateTime<Utc>> {
    use std::os::unix::fs::MetadataExt;

    let nanos = u32::try_from(meta.ctime_nsec()).unwrap_or(0);
    DateTime::from_timestamp(meta.ctime(), nanos)
}

#[cfg(not(unix))]
fn change_time(_meta: &Metadata) -> Option<DateTime<Utc>> {
    None
}

/// Outcome of classifying one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub change_type: ChangeType,
    pub old_stats: Option<TrackedStat>,
    pub new_stats: Option<TrackedStat>,
}

/// Last-seen metadata for every observed path.
#[derive(Debug, Default)]
pub struct PathTracker {
    stats: HashMap<PathBuf, TrackedStat>,
}

impl PathTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify an observation of `path` against the cached baseline.
    ///
    /// Returns `None` when nothing semantically changed, including an absent
    /// path that was never tracked; the caller should emit nothing then.
    pub fn classify(
        &mut self,
        path: &Path,
        current: Option<TrackedStat>,
    ) -> Option<Classification> {
        let Some(new) = current else {
            // nothing known about the path, so nothing to report as deleted
            let old = self.stats.remove(path)?;
            if old.is_directory {
                self.remove_under(path);
            }
            return Some(Classification {
                change_type: ChangeType::Deleted,
                old_stats: Some(old),
                new_stats: None,
            });
        };

        let old = self.stats.insert(path.to_path_buf(), new);
        let change_type = match old {
            None if new.is_directory => ChangeType::DirectoryCreated,
            None => ChangeType::Created,
            Some(prev) if prev.modify_time != new.modify_time => ChangeType::Modified,
            Some(prev) if prev.change_time != new.change_time => ChangeType::Changed,
            Some(_) => return None,
        };

        Some(Classification {
            change_type,
            old_stats: old,
            new_stats: Some(new),
        })
    }

    /// Record a baseline entry without classifying it.
    pub fn record(&mut self, path: PathBuf, stat: TrackedStat) {
        self.stats.insert(path, stat);
    }

    /// Drop the entry for `path` without classifying anything.
    pub fn forget(&mut self, path: &Path) -> Option<TrackedStat> {
        self.stats.remove(path)
    }

    /// Cached stat for `path`, if any.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&TrackedStat> {
        self.stats.get(path)
    }

    /// Drop every entry at or beneath `root`. Returns how many were removed.
    pub fn remove_under(&mut self, root: &Path) -> usize {
        let before = self.stats.len();
        self.stats.retain(|p, _| !p.starts_with(root));
        before - self.stats.len()
    }

    /// Every tracked path at or beneath `root`.
    #[must_use]
    pub fn paths_under(&self, root: &Path) -> Vec<PathBuf> {
        self.stats
            .keys()
            .filter(|p| p.starts_with(root))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stats.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn clear(&mut self) {
        self.stats.clear();
    }
}
