//! Baseline directory scanner.
//!
//! Walks a root before its native watch is installed so that entries which
//! already exist are cached and later notifications are classified against a
//! complete baseline instead of being reported as newly created.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use super::tracker::TrackedStat;

/// Result of a baseline scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Every entry found, the root included.
    pub entries: Vec<(PathBuf, TrackedStat)>,
    /// Entries that could not be read.
    pub errors: u64,
}

/// Scan `root` and stat every entry beneath it.
///
/// Unlike an indexing walk this applies no ignore rules at all: hidden files
/// and VCS directories are part of the baseline too, since filtering happens
/// later on the produced changes. `recursive == false` limits the walk to the
/// root's direct children.
#[must_use]
pub fn scan_tree(root: &Path, recursive: bool) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .max_depth(if recursive { None } else { Some(1) })
        .build();

    for entry in walker {
        match entry {
            Ok(entry) => match entry.metadata() {
                Ok(meta) => {
                    outcome
                        .entries
                        .push((entry.into_path(), TrackedStat::from_metadata(&meta)));
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable entry during scan");
                    outcome.errors += 1;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Error walking directory");
                outcome.errors += 1;
            }
        }
    }

    tracing::debug!(
        root = %root.display(),
        entries = outcome.entries.len(),
        errors = outcome.errors,
        "Baseline scan complete"
    );

    outcome
}
