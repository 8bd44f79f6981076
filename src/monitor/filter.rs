//! Change filtering.
//!
//! [`ChangeFilter`] is a stateless predicate over [`Change`] records. Its
//! options are compiled once when the filter is built; reconfiguring means
//! building a new filter and swapping it in whole.

use std::collections::HashSet;
use std::path::Component;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::watcher::{Change, ChangeType};
use crate::{Error, Result};

/// Directory names ignored unless configured otherwise.
const DEFAULT_IGNORED_DIRS: &[&str] = &[".git", "node_modules"];

/// User-facing filter configuration.
///
/// Deserialises from partial camelCase JSON; missing fields take their
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterOptions {
    /// Allowed extensions; `None` allows all.
    pub include_extensions: Option<Vec<String>>,
    pub exclude_extensions: Vec<String>,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub ignore_hidden: bool,
    /// Directory names that suppress any path passing through them.
    pub ignore_paths: Vec<String>,
    pub min_size: u64,
    /// Upper size bound in bytes; `None` is unbounded.
    pub max_size: Option<u64>,
    /// Allowed change types; `None` allows all.
    pub change_types: Option<Vec<ChangeType>>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            include_extensions: None,
            exclude_extensions: Vec::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            ignore_hidden: true,
            ignore_paths: DEFAULT_IGNORED_DIRS.iter().map(|d| (*d).to_string()).collect(),
            min_size: 0,
            max_size: None,
            change_types: None,
        }
    }
}

impl FilterOptions {
    /// Options that accept every change.
    #[must_use]
    pub fn accept_all() -> Self {
        Self {
            ignore_hidden: false,
            ignore_paths: Vec::new(),
            ..Self::default()
        }
    }
}

/// Compiled change filter.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    options: FilterOptions,
    include_extensions: Option<HashSet<String>>,
    exclude_extensions: HashSet<String>,
    include_patterns: Vec<Regex>,
    exclude_patterns: Vec<Regex>,
    ignore_paths: HashSet<String>,
    change_types: Option<HashSet<ChangeType>>,
}

impl ChangeFilter {
    /// Compile a filter from options.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a pattern cannot be compiled or the
    /// size bounds are inverted.
    pub fn new(options: FilterOptions) -> Result<Self> {
        if options.max_size.is_some_and(|max| max < options.min_size) {
            return Err(Error::config(format!(
                "maxSize {} is below minSize {}",
                options.max_size.unwrap_or_default(),
                options.min_size
            )));
        }

        let include_patterns = compile_patterns(&options.include_patterns)?;
        let exclude_patterns = compile_patterns(&options.exclude_patterns)?;

        Ok(Self {
            include_extensions: options
                .include_extensions
                .as_ref()
                .map(|exts| exts.iter().map(|e| normalize_extension(e)).collect()),
            exclude_extensions: options
                .exclude_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            include_patterns,
            exclude_patterns,
            ignore_paths: options.ignore_paths.iter().cloned().collect(),
            change_types: options
                .change_types
                .as_ref()
                .map(|types| types.iter().copied().collect()),
            options,
        })
    }

    /// The options this filter was compiled from.
    #[must_use]
    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// Decide whether a change should be processed.
    ///
    /// Rules run in a fixed order and the first failing rule rejects.
    #[must_use]
    pub fn should_process(&self, change: &Change) -> bool {
        if let Some(ref allowed) = self.change_types {
            if !allowed.contains(&change.change_type) {
                return false;
            }
        }

        if self.options.ignore_hidden && change.filename.starts_with('.') {
            return false;
        }

        if self.is_in_ignored_dir(change) {
            return false;
        }

        let extension = change.extension();
        if self.exclude_extensions.contains(&extension) {
            return false;
        }
        if let Some(ref allowed) = self.include_extensions {
            if !allowed.contains(&extension) {
                return false;
            }
        }

        let path = change.path.to_string_lossy();
        if self.exclude_patterns.iter().any(|re| re.is_match(&path)) {
            return false;
        }
        if !self.include_patterns.is_empty()
            && !self.include_patterns.iter().any(|re| re.is_match(&path))
        {
            return false;
        }

        if let Some(ref stats) = change.stats {
            if stats.size < self.options.min_size {
                return false;
            }
            if self.options.max_size.is_some_and(|max| stats.size > max) {
                return false;
            }
        }

        true
    }

    fn is_in_ignored_dir(&self, change: &Change) -> bool {
        if self.ignore_paths.is_empty() {
            return false;
        }
        change.path.components().any(|c| match c {
            Component::Normal(name) => name
                .to_str()
                .is_some_and(|name| self.ignore_paths.contains(name)),
            _ => false,
        })
    }
}

impl Default for ChangeFilter {
    fn default() -> Self {
        Self {
            options: FilterOptions::default(),
            include_extensions: None,
            exclude_extensions: HashSet::new(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            ignore_paths: DEFAULT_IGNORED_DIRS.iter().map(|d| (*d).to_string()).collect(),
            change_types: None,
        }
    }
}

/// Lower-case an extension and make sure it carries its leading dot.
fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.is_empty() || ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

/// Compile a glob-like pattern into an anchored regex.
///
/// `*` matches any run of characters (separators included), `?` matches
/// exactly one character and everything else is literal.
fn compile_pattern(pattern: &str) -> Result<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');

    Regex::new(&source).map_err(|e| Error::config(format!("invalid pattern '{pattern}': {e}")))
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile_pattern(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::TrackedStat;
    use chrono::Utc;
    use std::path::PathBuf;

    fn change(path: &str) -> Change {
        Change::new(ChangeType::Modified, PathBuf::from(path), None, None)
    }

    fn change_with_size(path: &str, size: u64) -> Change {
        let now = Utc::now();
        let stats = TrackedStat {
            size,
            modify_time: now,
            change_time: now,
            is_directory: false,
        };
        Change::new(ChangeType::Modified, PathBuf::from(path), Some(stats), None)
    }

    fn filter(options: FilterOptions) -> ChangeFilter {
        ChangeFilter::new(options).unwrap()
    }

    #[test]
    fn test_default_filter() {
        let f = ChangeFilter::default();
        assert!(f.should_process(&change("/srv/app/main.rs")));
        assert!(!f.should_process(&change("/srv/app/.env")));
        assert!(!f.should_process(&change("/srv/app/.git/config")));
        assert!(!f.should_process(&change("/srv/app/node_modules/pkg/index.js")));
        assert_eq!(f.options(), &FilterOptions::default());
    }

    #[test]
    fn test_accept_all() {
        let f = filter(FilterOptions::accept_all());
        assert!(f.should_process(&change("/srv/app/.env")));
        assert!(f.should_process(&change("/srv/app/.git/config")));
    }

    #[test]
    fn test_change_types_allow_list() {
        let f = filter(FilterOptions {
            change_types: Some(vec![ChangeType::Created, ChangeType::Deleted]),
            ..FilterOptions::default()
        });
        assert!(!f.should_process(&change("/a/b.txt")));
        assert!(f.should_process(&Change::new(ChangeType::Created, "/a/b.txt", None, None)));
    }

    #[test]
    fn test_hidden_only_checks_basename() {
        let f = ChangeFilter::default();
        // a hidden parent directory does not hide its children
        assert!(f.should_process(&change("/home/u/.config/app/settings.json")));
        assert!(!f.should_process(&change("/home/u/.bashrc")));
    }

    #[test]
    fn test_ignore_paths_match_whole_segments() {
        let f = filter(FilterOptions {
            ignore_paths: vec!["target".to_string()],
            ..FilterOptions::accept_all()
        });
        assert!(!f.should_process(&change("/repo/target/debug/app")));
        assert!(f.should_process(&change("/repo/targets/list.txt")));
        assert!(f.should_process(&change("/repo/my-target/x")));
    }

    #[test]
    fn test_exclude_extensions() {
        let f = filter(FilterOptions {
            exclude_extensions: vec![".log".to_string(), "TMP".to_string()],
            ..FilterOptions::default()
        });
        assert!(!f.should_process(&change("/d/app.log")));
        assert!(!f.should_process(&change("/d/APP.LOG")));
        assert!(!f.should_process(&change("/d/scratch.tmp")));
        assert!(f.should_process(&change("/d/app.txt")));
    }

    #[test]
    fn test_include_extensions() {
        let f = filter(FilterOptions {
            include_extensions: Some(vec!["rs".to_string(), ".toml".to_string()]),
            ..FilterOptions::default()
        });
        assert!(f.should_process(&change("/d/lib.rs")));
        assert!(f.should_process(&change("/d/Cargo.toml")));
        assert!(!f.should_process(&change("/d/README.md")));
        assert!(!f.should_process(&change("/d/Makefile")));
    }

    #[test]
    fn test_exclude_extension_beats_include() {
        let f = filter(FilterOptions {
            include_extensions: Some(vec![".log".to_string()]),
            exclude_extensions: vec![".log".to_string()],
            ..FilterOptions::default()
        });
        assert!(!f.should_process(&change("/d/app.log")));
    }

    #[test]
    fn test_exclude_pattern_beats_include_pattern() {
        let f = filter(FilterOptions {
            include_patterns: vec!["*/src/*".to_string()],
            exclude_patterns: vec!["*_test.rs".to_string()],
            ..FilterOptions::default()
        });
        assert!(f.should_process(&change("/repo/src/lib.rs")));
        assert!(!f.should_process(&change("/repo/src/lib_test.rs")));
        assert!(!f.should_process(&change("/repo/docs/guide.md")));
    }

    #[test]
    fn test_pattern_wildcards() {
        let f = filter(FilterOptions {
            include_patterns: vec!["/data/file?.csv".to_string()],
            ..FilterOptions::default()
        });
        assert!(f.should_process(&change("/data/file1.csv")));
        assert!(!f.should_process(&change("/data/file12.csv")));
        // literal dot, not "any character"
        assert!(!f.should_process(&change("/data/file1xcsv")));
    }

    #[test]
    fn test_pattern_regex_metacharacters_are_literal() {
        let f = filter(FilterOptions {
            exclude_patterns: vec!["*(copy)+[1].txt".to_string()],
            ..FilterOptions::default()
        });
        assert!(!f.should_process(&change("/d/report(copy)+[1].txt")));
        assert!(f.should_process(&change("/d/report(copy)1.txt")));
    }

    #[test]
    fn test_size_bounds() {
        let f = filter(FilterOptions {
            min_size: 10,
            max_size: Some(100),
            ..FilterOptions::default()
        });
        assert!(!f.should_process(&change_with_size("/d/a.bin", 5)));
        assert!(f.should_process(&change_with_size("/d/a.bin", 10)));
        assert!(f.should_process(&change_with_size("/d/a.bin", 100)));
        assert!(!f.should_process(&change_with_size("/d/a.bin", 101)));
        // no stats (e.g. deletions) bypass the size rule
        assert!(f.should_process(&change("/d/a.bin")));
    }

    #[test]
    fn test_inverted_size_bounds_rejected() {
        let err = ChangeFilter::new(FilterOptions {
            min_size: 10,
            max_size: Some(5),
            ..FilterOptions::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("maxSize"));
    }

    #[test]
    fn test_options_from_partial_json() {
        let options: FilterOptions =
            serde_json::from_str(r#"{"excludeExtensions":[".log"],"changeTypes":["directory-created"]}"#)
                .unwrap();
        assert_eq!(options.exclude_extensions, vec![".log"]);
        assert_eq!(options.change_types, Some(vec![ChangeType::DirectoryCreated]));
        assert!(options.ignore_hidden);
        assert_eq!(options.max_size, None);
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("LOG"), ".log");
        assert_eq!(normalize_extension(".Rs"), ".rs");
        assert_eq!(normalize_extension(""), "");
    }
}
