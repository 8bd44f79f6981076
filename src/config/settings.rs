//! Configuration settings and validation.

use crate::monitor::{FilterOptions, MonitorConfig, DEFAULT_DEBOUNCE, DEFAULT_MAX_HISTORY};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How events are written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Server-Sent Events frames.
    Sse,
}

/// Main configuration for the monitor binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// Files and directories to watch.
    pub watch_paths: Vec<PathBuf>,

    /// Watch directories recursively.
    pub recursive: bool,

    /// Debounce window in milliseconds.
    pub debounce_ms: u64,

    /// Number of changes kept in history.
    pub max_history: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format for events.
    pub output: OutputFormat,

    /// Optional JSON file with `FilterOptions`.
    pub filter_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_paths: Vec::new(),
            recursive: true,
            debounce_ms: u64::try_from(DEFAULT_DEBOUNCE.as_millis()).unwrap_or(100),
            max_history: DEFAULT_MAX_HISTORY,
            log_level: "info".to_string(),
            output: OutputFormat::default(),
            filter_file: None,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.watch_paths.is_empty() {
            return Err(Error::config("at least one watch path is required"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.debounce_ms > 60_000 {
            return Err(Error::config("debounce_ms cannot exceed 60000"));
        }

        if self.max_history == 0 {
            return Err(Error::config("max_history cannot be 0"));
        }

        Ok(())
    }

    /// Load filter options from `filter_file`, or defaults if unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load_filter(&self) -> Result<FilterOptions> {
        self.filter_file
            .as_deref()
            .map_or_else(|| Ok(FilterOptions::default()), load_filter_file)
    }

    /// Build the monitor configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter file cannot be loaded.
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        Ok(MonitorConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            max_history: self.max_history,
            recursive: self.recursive,
            filter: self.load_filter()?,
            ..MonitorConfig::default()
        })
    }
}

/// Read `FilterOptions` from a JSON file. Missing fields take defaults.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_filter_file(path: &Path) -> Result<FilterOptions> {
    let raw = std::fs::read_to_string(path)?;
    let options = serde_json::from_str(&raw)?;
    tracing::debug!(path = %path.display(), "Loaded filter file");
    Ok(options)
}
