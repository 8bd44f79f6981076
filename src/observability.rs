//! Structured logging configuration.
//!
//! Provides setup for observability using the `tracing` crate with:
//! - Plain or JSON formatted output
//! - Level taken from `RUST_LOG` when set, otherwise from configuration

use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Registry,
};

/// Tracing configuration options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON output format
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl TracingConfig {
    /// Apply command-line values on top of this configuration.
    ///
    /// An explicit level replaces the configured one; `json` can only turn
    /// JSON output on.
    #[must_use]
    pub fn with_overrides(self, level: Option<String>, json: bool) -> Self {
        Self {
            level: level.unwrap_or(self.level),
            json: self.json || json,
        }
    }
}

/// Initialize tracing.
///
/// Logs go to stderr so stdout stays free for the event stream.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed in this process.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);

        Registry::default().with(env_filter).with(json_layer).init();
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).init();
    }

    tracing::debug!(level, json, "Tracing initialized");
}

/// Get tracing configuration from environment variables.
///
/// Respects these environment variables:
/// - `FSWATCH_LOG_LEVEL` - Log level (default: "info")
/// - `FSWATCH_LOG_JSON` - Enable JSON output (default: false)
#[must_use]
pub fn config_from_env() -> TracingConfig {
    config_from_lookup(|key| std::env::var(key).ok())
}

fn config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TracingConfig {
    let level = lookup("FSWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
    let json = lookup("FSWATCH_LOG_JSON")
        .is_some_and(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"));

    TracingConfig { level, json }
}
