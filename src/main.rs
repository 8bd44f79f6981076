//! fswatch-monitor - real-time file system change monitor
//!
//! Watches the given paths and writes every monitor event to stdout.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use fswatch_monitor::config::OutputFormat;
use fswatch_monitor::observability::{config_from_env, init_tracing};
use fswatch_monitor::{Config, Error, Monitor, MonitorEvent, Result, Topic};

/// fswatch-monitor - real-time file system change monitor
#[derive(Parser, Debug)]
#[command(name = "fswatch-monitor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Files or directories to watch
    #[arg(required = true, env = "FSWATCH_PATHS", value_delimiter = ',')]
    paths: Vec<PathBuf>,

    /// Only watch the top level of directories
    #[arg(long, env = "FSWATCH_NO_RECURSIVE")]
    no_recursive: bool,

    /// Debounce window in milliseconds
    #[arg(short, long, env = "FSWATCH_DEBOUNCE_MS", default_value = "100")]
    debounce_ms: u64,

    /// Number of changes kept in history
    #[arg(long, env = "FSWATCH_MAX_HISTORY", default_value = "1000")]
    max_history: usize,

    /// JSON file with filter options
    #[arg(short, long, env = "FSWATCH_FILTER_FILE")]
    filter: Option<PathBuf>,

    /// Event output format
    #[arg(short, long, env = "FSWATCH_OUTPUT", value_enum, default_value_t = OutputFormat::Json)]
    output: OutputFormat,

    /// Only print events of this topic (e.g. "change", "change:deleted")
    #[arg(short, long, env = "FSWATCH_TOPIC", default_value = "*")]
    topic: Topic,

    /// Log level (trace, debug, info, warn, error) [env: FSWATCH_LOG_LEVEL]
    #[arg(long)]
    log_level: Option<String>,

    /// Enable JSON logging output [env: FSWATCH_LOG_JSON]
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let tracing_config = config_from_env().with_overrides(cli.log_level, cli.log_json);
    init_tracing(&tracing_config.level, tracing_config.json);

    tracing::info!(
        "fswatch-monitor v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config {
        watch_paths: cli.paths,
        recursive: !cli.no_recursive,
        debounce_ms: cli.debounce_ms,
        max_history: cli.max_history,
        log_level: tracing_config.level,
        output: cli.output,
        filter_file: cli.filter,
    };

    tracing::debug!(?config, "Configuration loaded");
    config.validate()?;

    let monitor = Monitor::new(config.monitor_config()?)?;
    let mut events = monitor.subscribe_to(cli.topic);

    let watched = monitor.watch_many(&config.watch_paths)?;
    if watched.is_empty() {
        return Err(Error::config("none of the given paths could be watched"));
    }
    tracing::info!(count = watched.len(), "Watching");

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                write_event(&event, config.output)?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, shutting down");
                break;
            }
        }
    }

    monitor.shutdown();
    while let Some(event) = events.try_recv() {
        write_event(&event, config.output)?;
    }

    let stats = monitor.get_stats();
    tracing::info!(
        total = stats.total_changes,
        filtered = stats.filtered_changes,
        emitted = stats.emitted_changes(),
        "Final statistics"
    );
    eprintln!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

fn write_event(event: &MonitorEvent, format: OutputFormat) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(event)?)?,
        OutputFormat::Sse => write!(out, "{}", event.sse_frame())?,
    }
    out.flush()?;
    Ok(())
}
