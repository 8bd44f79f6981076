//! Configuration for the monitor binary.
//!
//! Supports configuration from:
//! - Command-line arguments (highest priority)
//! - Environment variables
//! - A JSON filter file for `FilterOptions`

mod settings;

pub use settings::{load_filter_file, Config, OutputFormat};
