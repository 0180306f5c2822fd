//! Logging configuration for db-ask.
//!
//! Logs go to stderr by default, or to a file when one is configured.
//! `RUST_LOG` always wins over the default level.

use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use crate::error::{AskError, Result};

/// Default filter when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> EnvFilter {
    let level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},tower_http=debug,sqlx=warn")))
}

/// Initializes logging to stderr.
pub fn init_stderr_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter(verbose))
        .with_writer(std::io::stderr)
        .init();
}

/// Initializes logging to `path`, appending across restarts.
pub fn init_file_logging(path: &Path, verbose: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            AskError::config(format!("Could not create log directory {}: {e}", parent.display()))
        })?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            AskError::config(format!("Could not open log file {}: {e}", path.display()))
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(default_filter(verbose))
        .with_writer(log_file)
        .with_ansi(false)
        .init();
    Ok(())
}
