//! # Logging Setup
//!
//! One call wires a binary's logging: a console layer for people watching the
//! terminal and a JSON layer written to a daily rolling file for later
//! analysis. The library itself logs through the `log` facade; those records
//! are bridged into the same subscriber.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::path::Path;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Reasons logging could not be set up.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The log directory could not be created.
    #[error("can't create log directory {dir}: {source}")]
    LogDir {
        /// The directory.
        dir: String,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// Neither `RUST_LOG` nor the fallback level parsed as a filter.
    #[error("invalid log filter {0:?}")]
    Filter(String),

    /// A global subscriber is already installed.
    #[error("logging already initialized: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// # Setup Logging
///
/// Installs the global subscriber for `app_name`:
/// - filter from `RUST_LOG`, else `level` (e.g. `"info"`),
/// - ANSI console output with targets,
/// - JSON lines to `<log_dir>/<app_name>.<date>`, rotated daily.
///
/// Keep the returned guard alive for the life of the program; dropping it
/// flushes and closes the file writer.
pub fn setup_logging(app_name: &str, log_dir: &Path, level: &str) -> Result<WorkerGuard, LoggerError> {
    std::fs::create_dir_all(log_dir).map_err(|source| LoggerError::LogDir {
        dir: log_dir.display().to_string(),
        source,
    })?;

    let (file_writer, guard) = non_blocking(rolling::daily(log_dir, app_name));

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|_| LoggerError::Filter(level.to_string()))?;

    let console_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer().with_ansi(false).with_writer(file_writer).json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging initialized for {} with level: {}", app_name, level);
    Ok(guard)
}
