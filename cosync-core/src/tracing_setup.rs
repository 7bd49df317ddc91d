//! Tracing setup for cosync runs
//!
//! Console output follows the level chosen by the operator; a second layer
//! records every event of the run to disk so a stalled rendezvous can be
//! reconstructed from both sides' tick transitions afterwards.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the per-run trace log, overwritten on each run.
pub const RUN_LOG_FILE: &str = "cosync-last-run.log";

/// Failures while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("Cannot prepare log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Global subscriber already installed: {reason}")]
    AlreadyInitialized { reason: String },
}

/// Initialize tracing with console output at `console_level` plus a full
/// trace log in `logs_dir` (defaults to `./logs`).
///
/// `RUST_LOG` overrides the console level when set.
///
/// # Errors
///
/// - `TracingError::LogFile` - Logs directory or file cannot be created
/// - `TracingError::AlreadyInitialized` - Another subscriber is installed
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> Result<PathBuf, TracingError> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    let log_file_path = logs_path.join(RUN_LOG_FILE);

    let log_file = create_dir_all(logs_path)
        .and_then(|()| File::create(&log_file_path))
        .map_err(|source| TracingError::LogFile {
            path: log_file_path.clone(),
            source,
        })?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| TracingError::AlreadyInitialized {
            reason: e.to_string(),
        })?;

    tracing::info!(
        console = %console_level,
        run_log = %log_file_path.display(),
        "Tracing initialized"
    );

    Ok(log_file_path)
}

/// Installs a test-captured subscriber; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_thread_names(true)
        .with_test_writer()
        .try_init();
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Tick transitions and queue decisions
    Debug,
    /// All messages including every wake-up
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use cosync_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CliLogLevel::Error => "error",
            CliLogLevel::Warn => "warn",
            CliLogLevel::Info => "info",
            CliLogLevel::Debug => "debug",
            CliLogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for CliLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(CliLogLevel::Error),
            "warn" => Ok(CliLogLevel::Warn),
            "info" => Ok(CliLogLevel::Info),
            "debug" => Ok(CliLogLevel::Debug),
            "trace" => Ok(CliLogLevel::Trace),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
