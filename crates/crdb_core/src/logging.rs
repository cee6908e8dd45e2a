//! Structured logging setup.
//!
//! Provides:
//! - Console output on stderr (stdout carries the module result)
//! - Optional daily rotating log files
//! - Build-type conditional log levels
//! - Console-only fallback when file logging fails
//! - Environment variable override via CRDB_LOG or RUST_LOG

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Logging configuration.
pub struct LogConfig {
    /// Directory for log files (None = console only)
    pub log_dir: Option<PathBuf>,
    /// Whether stderr is a terminal (enables ANSI colors)
    pub is_tty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a console-only logging configuration.
    pub fn new() -> Self {
        Self { log_dir: None, is_tty: atty::is(atty::Stream::Stderr), log_filter: None }
    }

    /// Also write logs to daily rotating files in `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that must be held for the lifetime of the process.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Initialize logging with the given configuration.
///
/// If file logging initialization fails, falls back to console-only.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    let Some(log_dir) = config.log_dir.as_ref() else {
        return init_stderr_logging(&config);
    };

    match init_file_logging(&config, log_dir) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {}. Using console only.", e);
            init_stderr_logging(&config)
        }
    }
}

/// Initialize stderr-only logging.
fn init_stderr_logging(config: &LogConfig) -> LoggingGuard {
    let env_filter = build_env_filter(config.log_filter.as_deref());

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .with_ansi(config.is_tty)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();

    LoggingGuard { _worker_guard: None }
}

/// Initialize file + stderr logging.
fn init_file_logging(
    config: &LogConfig,
    log_dir: &PathBuf,
) -> Result<WorkerGuard, Box<dyn std::error::Error + Send + Sync>> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("crdb")
        .filename_suffix("log")
        .build(log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Console stays at WARN so module runs are quiet; the file gets everything the filter allows.
    let stderr = std::io::stderr.with_max_level(tracing::Level::WARN);
    let combined = stderr.and(non_blocking);

    let env_filter = build_env_filter(config.log_filter.as_deref());

    tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()?;

    Ok(guard)
}

/// Build the environment filter from config or defaults.
fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    // Priority: custom filter > CRDB_LOG > RUST_LOG > default
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env("CRDB_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "info,crdb=debug,crdb_core=debug,tokio_postgres=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "warn,crdb=info,crdb_core=info,tokio_postgres=warn"
    }
}
