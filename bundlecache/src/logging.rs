//! Tracing subscriber setup.
//!
//! Installs a console layer on stderr and, when a directory is configured,
//! a non-blocking file layer. `RUST_LOG` overrides the configured level.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default log file name inside the log directory.
pub const DEFAULT_LOG_FILE_NAME: &str = "bundlecache.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("failed to create log directory {path}: {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `bundlecache=debug`.
    pub level: String,
    pub directory: Option<PathBuf>,
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            directory: None,
            file_name: DEFAULT_LOG_FILE_NAME.to_string(),
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| LoggingError::InvalidFilter {
            filter: self.level.clone(),
            reason: e.to_string(),
        })
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the lifetime of the program; it is `None` when no log directory is set.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = config.filter()?;

    let console_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(LocalTime::rfc_3339())
        .with_target(false);

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDirFailed {
                path: dir.clone(),
                source,
            })?;
            let appender = tracing_appender::rolling::never(dir, &config.file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTime::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    if let Some(dir) = &config.directory {
        tracing::info!(
            path = %dir.join(&config.file_name).display(),
            "Logging to file"
        );
    }

    Ok(guard)
}
