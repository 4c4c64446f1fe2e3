//! CLI error type.

use std::fmt;
use std::io;

use bundlecache::config::ConfigError;
use bundlecache::logging::LoggingError;

/// Errors reported to the user before exiting with status 1.
#[derive(Debug)]
pub enum CliError {
    /// Configuration missing or invalid.
    Config(String),
    /// Logging could not be set up.
    Logging(String),
    /// A cache operation finished with `Failed`.
    Operation { what: String, reason: String },
    /// The user pressed Ctrl+C.
    Cancelled,
    Io(io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(msg) => write!(f, "Logging error: {}", msg),
            CliError::Operation { what, reason } => write!(f, "{} failed: {}", what, reason),
            CliError::Cancelled => write!(f, "Cancelled"),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e.to_string())
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}
