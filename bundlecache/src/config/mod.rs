//! Persistent user configuration.
//!
//! Settings live in an INI file at `~/.bundlecache/config.ini`:
//!
//! ```ini
//! [cache]
//! directory = /home/user/.bundlecache/cache
//! verify_level = middle
//!
//! [download]
//! max_concurrency = 10
//! retry_delay_ms = 1000
//!
//! [remote]
//! main_url = https://cdn.example.com/bundles
//! fallback_url = https://backup.example.com/bundles
//! package = DefaultPackage
//!
//! [logging]
//! level = info
//! ```
//!
//! [`ConfigFile`] holds the parsed sections and converts them into the
//! runtime [`FileSystemConfig`](crate::fs::FileSystemConfig). [`ConfigKey`]
//! addresses individual `section.key` entries for the CLI.

mod file;
mod keys;

pub use file::{
    config_dir, config_file_path, CacheSection, ConfigError, ConfigFile, ConfigResult,
    DownloadSection, LoggingSection, RemoteSection, DEFAULT_PACKAGE_NAME,
};
pub use keys::ConfigKey;
