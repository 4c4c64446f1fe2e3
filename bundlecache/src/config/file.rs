//! INI-backed configuration file.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::keys::ConfigKey;
use crate::cache::{InstallClearMode, VerifyLevel};
use crate::download::{
    DownloadSettings, DEFAULT_FAILED_TRY_AGAIN, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_MAX_REQUESTS_PER_TICK, DEFAULT_RESUME_MIN_SIZE, DEFAULT_RETRY_DELAY,
};
use crate::fs::{
    DefaultRemoteServices, FileSystemConfig, DEFAULT_CLEAR_FILES_PER_TICK,
    DEFAULT_VERIFY_MAX_CONCURRENCY,
};
use crate::logging::LoggingConfig;

/// Package name used when the config file does not set one.
pub const DEFAULT_PACKAGE_NAME: &str = "DefaultPackage";

/// Default timeout for version and manifest requests, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Errors from loading, saving, or editing the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to parse configuration file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{0} is not set")]
    Missing(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Directory holding the config file and the default cache root.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bundlecache")
}

/// Location of `config.ini`.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.ini")
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSection {
    pub directory: PathBuf,
    pub verify_level: VerifyLevel,
    pub verify_max_concurrency: usize,
    pub install_clear_mode: InstallClearMode,
    pub disable_on_demand_download: bool,
    pub clear_files_per_tick: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            directory: config_dir().join("cache"),
            verify_level: VerifyLevel::default(),
            verify_max_concurrency: DEFAULT_VERIFY_MAX_CONCURRENCY,
            install_clear_mode: InstallClearMode::default(),
            disable_on_demand_download: false,
            clear_files_per_tick: DEFAULT_CLEAR_FILES_PER_TICK,
        }
    }
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSection {
    pub max_concurrency: usize,
    pub max_requests_per_tick: usize,
    /// Zero disables the watchdog.
    pub watchdog_secs: u64,
    pub resume_min_size: u64,
    pub resume_response_codes: Vec<u16>,
    pub failed_try_again: u32,
    pub retry_delay_ms: u64,
    /// Timeout for version and manifest requests.
    pub timeout_secs: u64,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_requests_per_tick: DEFAULT_MAX_REQUESTS_PER_TICK,
            watchdog_secs: 0,
            resume_min_size: DEFAULT_RESUME_MIN_SIZE,
            resume_response_codes: vec![416],
            failed_try_again: DEFAULT_FAILED_TRY_AGAIN,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// `[remote]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSection {
    pub main_url: Option<String>,
    /// Falls back to `main_url` when unset.
    pub fallback_url: Option<String>,
    pub package: String,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            main_url: None,
            fallback_url: None,
            package: DEFAULT_PACKAGE_NAME.to_string(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSection {
    pub level: String,
    /// Log file directory; console only when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub cache: CacheSection,
    pub download: DownloadSection,
    pub remote: RemoteSection,
    pub logging: LoggingSection,
}

impl ConfigFile {
    /// Load from [`config_file_path`].
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load from an explicit path. Keys missing from the file keep their
    /// defaults; unknown keys are ignored.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|props| props.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }

        Ok(config)
    }

    /// Save to [`config_file_path`].
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save to an explicit path, creating parent directories. Unset
    /// optional values are omitted.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if value.is_empty() {
                continue;
            }
            ini.with_section(Some(key.section()))
                .set(key.key_name(), value);
        }

        ini.write_to_file(path)?;
        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Download scheduler settings from `[download]`.
    pub fn download_settings(&self) -> DownloadSettings {
        let d = &self.download;
        let watchdog = (d.watchdog_secs > 0).then(|| Duration::from_secs(d.watchdog_secs));
        DownloadSettings::default()
            .with_max_concurrency(d.max_concurrency)
            .with_max_requests_per_tick(d.max_requests_per_tick)
            .with_watchdog_time(watchdog)
            .with_resume_min_size(d.resume_min_size)
            .with_resume_response_codes(d.resume_response_codes.clone())
            .with_failed_try_again(d.failed_try_again)
            .with_retry_delay(Duration::from_millis(d.retry_delay_ms))
    }

    /// Runtime configuration for one package.
    pub fn to_file_system_config(&self, package_name: &str) -> FileSystemConfig {
        let c = &self.cache;
        FileSystemConfig::new(package_name, c.directory.clone())
            .with_verify_level(c.verify_level)
            .with_verify_max_concurrency(c.verify_max_concurrency)
            .with_install_clear_mode(c.install_clear_mode)
            .with_disable_on_demand_download(c.disable_on_demand_download)
            .with_clear_files_per_tick(c.clear_files_per_tick)
            .with_download(self.download_settings())
    }

    /// Remote URL resolver; requires `remote.main_url`.
    pub fn remote_services(&self) -> ConfigResult<DefaultRemoteServices> {
        let main = self
            .remote
            .main_url
            .clone()
            .ok_or_else(|| ConfigError::Missing(ConfigKey::RemoteMainUrl.name()))?;
        let fallback = self.remote.fallback_url.clone().unwrap_or_else(|| main.clone());
        Ok(DefaultRemoteServices::new(main, fallback))
    }

    /// Timeout for version and manifest requests.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.download.timeout_secs)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        let mut logging = LoggingConfig::new(self.logging.level.clone());
        if let Some(dir) = &self.logging.directory {
            logging = logging.with_directory(dir.clone());
        }
        logging
    }
}
