//! Typed `section.key` access to configuration values.

use std::path::PathBuf;
use std::str::FromStr;

use super::file::{ConfigError, ConfigFile, ConfigResult};

/// Every setting the configuration file understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    CacheDirectory,
    CacheVerifyLevel,
    CacheVerifyMaxConcurrency,
    CacheInstallClearMode,
    CacheDisableOnDemandDownload,
    CacheClearFilesPerTick,

    DownloadMaxConcurrency,
    DownloadMaxRequestsPerTick,
    DownloadWatchdogSecs,
    DownloadResumeMinSize,
    DownloadResumeResponseCodes,
    DownloadFailedTryAgain,
    DownloadRetryDelayMs,
    DownloadTimeoutSecs,

    RemoteMainUrl,
    RemoteFallbackUrl,
    RemotePackage,

    LoggingLevel,
    LoggingDirectory,
}

const ALL_KEYS: &[ConfigKey] = &[
    ConfigKey::CacheDirectory,
    ConfigKey::CacheVerifyLevel,
    ConfigKey::CacheVerifyMaxConcurrency,
    ConfigKey::CacheInstallClearMode,
    ConfigKey::CacheDisableOnDemandDownload,
    ConfigKey::CacheClearFilesPerTick,
    ConfigKey::DownloadMaxConcurrency,
    ConfigKey::DownloadMaxRequestsPerTick,
    ConfigKey::DownloadWatchdogSecs,
    ConfigKey::DownloadResumeMinSize,
    ConfigKey::DownloadResumeResponseCodes,
    ConfigKey::DownloadFailedTryAgain,
    ConfigKey::DownloadRetryDelayMs,
    ConfigKey::DownloadTimeoutSecs,
    ConfigKey::RemoteMainUrl,
    ConfigKey::RemoteFallbackUrl,
    ConfigKey::RemotePackage,
    ConfigKey::LoggingLevel,
    ConfigKey::LoggingDirectory,
];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        ALL_KEYS
    }

    pub fn section(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            CacheDirectory
            | CacheVerifyLevel
            | CacheVerifyMaxConcurrency
            | CacheInstallClearMode
            | CacheDisableOnDemandDownload
            | CacheClearFilesPerTick => "cache",
            DownloadMaxConcurrency
            | DownloadMaxRequestsPerTick
            | DownloadWatchdogSecs
            | DownloadResumeMinSize
            | DownloadResumeResponseCodes
            | DownloadFailedTryAgain
            | DownloadRetryDelayMs
            | DownloadTimeoutSecs => "download",
            RemoteMainUrl | RemoteFallbackUrl | RemotePackage => "remote",
            LoggingLevel | LoggingDirectory => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            CacheDirectory | LoggingDirectory => "directory",
            CacheVerifyLevel => "verify_level",
            CacheVerifyMaxConcurrency => "verify_max_concurrency",
            CacheInstallClearMode => "install_clear_mode",
            CacheDisableOnDemandDownload => "disable_on_demand_download",
            CacheClearFilesPerTick => "clear_files_per_tick",
            DownloadMaxConcurrency => "max_concurrency",
            DownloadMaxRequestsPerTick => "max_requests_per_tick",
            DownloadWatchdogSecs => "watchdog_secs",
            DownloadResumeMinSize => "resume_min_size",
            DownloadResumeResponseCodes => "resume_response_codes",
            DownloadFailedTryAgain => "failed_try_again",
            DownloadRetryDelayMs => "retry_delay_ms",
            DownloadTimeoutSecs => "timeout_secs",
            RemoteMainUrl => "main_url",
            RemoteFallbackUrl => "fallback_url",
            RemotePackage => "package",
            LoggingLevel => "level",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string; empty when an optional value is unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        use ConfigKey::*;
        match self {
            CacheDirectory => config.cache.directory.display().to_string(),
            CacheVerifyLevel => config.cache.verify_level.to_string(),
            CacheVerifyMaxConcurrency => config.cache.verify_max_concurrency.to_string(),
            CacheInstallClearMode => config.cache.install_clear_mode.to_string(),
            CacheDisableOnDemandDownload => config.cache.disable_on_demand_download.to_string(),
            CacheClearFilesPerTick => config.cache.clear_files_per_tick.to_string(),
            DownloadMaxConcurrency => config.download.max_concurrency.to_string(),
            DownloadMaxRequestsPerTick => config.download.max_requests_per_tick.to_string(),
            DownloadWatchdogSecs => config.download.watchdog_secs.to_string(),
            DownloadResumeMinSize => config.download.resume_min_size.to_string(),
            DownloadResumeResponseCodes => config
                .download
                .resume_response_codes
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(","),
            DownloadFailedTryAgain => config.download.failed_try_again.to_string(),
            DownloadRetryDelayMs => config.download.retry_delay_ms.to_string(),
            DownloadTimeoutSecs => config.download.timeout_secs.to_string(),
            RemoteMainUrl => config.remote.main_url.clone().unwrap_or_default(),
            RemoteFallbackUrl => config.remote.fallback_url.clone().unwrap_or_default(),
            RemotePackage => config.remote.package.clone(),
            LoggingLevel => config.logging.level.clone(),
            LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Validate and store `value`. An empty value clears optional keys.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> ConfigResult<()> {
        use ConfigKey::*;
        let value = value.trim();
        match self {
            CacheDirectory => config.cache.directory = self.parse_path(value)?,
            CacheVerifyLevel => config.cache.verify_level = self.parse_with(value)?,
            CacheVerifyMaxConcurrency => {
                config.cache.verify_max_concurrency = self.parse_positive(value)?
            }
            CacheInstallClearMode => config.cache.install_clear_mode = self.parse_with(value)?,
            CacheDisableOnDemandDownload => {
                config.cache.disable_on_demand_download = self.parse_bool(value)?
            }
            CacheClearFilesPerTick => {
                config.cache.clear_files_per_tick = self.parse_positive(value)?
            }
            DownloadMaxConcurrency => config.download.max_concurrency = self.parse_positive(value)?,
            DownloadMaxRequestsPerTick => {
                config.download.max_requests_per_tick = self.parse_positive(value)?
            }
            DownloadWatchdogSecs => config.download.watchdog_secs = self.parse_number(value)?,
            DownloadResumeMinSize => config.download.resume_min_size = self.parse_number(value)?,
            DownloadResumeResponseCodes => {
                config.download.resume_response_codes = self.parse_codes(value)?
            }
            DownloadFailedTryAgain => config.download.failed_try_again = self.parse_number(value)?,
            DownloadRetryDelayMs => config.download.retry_delay_ms = self.parse_number(value)?,
            DownloadTimeoutSecs => config.download.timeout_secs = self.parse_positive(value)?,
            RemoteMainUrl => config.remote.main_url = optional(value),
            RemoteFallbackUrl => config.remote.fallback_url = optional(value),
            RemotePackage => {
                if value.is_empty() {
                    return Err(self.invalid(value, "package name cannot be empty"));
                }
                config.remote.package = value.to_string();
            }
            LoggingLevel => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(self.invalid(
                        value,
                        &format!("expected one of {}", LOG_LEVELS.join(", ")),
                    ));
                }
                config.logging.level = level;
            }
            LoggingDirectory => config.logging.directory = optional(value).map(expand_tilde),
        }
        Ok(())
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn parse_with<T: FromStr<Err = String>>(&self, value: &str) -> ConfigResult<T> {
        value.parse().map_err(|e: String| self.invalid(value, &e))
    }

    fn parse_number<T: FromStr>(&self, value: &str) -> ConfigResult<T> {
        value
            .parse()
            .map_err(|_| self.invalid(value, "expected a non-negative integer"))
    }

    fn parse_positive<T: FromStr + PartialOrd + Default>(&self, value: &str) -> ConfigResult<T> {
        match value.parse::<T>() {
            Ok(n) if n > T::default() => Ok(n),
            _ => Err(self.invalid(value, "expected a positive integer")),
        }
    }

    fn parse_bool(&self, value: &str) -> ConfigResult<bool> {
        match value.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(self.invalid(value, "expected true or false")),
        }
    }

    fn parse_path(&self, value: &str) -> ConfigResult<PathBuf> {
        if value.is_empty() {
            return Err(self.invalid(value, "path cannot be empty"));
        }
        Ok(expand_tilde(value.to_string()))
    }

    fn parse_codes(&self, value: &str) -> ConfigResult<Vec<u16>> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u16>()
                    .map_err(|_| self.invalid(value, "expected comma-separated HTTP status codes"))
            })
            .collect()
    }
}

impl FromStr for ConfigKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ALL_KEYS
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| format!("unknown configuration key: {}", s))
    }
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn expand_tilde(value: String) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(&value)),
        None => PathBuf::from(value),
    }
}
