//! Configuration for a cache file system instance.

use std::path::PathBuf;

use crate::cache::{InstallClearMode, VerifyLevel};
use crate::download::DownloadSettings;

/// Default number of threads verifying cached files at startup.
pub const DEFAULT_VERIFY_MAX_CONCURRENCY: usize = 4;

/// Default number of bundles deleted per tick by clear operations.
pub const DEFAULT_CLEAR_FILES_PER_TICK: usize = 32;

/// Configuration of one package's cache.
#[derive(Debug, Clone)]
pub struct FileSystemConfig {
    /// Package whose bundles this instance caches.
    pub package_name: String,

    /// Directory holding the caches of all packages.
    pub cache_root: PathBuf,

    /// Marker of the running application; a change triggers
    /// `install_clear_mode`.
    pub app_footprint: String,

    /// What to clear after an overwrite install.
    pub install_clear_mode: InstallClearMode,

    /// Thoroughness of the startup scan.
    pub verify_level: VerifyLevel,

    /// Threads used by the startup scan.
    pub verify_max_concurrency: usize,

    /// Refuse to download missing bundles when they are loaded.
    pub disable_on_demand_download: bool,

    /// Bundles deleted per tick by clear operations.
    pub clear_files_per_tick: usize,

    pub download: DownloadSettings,
}

impl FileSystemConfig {
    /// Create a configuration with defaults for everything but the location.
    pub fn new(package_name: impl Into<String>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            package_name: package_name.into(),
            cache_root: cache_root.into(),
            app_footprint: crate::VERSION.to_string(),
            install_clear_mode: InstallClearMode::default(),
            verify_level: VerifyLevel::default(),
            verify_max_concurrency: DEFAULT_VERIFY_MAX_CONCURRENCY,
            disable_on_demand_download: false,
            clear_files_per_tick: DEFAULT_CLEAR_FILES_PER_TICK,
            download: DownloadSettings::default(),
        }
    }

    pub fn with_app_footprint(mut self, footprint: impl Into<String>) -> Self {
        self.app_footprint = footprint.into();
        self
    }

    pub fn with_install_clear_mode(mut self, mode: InstallClearMode) -> Self {
        self.install_clear_mode = mode;
        self
    }

    pub fn with_verify_level(mut self, level: VerifyLevel) -> Self {
        self.verify_level = level;
        self
    }

    pub fn with_verify_max_concurrency(mut self, max: usize) -> Self {
        self.verify_max_concurrency = max.max(1);
        self
    }

    pub fn with_disable_on_demand_download(mut self, disable: bool) -> Self {
        self.disable_on_demand_download = disable;
        self
    }

    pub fn with_clear_files_per_tick(mut self, count: usize) -> Self {
        self.clear_files_per_tick = count.max(1);
        self
    }

    pub fn with_download(mut self, download: DownloadSettings) -> Self {
        self.download = download;
        self
    }
}
