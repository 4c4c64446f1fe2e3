//! Common types and utilities shared across CLI commands.

use std::future::Future;
use std::sync::Arc;

use bundlecache::config::ConfigFile;
use bundlecache::download::{FsLocalCopy, HttpDownloadBackend};
use bundlecache::fs::{DefaultRemoteServices, FileSystemServices};
use bundlecache::operation::{drive_to_completion, DEFAULT_TICK_INTERVAL};
use bundlecache::{CacheFileSystem, Operation, OperationStatus, PackageManifest};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// Configuration plus the package a command works on.
pub struct CliContext {
    config: ConfigFile,
    package: String,
}

impl CliContext {
    /// Load the config file; `package` overrides `remote.package`.
    pub fn new(package: Option<String>) -> Self {
        let config = ConfigFile::load().unwrap_or_default();
        let package = package.unwrap_or_else(|| config.remote.package.clone());
        Self { config, package }
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// File system with HTTP downloads; requires `remote.main_url`.
    pub fn open_file_system(&self) -> Result<CacheFileSystem, CliError> {
        let remote = self.config.remote_services().map_err(|e| {
            CliError::Config(format!(
                "{}. Use 'bundlecache config set remote.main_url <url>' first.",
                e
            ))
        })?;
        self.build_file_system(remote)
    }

    /// File system for commands that never touch the network.
    pub fn open_offline_file_system(&self) -> Result<CacheFileSystem, CliError> {
        let remote = self
            .config
            .remote_services()
            .unwrap_or_else(|_| DefaultRemoteServices::single(""));
        self.build_file_system(remote)
    }

    fn build_file_system(
        &self,
        remote: DefaultRemoteServices,
    ) -> Result<CacheFileSystem, CliError> {
        let backend = HttpDownloadBackend::new()
            .map_err(|e| CliError::Config(format!("Failed to create HTTP client: {}", e)))?;
        let services = FileSystemServices::new(Arc::new(remote), Arc::new(backend))
            .with_local_copy(Arc::new(FsLocalCopy));
        Ok(CacheFileSystem::new(
            self.config.to_file_system_config(&self.package),
            services,
        ))
    }
}

/// Tokio runtime plus a Ctrl+C cancellation token for driving operations.
pub struct OperationRunner {
    runtime: Runtime,
    cancel: CancellationToken,
}

impl OperationRunner {
    /// Build the runtime and install the Ctrl+C handler. Call once per process.
    pub fn new() -> Result<Self, CliError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        let cancel = CancellationToken::new();
        let handler_token = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!();
            eprintln!("Received interrupt, stopping...");
            handler_token.cancel();
        })
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

        Ok(Self { runtime, cancel })
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Drive `op` to completion, mapping failure and cancellation to errors.
    pub fn run<O: Operation>(
        &self,
        fs: &mut CacheFileSystem,
        op: &mut O,
        what: &str,
    ) -> Result<(), CliError> {
        let status = self.runtime.block_on(drive_to_completion(
            fs,
            op,
            DEFAULT_TICK_INTERVAL,
            &self.cancel,
        ));
        if self.cancel.is_cancelled() {
            return Err(CliError::Cancelled);
        }
        match status {
            OperationStatus::Succeed => Ok(()),
            _ => Err(CliError::Operation {
                what: what.to_string(),
                reason: op.error().unwrap_or("unknown error").to_string(),
            }),
        }
    }

    /// Scan the cache directory.
    pub fn initialize(&self, fs: &mut CacheFileSystem) -> Result<(), CliError> {
        let mut op = fs.initialize();
        self.run(fs, &mut op, "Cache initialization")?;
        tracing::debug!(
            committed = op.committed(),
            removed = op.removed(),
            "Cache initialized"
        );
        Ok(())
    }

    /// Load a manifest version, downloading it when not cached locally.
    pub fn load_manifest(
        &self,
        fs: &mut CacheFileSystem,
        version: &str,
        config: &ConfigFile,
    ) -> Result<Arc<PackageManifest>, CliError> {
        let mut op = fs.load_package_manifest(version, config.request_timeout());
        self.run(fs, &mut op, "Manifest load")?;
        op.manifest().ok_or_else(|| CliError::Operation {
            what: "Manifest load".to_string(),
            reason: "no manifest produced".to_string(),
        })
    }
}

/// Format a byte count using binary units.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
