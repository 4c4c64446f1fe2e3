//! Cache file system façade.
//!
//! [`CacheFileSystem`] answers whether a bundle is cached, schedules
//! downloads through its own [`DownloadCenter`] and serves cached bytes to
//! an [`AssetContainerLoader`]. One instance manages one package; nothing
//! is global, so several packages can be cached side by side.
//!
//! Per bundle the façade walks this state machine:
//!
//! ```text
//! Absent ──download──► Downloading ──► Verifying ──► Cached
//!   ▲                                     │            │
//!   └────────── verify failed ────────────┘            │
//!   └────────────── cleared or found corrupted ────────┘
//! ```

mod clear_op;
mod config;
mod download_op;
mod init_op;
mod load_op;
mod services;

pub use clear_op::{ClearCacheOperation, ClearMode};
pub use config::{
    FileSystemConfig, DEFAULT_CLEAR_FILES_PER_TICK, DEFAULT_VERIFY_MAX_CONCURRENCY,
};
pub use download_op::{DownloadFileOperation, DownloadOptions};
pub use init_op::InitializeOperation;
pub use load_op::LoadBundleOperation;
pub use services::{
    AssetContainerLoader, BundlePayload, DecryptFileInfo, DecryptionServices,
    DefaultRemoteServices, FileSystemServices, LoadError, RawBundleLoader, RemoteServices,
};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{
    CacheError, CacheFileStatus, CacheLayout, CacheResult, CacheStore, FOOTPRINT_FILE_NAME,
};
use crate::download::{DownloadCenter, SharedTask, TaskContext};
use crate::manifest::{BundleDescriptor, PackageManifest};
use crate::sync::{LoadManifestOperation, RequestVersionOperation};

/// Bundle cache of one package.
pub struct CacheFileSystem {
    config: FileSystemConfig,
    services: FileSystemServices,
    store: CacheStore,
    center: DownloadCenter,
    request_failures: HashMap<&'static str, u32>,
}

impl CacheFileSystem {
    /// Create a file system. Call [`CacheFileSystem::initialize`] before use
    /// so files cached by earlier runs are found.
    pub fn new(config: FileSystemConfig, services: FileSystemServices) -> Self {
        let layout = CacheLayout::new(&config.cache_root, &config.package_name);
        let center = DownloadCenter::new(config.download.clone());
        Self {
            config,
            services,
            store: CacheStore::new(layout),
            center,
            request_failures: HashMap::new(),
        }
    }

    pub fn package_name(&self) -> &str {
        &self.config.package_name
    }

    pub fn config(&self) -> &FileSystemConfig {
        &self.config
    }

    pub fn layout(&self) -> &CacheLayout {
        self.store.layout()
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut CacheStore {
        &mut self.store
    }

    pub(crate) fn services(&self) -> &FileSystemServices {
        &self.services
    }

    pub fn download_center(&self) -> &DownloadCenter {
        &self.center
    }

    pub fn download_center_mut(&mut self) -> &mut DownloadCenter {
        &mut self.center
    }

    /// Scan the cache directory and load verified records.
    pub fn initialize(&self) -> InitializeOperation {
        InitializeOperation::new()
    }

    /// One scheduler tick.
    pub fn update(&mut self) {
        let mut ctx = TaskContext {
            store: &mut self.store,
            backend: self.services.backend.as_ref(),
            local_copy: self.services.local_copy.as_deref(),
            settings: &self.config.download,
            package_name: &self.config.package_name,
        };
        self.center.update(&mut ctx);
    }

    /// True when a verified copy of the bundle is cached.
    pub fn exists(&self, bundle: &BundleDescriptor) -> bool {
        self.store.exists(&bundle.guid)
    }

    /// True when loading the bundle would download it.
    pub fn need_download(&self, bundle: &BundleDescriptor) -> bool {
        !self.config.disable_on_demand_download && !self.exists(bundle)
    }

    pub fn file_count(&self) -> usize {
        self.store.index().len()
    }

    pub fn cached_bundle_guids(&self) -> Vec<String> {
        self.store.index().guids()
    }

    /// Download a bundle into the cache.
    pub fn download_file_async(
        &mut self,
        bundle: &BundleDescriptor,
        options: DownloadOptions,
    ) -> DownloadFileOperation {
        let (main_url, fallback_url) = match &options.import_file_path {
            Some(path) => {
                let url = crate::download::to_file_url(path);
                (url.clone(), url)
            }
            None => (
                self.services.remote.remote_main_url(&bundle.file_name),
                self.services.remote.remote_fallback_url(&bundle.file_name),
            ),
        };
        DownloadFileOperation::new(bundle.clone(), options, main_url, fallback_url)
    }

    /// Load a bundle as raw bytes, downloading it first when needed.
    pub fn load_bundle(
        &mut self,
        bundle: &BundleDescriptor,
    ) -> LoadBundleOperation<RawBundleLoader> {
        self.load_bundle_with(bundle, RawBundleLoader)
    }

    /// Load a bundle through a custom container loader.
    pub fn load_bundle_with<L: AssetContainerLoader>(
        &mut self,
        bundle: &BundleDescriptor,
        loader: L,
    ) -> LoadBundleOperation<L> {
        LoadBundleOperation::new(bundle.clone(), loader)
    }

    /// Remove cached files. Modes working from a manifest fail without one.
    pub fn clear_cache(
        &mut self,
        mode: ClearMode,
        manifest: Option<Arc<PackageManifest>>,
    ) -> ClearCacheOperation {
        ClearCacheOperation::new(mode, manifest)
    }

    /// Full CRC and size check of a cached bundle.
    pub fn verify_cache_file(&self, bundle: &BundleDescriptor) -> CacheFileStatus {
        CacheFileStatus::from(&self.store.verify_cache_file(&bundle.guid))
    }

    /// Cached bytes of a bundle, decrypted when the bundle is encrypted.
    pub fn read_bundle_file_data(&self, bundle: &BundleDescriptor) -> CacheResult<Vec<u8>> {
        if !bundle.encrypted {
            return self.store.read_bundle_bytes(&bundle.guid);
        }
        self.decrypt(bundle, false)
    }

    /// Cached bundle contents as text.
    pub fn read_bundle_file_text(&self, bundle: &BundleDescriptor) -> CacheResult<String> {
        let bytes = self.read_bundle_file_data(bundle)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Remove a bundle from the index and disk.
    pub fn delete_cache_bundle_file(&mut self, guid: &str) -> bool {
        self.store.delete_bundle_file(guid)
    }

    /// Fetch the latest package version string.
    pub fn request_package_version(
        &mut self,
        append_timestamp: bool,
        timeout: Duration,
    ) -> RequestVersionOperation {
        RequestVersionOperation::new(append_timestamp, timeout)
    }

    /// Download (unless cached), check and parse a manifest version.
    pub fn load_package_manifest(
        &mut self,
        version: impl Into<String>,
        timeout: Duration,
    ) -> LoadManifestOperation {
        LoadManifestOperation::new(version.into(), timeout)
    }

    pub(crate) fn decrypt(
        &self,
        bundle: &BundleDescriptor,
        fallback: bool,
    ) -> CacheResult<Vec<u8>> {
        let service = self
            .services
            .decryption
            .as_ref()
            .ok_or_else(|| CacheError::DecryptionUnavailable(bundle.guid.clone()))?;
        let record = self
            .store
            .record(&bundle.guid)
            .ok_or_else(|| CacheError::NotCached(bundle.guid.clone()))?;

        let info = DecryptFileInfo {
            bundle_name: &bundle.bundle_name,
            file_path: &record.data_file_path,
            file_crc: record.data_file_crc,
        };
        let result = if fallback {
            service.read_file_data_fallback(&info)
        } else {
            service.read_file_data(&info)
        };
        result.map_err(|e| CacheError::DecryptionFailed {
            guid: bundle.guid.clone(),
            reason: e.to_string(),
        })
    }

    pub(crate) fn request_download(&mut self, bundle: &BundleDescriptor, url: &str) -> SharedTask {
        let temp_path = self.store.layout().temp_path(&bundle.guid);
        self.center.download_file(bundle, url, temp_path)
    }

    pub(crate) fn release_download(&mut self, task: &SharedTask) {
        self.center.release(task);
    }

    /// Main URL until a request of this kind fails, then alternate.
    pub(crate) fn request_url(&self, kind: &'static str, file_name: &str) -> String {
        let failures = self.request_failures.get(kind).copied().unwrap_or(0);
        if failures % 2 == 0 {
            self.services.remote.remote_main_url(file_name)
        } else {
            self.services.remote.remote_fallback_url(file_name)
        }
    }

    pub(crate) fn record_request_failure(&mut self, kind: &'static str) {
        *self.request_failures.entry(kind).or_insert(0) += 1;
    }

    /// Delete manifest files, keeping the footprint and anything `keep` accepts.
    pub(crate) fn delete_manifest_files<F>(&self, keep: F) -> usize
    where
        F: Fn(&Path) -> bool,
    {
        self.store.delete_manifest_files(|path| {
            path.file_name().is_some_and(|n| n == FOOTPRINT_FILE_NAME) || keep(path)
        })
    }
}

impl Drop for CacheFileSystem {
    fn drop(&mut self) {
        if self.center.task_count() > 0 {
            debug!(package = %self.config.package_name, "Aborting downloads on shutdown");
        }
        self.center.abort_all();
    }
}
