//! Loading a bundle through an asset-container loader.

use std::fs;

use tracing::{error, warn};

use super::download_op::{DownloadFileOperation, DownloadOptions};
use super::services::{AssetContainerLoader, LoadError};
use super::CacheFileSystem;
use crate::cache::VerifyResult;
use crate::manifest::BundleDescriptor;
use crate::operation::{Operation, OperationState, OperationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    CheckExists,
    Download,
    Load,
    Done,
}

/// Makes a bundle available as a loaded container.
///
/// Missing bundles are downloaded first unless on-demand download is
/// disabled. When the loader rejects a cached file, the file is verified:
/// a valid file is retried from memory, a corrupted one is deleted so the
/// next access downloads it again.
pub struct LoadBundleOperation<L: AssetContainerLoader> {
    bundle: BundleDescriptor,
    loader: L,
    stage: Stage,
    download: Option<DownloadFileOperation>,
    container: Option<L::Container>,
    state: OperationState,
}

impl<L: AssetContainerLoader> LoadBundleOperation<L> {
    pub(crate) fn new(bundle: BundleDescriptor, loader: L) -> Self {
        Self {
            bundle,
            loader,
            stage: Stage::CheckExists,
            download: None,
            container: None,
            state: OperationState::default(),
        }
    }

    pub fn bundle(&self) -> &BundleDescriptor {
        &self.bundle
    }

    pub fn container(&self) -> Option<&L::Container> {
        self.container.as_ref()
    }

    pub fn take_container(&mut self) -> Option<L::Container> {
        self.container.take()
    }

    fn fail(&mut self, reason: String) {
        error!(bundle = %self.bundle.bundle_name, reason = %reason, "Bundle load failed");
        self.stage = Stage::Done;
        self.state.fail(reason);
    }

    fn load_primary(&mut self, fs: &CacheFileSystem) -> Result<L::Container, LoadError> {
        if self.bundle.encrypted {
            let bytes = fs
                .read_bundle_file_data(&self.bundle)
                .map_err(|e| LoadError(e.to_string()))?;
            return self.loader.load_from_memory(&self.bundle, bytes);
        }

        let record = fs
            .store()
            .record(&self.bundle.guid)
            .ok_or_else(|| LoadError(format!("bundle {} is not cached", self.bundle.bundle_name)))?;
        let path = record.data_file_path.clone();
        self.loader.load_from_file(&self.bundle, &path)
    }

    fn load_fallback(&mut self, fs: &CacheFileSystem) -> Result<L::Container, LoadError> {
        let bytes = if self.bundle.encrypted {
            fs.decrypt(&self.bundle, true)
                .map_err(|e| LoadError(e.to_string()))?
        } else {
            let record = fs
                .store()
                .record(&self.bundle.guid)
                .ok_or_else(|| {
                    LoadError(format!("bundle {} is not cached", self.bundle.bundle_name))
                })?;
            fs::read(&record.data_file_path).map_err(|e| LoadError(e.to_string()))?
        };
        self.loader.load_from_memory(&self.bundle, bytes)
    }

    fn load(&mut self, fs: &mut CacheFileSystem) {
        if self.bundle.encrypted && fs.services().decryption.is_none() {
            self.fail(format!(
                "bundle {} is encrypted but no decryption service is configured",
                self.bundle.bundle_name
            ));
            return;
        }

        let primary_error = match self.load_primary(fs) {
            Ok(container) => {
                self.container = Some(container);
                self.stage = Stage::Done;
                self.state.succeed();
                return;
            }
            Err(e) => e,
        };

        warn!(
            bundle = %self.bundle.bundle_name,
            error = %primary_error,
            "Bundle load failed, verifying cached file"
        );

        let result = fs.store().verify_cache_file(&self.bundle.guid);
        if result == VerifyResult::Succeed {
            match self.load_fallback(fs) {
                Ok(container) => {
                    self.container = Some(container);
                    self.stage = Stage::Done;
                    self.state.succeed();
                }
                Err(e) => self.fail(format!(
                    "failed to load bundle {}: {}",
                    self.bundle.bundle_name, e
                )),
            }
            return;
        }

        fs.delete_cache_bundle_file(&self.bundle.guid);
        self.fail(format!(
            "corrupted bundle file {} deleted: {}",
            self.bundle.bundle_name, result
        ));
    }
}

impl<L: AssetContainerLoader> Operation for LoadBundleOperation<L> {
    fn update(&mut self, fs: &mut CacheFileSystem) {
        if self.state.is_done() {
            return;
        }
        self.state.processing();

        match self.stage {
            Stage::CheckExists => {
                if fs.exists(&self.bundle) {
                    self.stage = Stage::Load;
                } else if fs.config().disable_on_demand_download {
                    self.fail(format!(
                        "bundle {} is not cached and on-demand download is disabled",
                        self.bundle.bundle_name
                    ));
                    return;
                } else {
                    let options = DownloadOptions::from_settings(&fs.config().download);
                    self.download = Some(fs.download_file_async(&self.bundle, options));
                    self.stage = Stage::Download;
                }
                self.update(fs);
            }
            Stage::Download => {
                let Some(download) = self.download.as_mut() else {
                    self.stage = Stage::CheckExists;
                    return;
                };
                download.update(fs);
                if !download.is_done() {
                    return;
                }
                if download.status() == OperationStatus::Succeed {
                    self.download = None;
                    self.stage = Stage::Load;
                    self.load(fs);
                } else {
                    let reason = download.error().unwrap_or("download failed").to_string();
                    self.download = None;
                    self.fail(reason);
                }
            }
            Stage::Load => self.load(fs),
            Stage::Done => {}
        }
    }

    fn status(&self) -> OperationStatus {
        self.state.status
    }

    fn error(&self) -> Option<&str> {
        self.state.error()
    }

    fn progress(&self) -> f32 {
        match (&self.download, self.state.status) {
            (_, OperationStatus::Succeed) => 1.0,
            (Some(download), _) => download.progress(),
            _ => 0.0,
        }
    }

    fn abort(&mut self, fs: &mut CacheFileSystem) {
        if self.state.is_done() {
            return;
        }
        if let Some(mut download) = self.download.take() {
            download.abort(fs);
        }
        self.stage = Stage::Done;
        self.state.fail("user abort");
    }
}
