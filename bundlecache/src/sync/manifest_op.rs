//! Download, verification and parsing of a package manifest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{manifest_file_name, manifest_hash_file_name};
use crate::download::{DownloadRequest, FileRequestArgs, RequestStatus};
use crate::fs::CacheFileSystem;
use crate::manifest::{calculate_checksum, PackageManifest};
use crate::operation::{Operation, OperationState, OperationStatus};

const HASH_FAILURE_KEY: &str = "manifest-hash";
const MANIFEST_FAILURE_KEY: &str = "manifest";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    DownloadHash,
    DownloadManifest,
    Load,
    Done,
}

/// Loads one manifest version, fetching its files on first use.
///
/// Once the files are local, the manifest bytes must hash to the value in
/// the hash file and decode to the expected package and version. Any
/// failure at that point deletes both files so the next attempt fetches
/// them again.
pub struct LoadManifestOperation {
    version: String,
    timeout: Duration,
    stage: Stage,
    request: Option<Box<dyn DownloadRequest>>,
    manifest: Option<Arc<PackageManifest>>,
    state: OperationState,
}

impl LoadManifestOperation {
    pub(crate) fn new(version: String, timeout: Duration) -> Self {
        Self {
            version,
            timeout,
            stage: Stage::DownloadHash,
            request: None,
            manifest: None,
            state: OperationState::default(),
        }
    }

    pub fn package_version(&self) -> &str {
        &self.version
    }

    /// The loaded manifest once the operation succeeded.
    pub fn manifest(&self) -> Option<Arc<PackageManifest>> {
        self.manifest.clone()
    }

    fn fail(&mut self, reason: String) {
        warn!(version = %self.version, reason = %reason, "Manifest load failed");
        self.stage = Stage::Done;
        self.state.fail(reason);
    }

    /// Drive the download of one manifest file. Returns true once it is on disk.
    fn fetch(
        &mut self,
        fs: &mut CacheFileSystem,
        key: &'static str,
        remote_name: &str,
        local: PathBuf,
    ) -> bool {
        let Some(request) = self.request.as_mut() else {
            if local.exists() {
                return true;
            }
            let url = fs.request_url(key, remote_name);
            debug!(url = %url, path = %local.display(), "Downloading manifest file");
            let mut request = fs.services().backend.create_file_request(FileRequestArgs {
                url,
                save_path: local,
                timeout: Some(self.timeout),
                watchdog: fs.config().download.watchdog_time,
                resume_from: 0,
                remove_file_on_abort: true,
            });
            request.send();
            self.request = Some(request);
            return false;
        };

        request.poll();
        match request.status() {
            RequestStatus::Succeed => {
                self.request = None;
                true
            }
            RequestStatus::Failed | RequestStatus::Aborted => {
                let error = request
                    .error()
                    .unwrap_or_else(|| "manifest request failed".to_string());
                self.request = None;
                remove_if_exists(&local);
                fs.record_request_failure(key);
                self.fail(format!("failed to download {}: {}", remote_name, error));
                false
            }
            RequestStatus::None | RequestStatus::Running => false,
        }
    }

    fn load(&mut self, fs: &CacheFileSystem) {
        let hash_path = fs.layout().manifest_hash_path(&self.version);
        let manifest_path = fs.layout().manifest_path(&self.version);

        match read_and_check(fs.package_name(), &self.version, &hash_path, &manifest_path) {
            Ok(manifest) => {
                info!(
                    package = %manifest.package_name,
                    version = %manifest.package_version,
                    bundles = manifest.bundles.len(),
                    "Manifest loaded"
                );
                self.manifest = Some(Arc::new(manifest));
                self.stage = Stage::Done;
                self.state.succeed();
            }
            Err(reason) => {
                remove_if_exists(&hash_path);
                remove_if_exists(&manifest_path);
                self.fail(reason);
            }
        }
    }
}

fn read_and_check(
    package_name: &str,
    version: &str,
    hash_path: &Path,
    manifest_path: &Path,
) -> Result<PackageManifest, String> {
    let expected = fs::read_to_string(hash_path)
        .map_err(|e| format!("failed to read manifest hash file: {}", e))?;
    let expected = expected.trim();
    if expected.is_empty() {
        return Err("manifest hash file is empty".to_string());
    }

    let bytes =
        fs::read(manifest_path).map_err(|e| format!("failed to read manifest file: {}", e))?;
    let actual = calculate_checksum(&bytes);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(format!(
            "manifest hash mismatch: expected {}, found {}",
            expected, actual
        ));
    }

    let manifest = PackageManifest::from_bytes(&bytes).map_err(|e| e.to_string())?;
    manifest
        .ensure_identity(package_name, version)
        .map_err(|e| e.to_string())?;
    Ok(manifest)
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove manifest file");
        }
    }
}

impl Operation for LoadManifestOperation {
    fn update(&mut self, fs: &mut CacheFileSystem) {
        if self.state.is_done() {
            return;
        }
        self.state.processing();

        let package = fs.package_name().to_string();
        if self.stage == Stage::DownloadHash {
            let local = fs.layout().manifest_hash_path(&self.version);
            let remote = manifest_hash_file_name(&package, &self.version);
            if !self.fetch(fs, HASH_FAILURE_KEY, &remote, local) {
                return;
            }
            self.stage = Stage::DownloadManifest;
        }
        if self.stage == Stage::DownloadManifest {
            let local = fs.layout().manifest_path(&self.version);
            let remote = manifest_file_name(&package, &self.version);
            if !self.fetch(fs, MANIFEST_FAILURE_KEY, &remote, local) {
                return;
            }
            self.stage = Stage::Load;
        }
        if self.stage == Stage::Load {
            self.load(fs);
        }
    }

    fn status(&self) -> OperationStatus {
        self.state.status
    }

    fn error(&self) -> Option<&str> {
        self.state.error()
    }

    fn progress(&self) -> f32 {
        match self.stage {
            Stage::DownloadHash => 0.0,
            Stage::DownloadManifest => 0.3,
            Stage::Load => 0.9,
            Stage::Done => 1.0,
        }
    }

    fn abort(&mut self, _fs: &mut CacheFileSystem) {
        if self.state.is_done() {
            return;
        }
        if let Some(mut request) = self.request.take() {
            request.abort();
        }
        self.stage = Stage::Done;
        self.state.fail("user abort");
    }
}
