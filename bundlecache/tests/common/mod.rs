//! Shared fixtures for the integration tests.
//!
//! Every test runs a [`CacheFileSystem`] against a [`MemoryBackend`] that
//! serves `mem://main/<file>` and `mem://fallback/<file>`, with the cache
//! rooted in a fresh temporary directory.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use bundlecache::download::{DownloadSettings, MemoryBackend};
use bundlecache::fs::{DefaultRemoteServices, FileSystemConfig, FileSystemServices};
use bundlecache::manifest::calculate_checksum;
use bundlecache::operation::wait_for_completion;
use bundlecache::{BundleDescriptor, CacheFileSystem, Operation, OperationStatus};

pub const PACKAGE: &str = "DefaultPackage";
pub const MAIN: &str = "mem://main";
pub const FALLBACK: &str = "mem://fallback";

// ============================================================================
// Fixtures
// ============================================================================

/// Deterministic payload of `len` bytes.
pub fn payload(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Descriptor matching `data`, with a content hash so folders spread.
pub fn descriptor(name: &str, data: &[u8]) -> BundleDescriptor {
    BundleDescriptor::new(
        name,
        format!("guid-{}", name),
        format!("{}.bundle", name),
        data.len() as u64,
        crc32fast::hash(data),
    )
    .with_hash(calculate_checksum(data))
}

pub fn main_url(bundle: &BundleDescriptor) -> String {
    format!("{}/{}", MAIN, bundle.file_name)
}

pub fn fallback_url(bundle: &BundleDescriptor) -> String {
    format!("{}/{}", FALLBACK, bundle.file_name)
}

/// Settings with no retry pause so failure paths finish quickly.
pub fn fast_settings() -> DownloadSettings {
    DownloadSettings::default().with_retry_delay(Duration::ZERO)
}

pub fn config(root: &TempDir) -> FileSystemConfig {
    FileSystemConfig::new(PACKAGE, root.path()).with_download(fast_settings())
}

pub fn services(backend: &MemoryBackend) -> FileSystemServices {
    FileSystemServices::new(
        Arc::new(DefaultRemoteServices::new(MAIN, FALLBACK)),
        Arc::new(backend.clone()),
    )
}

/// File system over `backend` with default test configuration.
pub fn file_system(root: &TempDir, backend: &MemoryBackend) -> CacheFileSystem {
    CacheFileSystem::new(config(root), services(backend))
}

// ============================================================================
// Driving
// ============================================================================

/// Run an operation to completion and assert it succeeded.
pub fn run_ok<O: Operation>(fs: &mut CacheFileSystem, op: &mut O) {
    let status = wait_for_completion(fs, op);
    assert_eq!(
        status,
        OperationStatus::Succeed,
        "operation failed: {:?}",
        op.error()
    );
}

/// Run an operation to completion and return its error text.
pub fn run_err<O: Operation>(fs: &mut CacheFileSystem, op: &mut O) -> String {
    let status = wait_for_completion(fs, op);
    assert_eq!(status, OperationStatus::Failed);
    op.error().unwrap_or_default().to_string()
}

pub fn initialize(fs: &mut CacheFileSystem) {
    let mut op = fs.initialize();
    run_ok(fs, &mut op);
}

/// Download `bundle` with default options and assert success.
pub fn download(fs: &mut CacheFileSystem, bundle: &BundleDescriptor) {
    let options = bundlecache::fs::DownloadOptions::from_settings(&fs.config().download);
    let mut op = fs.download_file_async(bundle, options);
    run_ok(fs, &mut op);
}

/// Fresh file system over the same cache root, already initialized.
pub fn reopen(root: &TempDir, backend: &MemoryBackend) -> CacheFileSystem {
    let mut fs = file_system(root, backend);
    initialize(&mut fs);
    fs
}
