//! Directory layout of a package cache.

use std::path::{Path, PathBuf};

use crate::manifest::BundleDescriptor;

/// Name of the bundle payload inside each bundle folder.
pub const DATA_FILE_NAME: &str = "__data";

/// Name of the sidecar metadata file inside each bundle folder.
pub const INFO_FILE_NAME: &str = "__info";

/// Extension of in-flight download files.
pub const TEMP_FILE_EXTENSION: &str = "temp";

const BUNDLES_DIR: &str = "bundles";
const MANIFEST_DIR: &str = "manifest";
const TEMP_DIR: &str = "temp";

/// Resolves every path the cache reads or writes for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    package_root: PathBuf,
    bundles_root: PathBuf,
    manifest_root: PathBuf,
    temp_root: PathBuf,
}

impl CacheLayout {
    /// Layout rooted at `<cache_root>/<package_name>`.
    pub fn new(cache_root: &Path, package_name: &str) -> Self {
        let package_root = cache_root.join(package_name);
        Self {
            bundles_root: package_root.join(BUNDLES_DIR),
            manifest_root: package_root.join(MANIFEST_DIR),
            temp_root: package_root.join(TEMP_DIR),
            package_root,
        }
    }

    pub fn package_root(&self) -> &Path {
        &self.package_root
    }

    pub fn bundles_root(&self) -> &Path {
        &self.bundles_root
    }

    pub fn manifest_root(&self) -> &Path {
        &self.manifest_root
    }

    pub fn temp_root(&self) -> &Path {
        &self.temp_root
    }

    /// Folder holding a bundle's data and info files.
    pub fn bundle_dir(&self, bundle: &BundleDescriptor) -> PathBuf {
        self.bundles_root
            .join(bundle.folder_prefix())
            .join(&bundle.guid)
    }

    /// Final location of a bundle's data file.
    ///
    /// The name is fixed so a remote file name never reaches the disk.
    pub fn bundle_data_path(&self, bundle: &BundleDescriptor) -> PathBuf {
        self.bundle_dir(bundle).join(DATA_FILE_NAME)
    }

    /// Location of a bundle's info sidecar.
    pub fn bundle_info_path(&self, bundle: &BundleDescriptor) -> PathBuf {
        self.bundle_dir(bundle).join(INFO_FILE_NAME)
    }

    /// Download target for a bundle before it is promoted into the cache.
    pub fn temp_path(&self, guid: &str) -> PathBuf {
        self.temp_root
            .join(format!("{}.{}", guid, TEMP_FILE_EXTENSION))
    }

    /// Local copy of a manifest version.
    pub fn manifest_path(&self, version: &str) -> PathBuf {
        self.manifest_root.join(format!("{}.bytes", version))
    }

    /// Local copy of a manifest's hash file.
    pub fn manifest_hash_path(&self, version: &str) -> PathBuf {
        self.manifest_root.join(format!("{}.hash", version))
    }
}
