//! Collaborators injected into the cache file system.
//!
//! The file system never talks to an engine or a CDN directly; it goes
//! through these narrow traits so each can be swapped or mocked.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::download::{DownloadBackend, LocalCopyService};
use crate::manifest::BundleDescriptor;

/// Resolves bundle file names to download URLs.
pub trait RemoteServices: Send + Sync {
    fn remote_main_url(&self, file_name: &str) -> String;
    fn remote_fallback_url(&self, file_name: &str) -> String;
}

/// Joins file names onto a main and a fallback base URL.
#[derive(Debug, Clone)]
pub struct DefaultRemoteServices {
    main: String,
    fallback: String,
}

impl DefaultRemoteServices {
    pub fn new(main: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            main: main.into(),
            fallback: fallback.into(),
        }
    }

    /// Use the same server for both URLs.
    pub fn single(base: impl Into<String>) -> Self {
        let base = base.into();
        Self::new(base.clone(), base)
    }
}

fn join_url(base: &str, file_name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), file_name)
}

impl RemoteServices for DefaultRemoteServices {
    fn remote_main_url(&self, file_name: &str) -> String {
        join_url(&self.main, file_name)
    }

    fn remote_fallback_url(&self, file_name: &str) -> String {
        join_url(&self.fallback, file_name)
    }
}

/// What a decryption service needs to know about an encrypted file.
#[derive(Debug, Clone, Copy)]
pub struct DecryptFileInfo<'a> {
    pub bundle_name: &'a str,
    pub file_path: &'a Path,
    pub file_crc: u32,
}

/// Turns encrypted bundle files into plain bytes.
pub trait DecryptionServices: Send + Sync {
    fn read_file_data(&self, info: &DecryptFileInfo<'_>) -> io::Result<Vec<u8>>;

    /// Used when loading the primary result failed but the file verified.
    fn read_file_data_fallback(&self, info: &DecryptFileInfo<'_>) -> io::Result<Vec<u8>> {
        self.read_file_data(info)
    }
}

/// Error reported by an asset-container loader.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct LoadError(pub String);

/// Engine boundary: turns cached bundle bytes into a usable container.
pub trait AssetContainerLoader {
    type Container;

    fn load_from_file(
        &mut self,
        bundle: &BundleDescriptor,
        path: &Path,
    ) -> Result<Self::Container, LoadError>;

    fn load_from_memory(
        &mut self,
        bundle: &BundleDescriptor,
        bytes: Vec<u8>,
    ) -> Result<Self::Container, LoadError>;
}

/// Raw bytes of a loaded bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePayload {
    pub bundle_name: String,
    pub bytes: Vec<u8>,
}

/// Loader returning bundle bytes as-is.
///
/// Files whose CRC disagrees with the manifest are rejected, the same way
/// an engine refuses a container with a damaged header.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawBundleLoader;

impl AssetContainerLoader for RawBundleLoader {
    type Container = BundlePayload;

    fn load_from_file(
        &mut self,
        bundle: &BundleDescriptor,
        path: &Path,
    ) -> Result<BundlePayload, LoadError> {
        let bytes = fs::read(path)
            .map_err(|e| LoadError(format!("failed to read {}: {}", path.display(), e)))?;
        let crc = crc32fast::hash(&bytes);
        if crc != bundle.file_crc {
            return Err(LoadError(format!(
                "bundle {} has crc {:08x}, expected {:08x}",
                bundle.bundle_name, crc, bundle.file_crc
            )));
        }
        Ok(BundlePayload {
            bundle_name: bundle.bundle_name.clone(),
            bytes,
        })
    }

    fn load_from_memory(
        &mut self,
        bundle: &BundleDescriptor,
        bytes: Vec<u8>,
    ) -> Result<BundlePayload, LoadError> {
        Ok(BundlePayload {
            bundle_name: bundle.bundle_name.clone(),
            bytes,
        })
    }
}

/// Every collaborator of a file system instance.
#[derive(Clone)]
pub struct FileSystemServices {
    pub remote: Arc<dyn RemoteServices>,
    pub backend: Arc<dyn DownloadBackend>,
    pub decryption: Option<Arc<dyn DecryptionServices>>,
    pub local_copy: Option<Arc<dyn LocalCopyService>>,
}

impl FileSystemServices {
    pub fn new(remote: Arc<dyn RemoteServices>, backend: Arc<dyn DownloadBackend>) -> Self {
        Self {
            remote,
            backend,
            decryption: None,
            local_copy: None,
        }
    }

    pub fn with_decryption(mut self, decryption: Arc<dyn DecryptionServices>) -> Self {
        self.decryption = Some(decryption);
        self
    }

    pub fn with_local_copy(mut self, local_copy: Arc<dyn LocalCopyService>) -> Self {
        self.local_copy = Some(local_copy);
        self
    }
}
