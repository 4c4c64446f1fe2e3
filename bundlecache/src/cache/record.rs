//! Cache records and the info sidecar.

use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{CacheError, CacheResult};

/// Verification status of a cached file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyState {
    /// Found on disk but not yet checked.
    Unverified,
    /// Checked against the info sidecar.
    Verified,
    /// Failed a check; the record is about to be removed.
    Corrupt,
}

/// Metadata persisted next to every cached data file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    pub file_name: String,
    pub crc: u32,
    pub size: u64,
}

impl BundleInfo {
    /// Load an info sidecar.
    pub fn load(path: &Path) -> CacheResult<Self> {
        let file = fs::File::open(path).map_err(|e| CacheError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|e| CacheError::InvalidInfo {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save the sidecar, replacing any previous one atomically.
    pub fn save(&self, path: &Path) -> CacheResult<()> {
        let write_failed = |source: io::Error| CacheError::WriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let temp_path = path.with_extension("tmp");
        let file = fs::File::create(&temp_path).map_err(write_failed)?;
        bincode::serialize_into(BufWriter::new(file), self)
            .map_err(|e| write_failed(io::Error::other(e.to_string())))?;

        fs::rename(&temp_path, path).map_err(write_failed)
    }
}

/// One entry of the cache index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub bundle_guid: String,
    pub data_file_path: PathBuf,
    pub info_file_path: PathBuf,
    pub data_file_crc: u32,
    pub data_file_size: u64,
    pub verify_state: VerifyState,
}

impl CacheRecord {
    /// Folder that holds the data and info files.
    pub fn folder(&self) -> Option<&Path> {
        self.info_file_path.parent()
    }

    /// Remove the bundle folder from disk.
    ///
    /// Returns `Ok(false)` when the folder was already gone.
    pub fn delete_folder(&self) -> io::Result<bool> {
        let Some(folder) = self.folder() else {
            return Ok(false);
        };
        match fs::remove_dir_all(folder) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
