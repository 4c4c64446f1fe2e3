//! CRC32 and size verification of cached and downloaded files.
//!
//! Cached files are checked at a configurable [`VerifyLevel`] during the
//! startup scan. Freshly downloaded temp files and explicit
//! `verify_cache_file` calls always run the full check.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::manifest::BundleDescriptor;

/// Buffer size for streaming CRC computation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// How thoroughly cached files are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum VerifyLevel {
    /// Data file exists.
    Low,
    /// Data file exists and has the recorded size.
    #[default]
    Middle,
    /// Size and CRC32 both match.
    High,
}

impl VerifyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyLevel::Low => "low",
            VerifyLevel::Middle => "middle",
            VerifyLevel::High => "high",
        }
    }
}

impl fmt::Display for VerifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerifyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(VerifyLevel::Low),
            "middle" => Ok(VerifyLevel::Middle),
            "high" => Ok(VerifyLevel::High),
            other => Err(format!(
                "invalid verify level '{}', expected low, middle or high",
                other
            )),
        }
    }
}

/// Detailed outcome of checking a cached file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Succeed,
    /// The index has no record for the bundle.
    CacheNotFound,
    /// The info sidecar is missing or unreadable.
    InfoFileNotExist,
    /// The data file is missing.
    DataFileNotExist,
    FileSizeMismatch { expected: u64, actual: u64 },
    FileCrcMismatch { expected: u32, actual: u32 },
    /// The file exists but could not be read.
    ReadFailed(String),
}

impl VerifyResult {
    pub fn is_succeed(&self) -> bool {
        matches!(self, VerifyResult::Succeed)
    }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyResult::Succeed => write!(f, "succeed"),
            VerifyResult::CacheNotFound => write!(f, "cache record not found"),
            VerifyResult::InfoFileNotExist => write!(f, "info file does not exist"),
            VerifyResult::DataFileNotExist => write!(f, "data file does not exist"),
            VerifyResult::FileSizeMismatch { expected, actual } => {
                write!(f, "file size mismatch: expected {}, found {}", expected, actual)
            }
            VerifyResult::FileCrcMismatch { expected, actual } => {
                write!(
                    f,
                    "file crc mismatch: expected {:08x}, found {:08x}",
                    expected, actual
                )
            }
            VerifyResult::ReadFailed(reason) => write!(f, "failed to read file: {}", reason),
        }
    }
}

/// Coarse verification status exposed by the file system façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFileStatus {
    Succeed,
    FileNotExist,
    CachedFileCorrupted,
}

impl From<&VerifyResult> for CacheFileStatus {
    fn from(result: &VerifyResult) -> Self {
        match result {
            VerifyResult::Succeed => CacheFileStatus::Succeed,
            VerifyResult::CacheNotFound | VerifyResult::DataFileNotExist => {
                CacheFileStatus::FileNotExist
            }
            _ => CacheFileStatus::CachedFileCorrupted,
        }
    }
}

/// Errors raised when a downloaded temp file fails verification.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("temp file {} does not exist", .path.display())]
    Missing { path: PathBuf },

    #[error("temp file size mismatch: expected {expected}, found {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("temp file crc mismatch: expected {expected:08x}, found {actual:08x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("failed to read temp file {}: {source}", .path.display())]
    ReadFailed { path: PathBuf, source: io::Error },
}

/// Streaming CRC32 of a file's contents.
pub fn file_crc32(path: &Path) -> io::Result<u32> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Check a data file against an expected size and CRC.
pub fn verify_file(
    path: &Path,
    expected_size: u64,
    expected_crc: u32,
    level: VerifyLevel,
) -> VerifyResult {
    let metadata = match path.metadata() {
        Ok(m) if m.is_file() => m,
        Ok(_) => return VerifyResult::DataFileNotExist,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return VerifyResult::DataFileNotExist,
        Err(e) => return VerifyResult::ReadFailed(e.to_string()),
    };

    if level == VerifyLevel::Low {
        return VerifyResult::Succeed;
    }

    if metadata.len() != expected_size {
        return VerifyResult::FileSizeMismatch {
            expected: expected_size,
            actual: metadata.len(),
        };
    }

    if level == VerifyLevel::Middle {
        return VerifyResult::Succeed;
    }

    match file_crc32(path) {
        Ok(actual) if actual == expected_crc => VerifyResult::Succeed,
        Ok(actual) => VerifyResult::FileCrcMismatch {
            expected: expected_crc,
            actual,
        },
        Err(e) => VerifyResult::ReadFailed(e.to_string()),
    }
}

/// Full size and CRC check of a downloaded temp file.
pub fn verify_temp_file(path: &Path, bundle: &BundleDescriptor) -> Result<(), VerifyError> {
    let metadata = path.metadata().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            VerifyError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            VerifyError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    if metadata.len() != bundle.file_size {
        return Err(VerifyError::SizeMismatch {
            expected: bundle.file_size,
            actual: metadata.len(),
        });
    }

    let actual = file_crc32(path).map_err(|e| VerifyError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    if actual != bundle.file_crc {
        return Err(VerifyError::CrcMismatch {
            expected: bundle.file_crc,
            actual,
        });
    }

    Ok(())
}
