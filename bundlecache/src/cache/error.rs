//! Error types for cache operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by the cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to read a cache file.
    #[error("failed to read {}: {source}", .path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a cache file.
    #[error("failed to write {}: {source}", .path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a cache directory.
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// The info sidecar could not be decoded.
    #[error("invalid info file {}: {reason}", .path.display())]
    InvalidInfo { path: PathBuf, reason: String },

    /// The index already holds a record for this GUID.
    #[error("bundle {0} is already recorded in the cache index")]
    DuplicateRecord(String),

    /// The GUID cannot be used as a cache folder name.
    #[error("invalid bundle guid {0:?}")]
    InvalidGuid(String),

    /// No record exists for this GUID.
    #[error("bundle {0} is not cached")]
    NotCached(String),

    /// An encrypted bundle was read without a decryption service.
    #[error("decryption service is required to read encrypted bundle {0}")]
    DecryptionUnavailable(String),

    /// The decryption service rejected the file.
    #[error("failed to decrypt bundle {guid}: {reason}")]
    DecryptionFailed { guid: String, reason: String },
}
