//! Bundle descriptor as listed in a package manifest.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

/// Identity and integrity data of one bundle file.
///
/// Descriptors are immutable once a manifest is parsed; loading a newer
/// manifest replaces them wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    /// Logical bundle name used by the asset loader.
    pub bundle_name: String,

    /// Unique cache key of the bundle file.
    pub guid: String,

    /// File name on the remote server and inside the cache folder.
    pub file_name: String,

    /// Exact byte length of the file.
    pub file_size: u64,

    /// Content hash, used to spread cache folders.
    pub file_hash: String,

    /// CRC32 of the file bytes.
    pub file_crc: u32,

    /// Whether the bytes on disk must go through the decryption service.
    #[serde(default)]
    pub encrypted: bool,

    /// Tags used by selective cache clearing.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl BundleDescriptor {
    /// Create a descriptor with no tags and no encryption.
    pub fn new(
        bundle_name: impl Into<String>,
        guid: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        file_crc: u32,
    ) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            guid: guid.into(),
            file_name: file_name.into(),
            file_size,
            file_hash: String::new(),
            file_crc,
            encrypted: false,
            tags: Vec::new(),
        }
    }

    /// Set the content hash.
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.file_hash = hash.into();
        self
    }

    /// Mark the bundle as encrypted.
    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// True when any of the bundle's tags appears in `tags`.
    pub fn has_tag<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        self.tags
            .iter()
            .any(|own| tags.iter().any(|t| t.as_ref() == own))
    }

    /// True when the GUID can name a cache folder without leaving it.
    pub fn has_plain_guid(&self) -> bool {
        is_plain_file_name(&self.guid)
    }

    /// Two-character folder prefix derived from the content hash.
    ///
    /// Falls back to the GUID when the hash is too short or not
    /// alphanumeric.
    pub fn folder_prefix(&self) -> &str {
        [&self.file_hash, &self.guid]
            .into_iter()
            .filter_map(|s| s.get(..2))
            .find(|p| p.bytes().all(|b| b.is_ascii_alphanumeric()))
            .unwrap_or("__")
    }
}

/// A single normal path component: no separators, `.`, `..` or roots.
pub(crate) fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
