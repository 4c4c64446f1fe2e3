//! Package manifest parsing and lookup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::bundle::BundleDescriptor;

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Errors raised while decoding or validating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The bytes are not a valid manifest document.
    #[error("failed to deserialize manifest: {0}")]
    Deserialize(#[from] serde_json::Error),

    /// Two bundles share the same GUID.
    #[error("duplicate bundle guid in manifest: {0}")]
    DuplicateGuid(String),

    /// A GUID that cannot be used as a cache folder name.
    #[error("invalid bundle guid in manifest: {0:?}")]
    InvalidGuid(String),

    /// The manifest belongs to another package.
    #[error("manifest package name mismatch: expected {expected}, found {actual}")]
    PackageMismatch { expected: String, actual: String },

    /// The manifest describes another version.
    #[error("manifest version mismatch: expected {expected}, found {actual}")]
    VersionMismatch { expected: String, actual: String },
}

/// All bundles of one package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub package_name: String,
    pub package_version: String,
    pub bundles: Vec<BundleDescriptor>,

    #[serde(skip)]
    by_guid: HashMap<String, usize>,
}

impl PackageManifest {
    /// Build a manifest from descriptors.
    ///
    /// # Errors
    ///
    /// Fails when two descriptors share a GUID or a GUID is not a plain
    /// file name.
    pub fn new(
        package_name: impl Into<String>,
        package_version: impl Into<String>,
        bundles: Vec<BundleDescriptor>,
    ) -> ManifestResult<Self> {
        let mut manifest = Self {
            package_name: package_name.into(),
            package_version: package_version.into(),
            bundles,
            by_guid: HashMap::new(),
        };
        manifest.rebuild_index()?;
        Ok(manifest)
    }

    /// Decode a manifest from its serialized bytes.
    pub fn from_bytes(bytes: &[u8]) -> ManifestResult<Self> {
        let mut manifest: PackageManifest = serde_json::from_slice(bytes)?;
        manifest.rebuild_index()?;
        Ok(manifest)
    }

    /// Encode the manifest into bytes suitable for publishing.
    pub fn to_bytes(&self) -> ManifestResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Check that the manifest is the expected package version.
    pub fn ensure_identity(&self, package_name: &str, version: &str) -> ManifestResult<()> {
        if self.package_name != package_name {
            return Err(ManifestError::PackageMismatch {
                expected: package_name.to_string(),
                actual: self.package_name.clone(),
            });
        }
        if self.package_version != version {
            return Err(ManifestError::VersionMismatch {
                expected: version.to_string(),
                actual: self.package_version.clone(),
            });
        }
        Ok(())
    }

    /// Look up a bundle by GUID.
    pub fn bundle_by_guid(&self, guid: &str) -> Option<&BundleDescriptor> {
        self.by_guid.get(guid).map(|&i| &self.bundles[i])
    }

    /// Look up a bundle by its logical name.
    pub fn bundle_by_name(&self, name: &str) -> Option<&BundleDescriptor> {
        self.bundles.iter().find(|b| b.bundle_name == name)
    }

    /// True when the manifest references the GUID.
    pub fn contains_guid(&self, guid: &str) -> bool {
        self.by_guid.contains_key(guid)
    }

    /// Bundles carrying at least one of the tags.
    pub fn bundles_with_tags<'a, S: AsRef<str>>(
        &'a self,
        tags: &'a [S],
    ) -> impl Iterator<Item = &'a BundleDescriptor> + 'a {
        self.bundles.iter().filter(move |b| b.has_tag(tags))
    }

    /// Total byte size of all bundles.
    pub fn total_size(&self) -> u64 {
        self.bundles.iter().map(|b| b.file_size).sum()
    }

    fn rebuild_index(&mut self) -> ManifestResult<()> {
        self.by_guid.clear();
        for (i, bundle) in self.bundles.iter().enumerate() {
            if !bundle.has_plain_guid() {
                return Err(ManifestError::InvalidGuid(bundle.guid.clone()));
            }
            if self.by_guid.insert(bundle.guid.clone(), i).is_some() {
                return Err(ManifestError::DuplicateGuid(bundle.guid.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PackageManifest {
        PackageManifest::new(
            "DefaultPackage",
            "v1",
            vec![
                BundleDescriptor::new("ui", "g-ui", "ui.bundle", 10, 1).with_tag("common"),
                BundleDescriptor::new("lvl", "g-lvl", "lvl.bundle", 20, 2).with_tag("level1"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_survives_serialization() {
        let bytes = sample().to_bytes().unwrap();
        let decoded = PackageManifest::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.bundle_by_guid("g-lvl").unwrap().bundle_name, "lvl");
        assert!(decoded.contains_guid("g-ui"));
        assert!(decoded.bundle_by_guid("missing").is_none());
        assert_eq!(decoded.total_size(), 30);
    }

    #[test]
    fn test_duplicate_guid_rejected() {
        let result = PackageManifest::new(
            "p",
            "v",
            vec![
                BundleDescriptor::new("a", "same", "a", 1, 0),
                BundleDescriptor::new("b", "same", "b", 1, 0),
            ],
        );
        assert!(matches!(result, Err(ManifestError::DuplicateGuid(g)) if g == "same"));
    }

    #[test]
    fn test_path_like_guids_rejected() {
        for guid in ["..", "../../outside", "/tmp/abs", "a/b"] {
            let result = PackageManifest::new(
                "p",
                "v",
                vec![BundleDescriptor::new("a", guid, "a.bundle", 1, 0)],
            );
            assert!(
                matches!(&result, Err(ManifestError::InvalidGuid(g)) if g == guid),
                "{:?}",
                guid
            );
        }

        let json = br#"{
            "package_name": "p",
            "package_version": "v",
            "bundles": [{
                "bundle_name": "a",
                "guid": "..",
                "file_name": "a.bundle",
                "file_size": 1,
                "file_hash": "",
                "file_crc": 0
            }]
        }"#;
        assert!(matches!(
            PackageManifest::from_bytes(json),
            Err(ManifestError::InvalidGuid(_))
        ));
    }

    #[test]
    fn test_bundles_with_tags() {
        let manifest = sample();
        let tags = ["common".to_string()];
        let names: Vec<_> = manifest
            .bundles_with_tags(&tags)
            .map(|b| b.bundle_name.as_str())
            .collect();
        assert_eq!(names, vec!["ui"]);
    }

    #[test]
    fn test_ensure_identity() {
        let manifest = sample();
        assert!(manifest.ensure_identity("DefaultPackage", "v1").is_ok());
        assert!(matches!(
            manifest.ensure_identity("Other", "v1"),
            Err(ManifestError::PackageMismatch { .. })
        ));
        assert!(matches!(
            manifest.ensure_identity("DefaultPackage", "v2"),
            Err(ManifestError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_garbage_bytes_fail() {
        assert!(matches!(
            PackageManifest::from_bytes(b"not json"),
            Err(ManifestError::Deserialize(_))
        ));
    }
}
