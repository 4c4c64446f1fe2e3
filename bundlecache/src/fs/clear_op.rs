//! Clearing cached files.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use super::CacheFileSystem;
use crate::manifest::PackageManifest;
use crate::operation::{Operation, OperationState, OperationStatus};

/// Which cached files to remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearMode {
    /// Every bundle and manifest file.
    All,
    AllBundleFiles,
    AllManifestFiles,
    /// Bundles the manifest no longer references.
    UnusedBundleFiles,
    /// Manifest files of versions other than the manifest's.
    UnusedManifestFiles,
    /// Bundles whose manifest entry carries one of the tags.
    ByTags(Vec<String>),
    None,
}

impl ClearMode {
    /// True for modes that select files by comparing against a manifest.
    pub fn needs_manifest(&self) -> bool {
        matches!(
            self,
            ClearMode::UnusedBundleFiles | ClearMode::UnusedManifestFiles | ClearMode::ByTags(_)
        )
    }
}

impl fmt::Display for ClearMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClearMode::All => f.write_str("all"),
            ClearMode::AllBundleFiles => f.write_str("bundles"),
            ClearMode::AllManifestFiles => f.write_str("manifests"),
            ClearMode::UnusedBundleFiles => f.write_str("unused-bundles"),
            ClearMode::UnusedManifestFiles => f.write_str("unused-manifests"),
            ClearMode::ByTags(tags) => write!(f, "tags:{}", tags.join(",")),
            ClearMode::None => f.write_str("none"),
        }
    }
}

impl FromStr for ClearMode {
    type Err = String;

    /// Parses the `Display` form; tags are written as `tags:a,b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(tags) = s.strip_prefix("tags:") {
            let tags: Vec<String> = tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
            return Ok(ClearMode::ByTags(tags));
        }
        match s {
            "all" => Ok(ClearMode::All),
            "bundles" => Ok(ClearMode::AllBundleFiles),
            "manifests" => Ok(ClearMode::AllManifestFiles),
            "unused-bundles" => Ok(ClearMode::UnusedBundleFiles),
            "unused-manifests" => Ok(ClearMode::UnusedManifestFiles),
            "none" => Ok(ClearMode::None),
            other => Err(format!("invalid clear mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Prepare,
    DeleteBundles,
    Done,
}

/// Removes cached files, spreading bundle deletion across ticks.
#[derive(Debug)]
pub struct ClearCacheOperation {
    mode: ClearMode,
    manifest: Option<Arc<PackageManifest>>,
    stage: Stage,
    pending: Vec<String>,
    total: usize,
    state: OperationState,
}

impl ClearCacheOperation {
    pub(crate) fn new(mode: ClearMode, manifest: Option<Arc<PackageManifest>>) -> Self {
        Self {
            mode,
            manifest,
            stage: Stage::Prepare,
            pending: Vec::new(),
            total: 0,
            state: OperationState::default(),
        }
    }

    pub fn mode(&self) -> &ClearMode {
        &self.mode
    }

    /// Number of bundles selected for deletion.
    pub fn total(&self) -> usize {
        self.total
    }

    fn fail(&mut self, reason: impl Into<String>) {
        self.stage = Stage::Done;
        self.state.fail(reason);
    }

    fn prepare(&mut self, fs: &mut CacheFileSystem) {
        if self.mode.needs_manifest() && self.manifest.is_none() {
            self.fail(format!("clear mode {} requires a manifest", self.mode));
            return;
        }
        if matches!(&self.mode, ClearMode::ByTags(tags) if tags.is_empty()) {
            self.fail("clear by tags requires at least one tag");
            return;
        }

        let cached = fs.cached_bundle_guids();
        self.pending = match (&self.mode, self.manifest.as_deref()) {
            (ClearMode::None, _) => Vec::new(),
            (ClearMode::All | ClearMode::AllBundleFiles, _) => cached,
            (ClearMode::AllManifestFiles, _) => {
                let removed = fs.delete_manifest_files(|_| false);
                info!(removed, "Cleared manifest files");
                Vec::new()
            }
            (ClearMode::UnusedBundleFiles, Some(manifest)) => cached
                .into_iter()
                .filter(|guid| !manifest.contains_guid(guid))
                .collect(),
            (ClearMode::UnusedManifestFiles, Some(manifest)) => {
                let hash_path = fs.layout().manifest_hash_path(&manifest.package_version);
                let bytes_path = fs.layout().manifest_path(&manifest.package_version);
                let removed = fs.delete_manifest_files(|p| {
                    p == hash_path.as_path() || p == bytes_path.as_path()
                });
                info!(
                    removed,
                    version = %manifest.package_version,
                    "Cleared unused manifest files"
                );
                Vec::new()
            }
            (ClearMode::ByTags(tags), Some(manifest)) => cached
                .into_iter()
                .filter(|guid| {
                    manifest
                        .bundle_by_guid(guid)
                        .is_some_and(|bundle| bundle.has_tag(tags))
                })
                .collect(),
            (_, None) => Vec::new(),
        };

        self.total = self.pending.len();
        self.stage = Stage::DeleteBundles;
    }

    fn delete_bundles(&mut self, fs: &mut CacheFileSystem) {
        let budget = fs.config().clear_files_per_tick;
        for _ in 0..budget {
            let Some(guid) = self.pending.pop() else {
                break;
            };
            fs.delete_cache_bundle_file(&guid);
        }
        if !self.pending.is_empty() {
            return;
        }

        match self.mode {
            ClearMode::All => {
                fs.store_mut().delete_all_bundle_files();
                fs.delete_manifest_files(|_| false);
            }
            ClearMode::AllBundleFiles => {
                fs.store_mut().delete_all_bundle_files();
            }
            _ => {}
        }

        info!(mode = %self.mode, removed = self.total, "Cache cleared");
        self.stage = Stage::Done;
        self.state.succeed();
    }
}

impl Operation for ClearCacheOperation {
    fn update(&mut self, fs: &mut CacheFileSystem) {
        if self.state.is_done() {
            return;
        }
        self.state.processing();

        if self.stage == Stage::Prepare {
            self.prepare(fs);
        }
        if self.stage == Stage::DeleteBundles {
            self.delete_bundles(fs);
        }
    }

    fn status(&self) -> OperationStatus {
        self.state.status
    }

    fn error(&self) -> Option<&str> {
        self.state.error()
    }

    fn progress(&self) -> f32 {
        if self.total == 0 {
            return if self.state.is_done() { 1.0 } else { 0.0 };
        }
        1.0 - self.pending.len() as f32 / self.total as f32
    }

    fn abort(&mut self, _fs: &mut CacheFileSystem) {
        if !self.state.is_done() {
            self.fail("user abort");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_mode_parse() {
        assert_eq!("all".parse::<ClearMode>().unwrap(), ClearMode::All);
        assert_eq!(
            "tags:common, ui".parse::<ClearMode>().unwrap(),
            ClearMode::ByTags(vec!["common".to_string(), "ui".to_string()])
        );
        assert!("everything".parse::<ClearMode>().is_err());

        for mode in [
            ClearMode::All,
            ClearMode::AllBundleFiles,
            ClearMode::AllManifestFiles,
            ClearMode::UnusedBundleFiles,
            ClearMode::UnusedManifestFiles,
            ClearMode::None,
        ] {
            assert_eq!(mode.to_string().parse::<ClearMode>().unwrap(), mode);
        }
    }
}
