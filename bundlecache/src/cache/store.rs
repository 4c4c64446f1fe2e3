//! Cache index bound to its on-disk layout.
//!
//! Every mutation of the cache directories goes through [`CacheStore`] so
//! the index and the disk stay in step: a record is inserted only after
//! the data file and its info sidecar are in place, and removed before its
//! folder is deleted.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use super::error::{CacheError, CacheResult};
use super::index::CacheIndex;
use super::layout::{CacheLayout, DATA_FILE_NAME, INFO_FILE_NAME};
use super::record::{BundleInfo, CacheRecord, VerifyState};
use super::verify::{verify_file, VerifyLevel, VerifyResult};
use crate::manifest::BundleDescriptor;

/// Records found by a directory scan, before verification.
#[derive(Debug, Default)]
pub struct SearchOutcome {
    pub candidates: Vec<CacheRecord>,
    /// Folders deleted because their sidecar was missing or unreadable.
    pub removed_folders: usize,
}

/// The cache index together with the directories it describes.
#[derive(Debug)]
pub struct CacheStore {
    layout: CacheLayout,
    index: CacheIndex,
}

impl CacheStore {
    pub fn new(layout: CacheLayout) -> Self {
        Self {
            layout,
            index: CacheIndex::new(),
        }
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    pub fn exists(&self, guid: &str) -> bool {
        self.index.contains(guid)
    }

    pub fn record(&self, guid: &str) -> Option<&CacheRecord> {
        self.index.get(guid)
    }

    /// Create the bundle, manifest and temp directories.
    pub fn ensure_dirs(&self) -> CacheResult<()> {
        for dir in [
            self.layout.bundles_root(),
            self.layout.manifest_root(),
            self.layout.temp_root(),
        ] {
            fs::create_dir_all(dir).map_err(|e| CacheError::CreateDirFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Promote a verified file into the cache and record it.
    ///
    /// Any previous record and folder for the GUID are replaced. The source
    /// is moved when possible and copied otherwise. GUIDs that are not a
    /// plain file name are rejected before anything touches the disk.
    pub fn write_bundle_file(
        &mut self,
        bundle: &BundleDescriptor,
        source: &Path,
    ) -> CacheResult<()> {
        if !bundle.has_plain_guid() {
            return Err(CacheError::InvalidGuid(bundle.guid.clone()));
        }
        if self.index.contains(&bundle.guid) {
            self.delete_bundle_file(&bundle.guid);
        }

        let folder = self.layout.bundle_dir(bundle);
        if folder.exists() {
            fs::remove_dir_all(&folder).map_err(|e| CacheError::WriteFailed {
                path: folder.clone(),
                source: e,
            })?;
        }
        fs::create_dir_all(&folder).map_err(|e| CacheError::CreateDirFailed {
            path: folder.clone(),
            source: e,
        })?;

        let data_path = self.layout.bundle_data_path(bundle);
        move_file(source, &data_path).map_err(|e| CacheError::WriteFailed {
            path: data_path.clone(),
            source: e,
        })?;

        let info_path = self.layout.bundle_info_path(bundle);
        BundleInfo {
            file_name: bundle.file_name.clone(),
            crc: bundle.file_crc,
            size: bundle.file_size,
        }
        .save(&info_path)?;

        debug!(guid = %bundle.guid, path = %data_path.display(), "Bundle written to cache");

        self.index.insert(CacheRecord {
            bundle_guid: bundle.guid.clone(),
            data_file_path: data_path,
            info_file_path: info_path,
            data_file_crc: bundle.file_crc,
            data_file_size: bundle.file_size,
            verify_state: VerifyState::Verified,
        })
    }

    /// Remove a record and its folder. Returns whether a record existed.
    pub fn delete_bundle_file(&mut self, guid: &str) -> bool {
        let Some(record) = self.index.remove(guid) else {
            return false;
        };
        if let Err(e) = record.delete_folder() {
            warn!(guid, error = %e, "Failed to delete cached bundle folder");
        }
        true
    }

    /// Remove every cached bundle, including folders the index never saw.
    ///
    /// Temp files are left alone; they belong to in-flight downloads.
    pub fn delete_all_bundle_files(&mut self) -> usize {
        let removed = self.index.drain().len();
        let root = self.layout.bundles_root();
        if let Err(e) = remove_dir_if_exists(root) {
            warn!(path = %root.display(), error = %e, "Failed to delete bundle directory");
        }
        removed
    }

    /// Delete manifest directory entries for which `keep` returns false.
    pub fn delete_manifest_files<F>(&self, keep: F) -> usize
    where
        F: Fn(&Path) -> bool,
    {
        let entries = match fs::read_dir(self.layout.manifest_root()) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut removed = 0;
        for path in entries.flatten().map(|e| e.path()) {
            if !path.is_file() || keep(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete manifest file")
                }
            }
        }
        removed
    }

    /// Full size and CRC re-check of a cached bundle.
    pub fn verify_cache_file(&self, guid: &str) -> VerifyResult {
        let Some(record) = self.index.get(guid) else {
            return VerifyResult::CacheNotFound;
        };
        if !record.info_file_path.exists() {
            return VerifyResult::InfoFileNotExist;
        }
        verify_file(
            &record.data_file_path,
            record.data_file_size,
            record.data_file_crc,
            VerifyLevel::High,
        )
    }

    /// Read a cached data file into memory.
    pub fn read_bundle_bytes(&self, guid: &str) -> CacheResult<Vec<u8>> {
        let record = self
            .index
            .get(guid)
            .ok_or_else(|| CacheError::NotCached(guid.to_string()))?;
        fs::read(&record.data_file_path).map_err(|e| CacheError::ReadFailed {
            path: record.data_file_path.clone(),
            source: e,
        })
    }

    /// Scan the bundle directories for records not yet in the index.
    ///
    /// Folders without a readable info sidecar are deleted on the spot;
    /// everything else is returned unverified.
    pub fn search(&self) -> CacheResult<SearchOutcome> {
        let mut outcome = SearchOutcome::default();
        let root = self.layout.bundles_root();

        let prefixes = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(outcome),
            Err(e) => {
                return Err(CacheError::ReadFailed {
                    path: root.to_path_buf(),
                    source: e,
                })
            }
        };

        for prefix in prefixes.flatten().map(|e| e.path()).filter(|p| p.is_dir()) {
            let folders = fs::read_dir(&prefix).map_err(|e| CacheError::ReadFailed {
                path: prefix.clone(),
                source: e,
            })?;

            for folder in folders.flatten().map(|e| e.path()).filter(|p| p.is_dir()) {
                let Some(guid) = folder.file_name().and_then(|n| n.to_str()).map(String::from)
                else {
                    continue;
                };
                if self.index.contains(&guid) {
                    continue;
                }

                let info_path = folder.join(INFO_FILE_NAME);
                match BundleInfo::load(&info_path) {
                    Ok(info) => outcome.candidates.push(CacheRecord {
                        bundle_guid: guid,
                        data_file_path: folder.join(DATA_FILE_NAME),
                        info_file_path: info_path,
                        data_file_crc: info.crc,
                        data_file_size: info.size,
                        verify_state: VerifyState::Unverified,
                    }),
                    Err(e) => {
                        warn!(guid = %guid, error = %e, "Removing cache folder without valid info file");
                        if let Err(e) = fs::remove_dir_all(&folder) {
                            warn!(
                                path = %folder.display(),
                                error = %e,
                                "Failed to remove cache folder"
                            );
                        }
                        outcome.removed_folders += 1;
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Insert a record produced by the startup scan.
    pub fn commit(&mut self, mut record: CacheRecord) -> CacheResult<()> {
        record.verify_state = VerifyState::Verified;
        self.index.insert(record)
    }
}

fn move_file(source: &Path, dest: &Path) -> io::Result<()> {
    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    fs::copy(source, dest)?;
    fs::remove_file(source)
}

fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CacheStore) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(CacheLayout::new(dir.path(), "pkg"));
        store.ensure_dirs().unwrap();
        (dir, store)
    }

    fn bundle(guid: &str, data: &[u8]) -> BundleDescriptor {
        BundleDescriptor::new(
            guid,
            guid,
            format!("{}.bundle", guid),
            data.len() as u64,
            crc32fast::hash(data),
        )
        .with_hash(format!("ff{}", guid))
    }

    fn stage(store: &CacheStore, guid: &str, data: &[u8]) -> std::path::PathBuf {
        let temp = store.layout().temp_path(guid);
        fs::write(&temp, data).unwrap();
        temp
    }

    #[test]
    fn test_write_bundle_file_moves_temp_and_records() {
        let (_dir, mut store) = setup();
        let data = b"payload";
        let b = bundle("A", data);
        let temp = stage(&store, "A", data);

        store.write_bundle_file(&b, &temp).unwrap();

        assert!(store.exists("A"));
        assert!(!temp.exists());
        let record = store.record("A").unwrap();
        assert_eq!(fs::read(&record.data_file_path).unwrap(), data);
        assert_eq!(record.verify_state, VerifyState::Verified);
        assert_eq!(store.verify_cache_file("A"), VerifyResult::Succeed);
        assert_eq!(store.read_bundle_bytes("A").unwrap(), data);
    }

    #[test]
    fn test_write_replaces_existing_record() {
        let (_dir, mut store) = setup();
        let b = bundle("A", b"one");
        let temp = stage(&store, "A", b"one");
        store.write_bundle_file(&b, &temp).unwrap();

        let temp = stage(&store, "A", b"one");
        store.write_bundle_file(&b, &temp).unwrap();

        assert_eq!(store.index().len(), 1);
    }

    #[test]
    fn test_delete_bundle_file() {
        let (_dir, mut store) = setup();
        let b = bundle("A", b"x");
        let temp = stage(&store, "A", b"x");
        store.write_bundle_file(&b, &temp).unwrap();
        let folder = store.layout().bundle_dir(&b);

        assert!(store.delete_bundle_file("A"));
        assert!(!store.exists("A"));
        assert!(!folder.exists());
        assert!(!store.delete_bundle_file("A"));
        assert_eq!(store.verify_cache_file("A"), VerifyResult::CacheNotFound);
    }

    #[test]
    fn test_path_like_guid_is_rejected_and_cannot_delete_others() {
        let (dir, mut store) = setup();
        let good = bundle("A", b"good");
        let temp = stage(&store, "A", b"good");
        store.write_bundle_file(&good, &temp).unwrap();

        for guid in ["..", "../..", "../../escaped"] {
            let evil = bundle(guid, b"evil");
            let temp = dir.path().join("evil.temp");
            fs::write(&temp, b"evil").unwrap();

            assert!(matches!(
                store.write_bundle_file(&evil, &temp),
                Err(CacheError::InvalidGuid(g)) if g == guid
            ));
            assert!(!store.delete_bundle_file(guid));
        }

        assert!(store.exists("A"));
        assert_eq!(store.index().len(), 1);
        assert_eq!(store.read_bundle_bytes("A").unwrap(), b"good");
        assert!(!dir.path().join("escaped").exists());
    }

    #[test]
    fn test_remote_file_name_stays_inside_bundle_folder() {
        let (_dir, mut store) = setup();
        let outside = TempDir::new().unwrap();
        let escaped = outside.path().join("escaped.bin");
        let data = b"payload";
        let mut b = bundle("A", data);
        b.file_name = escaped.to_string_lossy().into_owned();
        let temp = stage(&store, "A", data);

        store.write_bundle_file(&b, &temp).unwrap();

        assert!(!escaped.exists());
        let record = store.record("A").unwrap();
        assert!(record.data_file_path.starts_with(store.layout().bundles_root()));
        assert_eq!(store.verify_cache_file("A"), VerifyResult::Succeed);
    }

    #[test]
    fn test_search_finds_written_bundles_and_drops_broken_folders() {
        let (dir, mut store) = setup();
        for guid in ["A", "B"] {
            let b = bundle(guid, guid.as_bytes());
            let temp = stage(&store, guid, guid.as_bytes());
            store.write_bundle_file(&b, &temp).unwrap();
        }
        let broken = store.layout().bundles_root().join("zz").join("C");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(DATA_FILE_NAME), b"orphan").unwrap();

        let fresh = CacheStore::new(CacheLayout::new(dir.path(), "pkg"));
        let outcome = fresh.search().unwrap();

        let mut guids: Vec<_> = outcome.candidates.iter().map(|r| r.bundle_guid.clone()).collect();
        guids.sort();
        assert_eq!(guids, vec!["A", "B"]);
        assert!(outcome
            .candidates
            .iter()
            .all(|r| r.verify_state == VerifyState::Unverified));
        assert_eq!(outcome.removed_folders, 1);
        assert!(!broken.exists());

        // Already indexed records are skipped.
        assert!(store.search().unwrap().candidates.is_empty());
    }

    #[test]
    fn test_search_without_bundle_dir() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(CacheLayout::new(dir.path(), "never-created"));
        let outcome = store.search().unwrap();
        assert!(outcome.candidates.is_empty());
    }

    #[test]
    fn test_delete_all_bundle_files() {
        let (_dir, mut store) = setup();
        let b = bundle("A", b"x");
        let temp = stage(&store, "A", b"x");
        store.write_bundle_file(&b, &temp).unwrap();
        stage(&store, "B", b"partial");

        assert_eq!(store.delete_all_bundle_files(), 1);
        assert!(store.index().is_empty());
        assert!(!store.layout().bundles_root().exists());
        assert!(store.layout().temp_path("B").exists());
    }

    #[test]
    fn test_delete_manifest_files_respects_keep() {
        let (_dir, store) = setup();
        let root = store.layout().manifest_root();
        fs::write(root.join("v1.bytes"), b"m").unwrap();
        fs::write(root.join("v1.hash"), b"h").unwrap();
        fs::write(root.join("keep.me"), b"k").unwrap();

        let removed = store.delete_manifest_files(|p| p.ends_with("keep.me"));

        assert_eq!(removed, 2);
        assert!(root.join("keep.me").exists());
        assert!(!root.join("v1.bytes").exists());
    }

    #[test]
    fn test_verify_detects_flipped_byte() {
        let (_dir, mut store) = setup();
        let data = vec![3u8; 64];
        let b = bundle("A", &data);
        let temp = stage(&store, "A", &data);
        store.write_bundle_file(&b, &temp).unwrap();

        let mut corrupted = data.clone();
        corrupted[10] ^= 0xff;
        fs::write(&store.record("A").unwrap().data_file_path, &corrupted).unwrap();

        assert!(matches!(
            store.verify_cache_file("A"),
            VerifyResult::FileCrcMismatch { .. }
        ));
    }
}
