//! Startup scan of the cache directory.
//!
//! Runs in three stages:
//! 1. Compare the application footprint and apply the install clear mode
//!    after an overwrite install.
//! 2. Search the bundle folders for records left by earlier runs.
//! 3. Verify the records on a bounded rayon pool and commit the good ones.
//!    Corrupted records are deleted and logged; they never fail startup.

use std::sync::mpsc::{self, Receiver, TryRecvError};

use tracing::{info, warn};

use super::CacheFileSystem;
use crate::cache::{
    verify_file, AppFootprint, CacheRecord, InstallClearMode, VerifyLevel, VerifyResult,
    FOOTPRINT_FILE_NAME,
};
use crate::operation::{Operation, OperationState, OperationStatus};

type Verified = (CacheRecord, VerifyResult);

enum Stage {
    CheckFootprint,
    Search,
    Verify(Receiver<Verified>),
    Done,
}

/// Loads the cache index from disk.
pub struct InitializeOperation {
    stage: Stage,
    total: usize,
    checked: usize,
    committed: usize,
    removed: usize,
    state: OperationState,
}

impl InitializeOperation {
    pub(crate) fn new() -> Self {
        Self {
            stage: Stage::CheckFootprint,
            total: 0,
            checked: 0,
            committed: 0,
            removed: 0,
            state: OperationState::default(),
        }
    }

    /// Records committed to the index.
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Folders deleted because they failed the search or verification.
    pub fn removed(&self) -> usize {
        self.removed
    }

    fn fail(&mut self, reason: String) {
        self.stage = Stage::Done;
        self.state.fail(reason);
    }

    fn check_footprint(&mut self, fs: &mut CacheFileSystem) {
        if let Err(e) = fs.store().ensure_dirs() {
            self.fail(e.to_string());
            return;
        }

        let path = fs.layout().manifest_root().join(FOOTPRINT_FILE_NAME);
        let mut footprint = match AppFootprint::load(&path, &fs.config().app_footprint) {
            Ok(footprint) => footprint,
            Err(e) => {
                self.fail(format!("failed to load app footprint {}: {}", path.display(), e));
                return;
            }
        };

        if footprint.is_dirty() {
            let mode = fs.config().install_clear_mode;
            info!(
                saved = footprint.saved(),
                current = %fs.config().app_footprint,
                %mode,
                "Overwrite install detected"
            );
            match mode {
                InstallClearMode::None => {}
                InstallClearMode::ClearAllCacheFiles => {
                    fs.store_mut().delete_all_bundle_files();
                    fs.delete_manifest_files(|_| false);
                }
                InstallClearMode::ClearAllBundleFiles => {
                    fs.store_mut().delete_all_bundle_files();
                }
                InstallClearMode::ClearAllManifestFiles => {
                    fs.delete_manifest_files(|_| false);
                }
            }
            if let Err(e) = footprint.coverage().and_then(|_| {
                fs.store()
                    .ensure_dirs()
                    .map_err(|e| std::io::Error::other(e.to_string()))
            }) {
                self.fail(format!("failed to refresh cache after overwrite install: {}", e));
                return;
            }
        }

        self.stage = Stage::Search;
    }

    fn search(&mut self, fs: &mut CacheFileSystem) {
        let outcome = match fs.store().search() {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(e.to_string());
                return;
            }
        };
        self.removed += outcome.removed_folders;
        self.total = outcome.candidates.len();

        if outcome.candidates.is_empty() {
            self.finish(fs);
            return;
        }

        let level = fs.config().verify_level;
        let threads = fs.config().verify_max_concurrency;
        let (tx, rx) = mpsc::channel();

        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => {
                for record in outcome.candidates {
                    let tx = tx.clone();
                    pool.spawn(move || {
                        let result = verify_record(&record, level);
                        let _ = tx.send((record, result));
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, "Verification pool unavailable, verifying inline");
                for record in outcome.candidates {
                    let result = verify_record(&record, level);
                    let _ = tx.send((record, result));
                }
            }
        }

        self.stage = Stage::Verify(rx);
    }

    fn collect(&mut self, fs: &mut CacheFileSystem) {
        let Stage::Verify(rx) = &self.stage else {
            return;
        };

        loop {
            match rx.try_recv() {
                Ok((record, result)) => {
                    self.checked += 1;
                    if result.is_succeed() {
                        if let Err(e) = fs.store_mut().commit(record) {
                            warn!(error = %e, "Skipping duplicate cache record");
                        } else {
                            self.committed += 1;
                        }
                        continue;
                    }

                    warn!(
                        guid = %record.bundle_guid,
                        reason = %result,
                        "Removing corrupted cache file"
                    );
                    if let Err(e) = record.delete_folder() {
                        warn!(
                            guid = %record.bundle_guid,
                            error = %e,
                            "Failed to remove corrupted cache file"
                        );
                    }
                    self.removed += 1;
                }
                Err(TryRecvError::Empty) => return,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        self.finish(fs);
    }

    fn finish(&mut self, fs: &CacheFileSystem) {
        info!(
            package = %fs.package_name(),
            cached = fs.file_count(),
            removed = self.removed,
            "Cache file system initialized"
        );
        self.stage = Stage::Done;
        self.state.succeed();
    }
}

fn verify_record(record: &CacheRecord, level: VerifyLevel) -> VerifyResult {
    if !record.info_file_path.exists() {
        return VerifyResult::InfoFileNotExist;
    }
    verify_file(
        &record.data_file_path,
        record.data_file_size,
        record.data_file_crc,
        level,
    )
}

impl Operation for InitializeOperation {
    fn update(&mut self, fs: &mut CacheFileSystem) {
        if self.state.is_done() {
            return;
        }
        self.state.processing();

        if matches!(self.stage, Stage::CheckFootprint) {
            self.check_footprint(fs);
        }
        if matches!(self.stage, Stage::Search) {
            self.search(fs);
        }
        if matches!(self.stage, Stage::Verify(_)) {
            self.collect(fs);
        }
    }

    fn status(&self) -> OperationStatus {
        self.state.status
    }

    fn error(&self) -> Option<&str> {
        self.state.error()
    }

    fn progress(&self) -> f32 {
        if self.state.is_done() {
            return 1.0;
        }
        if self.total == 0 {
            return 0.0;
        }
        self.checked as f32 / self.total as f32
    }

    fn abort(&mut self, _fs: &mut CacheFileSystem) {
        if !self.state.is_done() {
            self.fail("user abort".to_string());
        }
    }
}
