//! Download of one bundle with retries.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::warn;

use super::CacheFileSystem;
use crate::download::{DownloadSettings, SharedTask};
use crate::manifest::BundleDescriptor;
use crate::operation::{Operation, OperationState, OperationStatus};

/// Per-call download options.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Retries after the first failed attempt.
    pub failed_try_again: u32,
    /// Pause before each retry.
    pub retry_delay: Duration,
    /// Import a local file instead of downloading from the remote.
    pub import_file_path: Option<PathBuf>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self::from_settings(&DownloadSettings::default())
    }
}

impl DownloadOptions {
    /// Options using the retry policy of the download settings.
    pub fn from_settings(settings: &DownloadSettings) -> Self {
        Self {
            failed_try_again: settings.failed_try_again,
            retry_delay: settings.retry_delay,
            import_file_path: None,
        }
    }

    pub fn with_failed_try_again(mut self, count: u32) -> Self {
        self.failed_try_again = count;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_import_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.import_file_path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    CheckExists,
    CreateRequest,
    CheckRequest,
    TryAgain { at: Instant },
    Done,
}

/// Downloads a bundle, alternating main and fallback URLs between attempts.
///
/// Odd attempts use the main URL, even attempts the fallback.
pub struct DownloadFileOperation {
    bundle: BundleDescriptor,
    options: DownloadOptions,
    main_url: String,
    fallback_url: String,
    stage: Stage,
    task: Option<SharedTask>,
    request_count: u32,
    failed_count: u32,
    downloaded_bytes: u64,
    progress: f32,
    state: OperationState,
}

impl DownloadFileOperation {
    pub(crate) fn new(
        bundle: BundleDescriptor,
        options: DownloadOptions,
        main_url: String,
        fallback_url: String,
    ) -> Self {
        Self {
            bundle,
            options,
            main_url,
            fallback_url,
            stage: Stage::CheckExists,
            task: None,
            request_count: 0,
            failed_count: 0,
            downloaded_bytes: 0,
            progress: 0.0,
            state: OperationState::default(),
        }
    }

    pub fn bundle(&self) -> &BundleDescriptor {
        &self.bundle
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes
    }

    pub fn total_bytes(&self) -> u64 {
        self.bundle.file_size
    }

    /// Number of requests issued so far.
    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    /// The shared task currently serving this operation.
    pub fn task(&self) -> Option<&SharedTask> {
        self.task.as_ref()
    }

    fn next_url(&mut self) -> String {
        self.request_count += 1;
        if self.request_count % 2 == 1 {
            self.main_url.clone()
        } else {
            self.fallback_url.clone()
        }
    }

    fn finish_success(&mut self) {
        self.downloaded_bytes = self.bundle.file_size;
        self.progress = 1.0;
        self.stage = Stage::Done;
        self.state.succeed();
    }
}

impl Operation for DownloadFileOperation {
    fn update(&mut self, fs: &mut CacheFileSystem) {
        if self.state.is_done() {
            return;
        }
        self.state.processing();

        match self.stage {
            Stage::CheckExists => {
                if !self.bundle.has_plain_guid() {
                    self.stage = Stage::Done;
                    self.state
                        .fail(format!("invalid bundle guid {:?}", self.bundle.guid));
                } else if fs.exists(&self.bundle) {
                    self.finish_success();
                } else {
                    self.stage = Stage::CreateRequest;
                }
            }
            Stage::CreateRequest => {
                // Another requester's task may have cached it since.
                if fs.exists(&self.bundle) {
                    self.finish_success();
                    return;
                }
                let url = self.next_url();
                self.task = Some(fs.request_download(&self.bundle, &url));
                self.stage = Stage::CheckRequest;
            }
            Stage::CheckRequest => {
                let Some(task) = self.task.clone() else {
                    self.stage = Stage::CreateRequest;
                    return;
                };
                let (done, succeeded, error) = {
                    let guard = task.lock();
                    self.downloaded_bytes = guard.downloaded_bytes();
                    self.progress = guard.progress();
                    (guard.is_done(), guard.is_succeeded(), guard.error())
                };
                if !done {
                    return;
                }

                fs.release_download(&task);
                self.task = None;

                if succeeded {
                    self.finish_success();
                    return;
                }

                let error = error.unwrap_or_else(|| "download failed".to_string());
                if self.failed_count < self.options.failed_try_again {
                    self.failed_count += 1;
                    warn!(
                        bundle = %self.bundle.bundle_name,
                        attempt = self.failed_count,
                        error = %error,
                        "Download failed, trying again"
                    );
                    self.downloaded_bytes = 0;
                    self.progress = 0.0;
                    self.stage = Stage::TryAgain {
                        at: Instant::now() + self.options.retry_delay,
                    };
                } else {
                    self.stage = Stage::Done;
                    self.state.fail(error);
                }
            }
            Stage::TryAgain { at } => {
                if Instant::now() >= at {
                    self.stage = Stage::CreateRequest;
                }
            }
            Stage::Done => {}
        }
    }

    fn status(&self) -> OperationStatus {
        self.state.status
    }

    fn error(&self) -> Option<&str> {
        self.state.error()
    }

    fn progress(&self) -> f32 {
        self.progress
    }

    fn abort(&mut self, fs: &mut CacheFileSystem) {
        if self.state.is_done() {
            return;
        }
        if let Some(task) = self.task.take() {
            fs.release_download(&task);
        }
        self.stage = Stage::Done;
        self.state.fail("user abort");
    }
}

impl std::fmt::Debug for DownloadFileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadFileOperation")
            .field("guid", &self.bundle.guid)
            .field("stage", &self.stage)
            .field("request_count", &self.request_count)
            .field("status", &self.state.status)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}
