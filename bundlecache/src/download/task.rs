//! A single bundle transfer.
//!
//! A task moves through an explicit [`DownloadStep`] machine. The pure
//! [`transition`] function decides the next step from the current one and
//! an event; [`DownloadTask`] performs the side effects (requests, file
//! moves) and feeds the resulting events back in.
//!
//! ```text
//! Pending ─Start─► Request ─RequestCreated─► Transferring ─TransferSucceeded─► Verifying
//!    │                ▲                          │                              │
//!    └─Start─► CopyLocal ─CopyFailed─┘           └─TransferFailed─► Failed ◄────┤
//!                 │                                                             │
//!                 └─CopySucceeded─► Verifying ─VerifySucceeded─► Caching ─CacheSucceeded─► Succeeded
//! ```
//!
//! `Abort` moves any non-terminal step to `Aborted`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::backend::{DownloadBackend, DownloadRequest, FileRequestArgs, RequestStatus};
use super::config::DownloadSettings;
use super::local::{LocalCopyService, LocalFileInfo};
use crate::cache::{verify_temp_file, CacheStore};
use crate::manifest::BundleDescriptor;

/// Transfer strategy chosen when the task is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloaderKind {
    /// Fresh transfer; partial files are discarded.
    Normal,
    /// Continues from an existing partial temp file.
    Resumable,
    /// Copies a file shipped with the application.
    LocalCopy,
}

/// Position of a task in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStep {
    Pending,
    CopyLocal,
    Request,
    Transferring,
    Verifying,
    Caching,
    Succeeded,
    Failed(String),
    Aborted,
}

impl DownloadStep {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStep::Succeeded | DownloadStep::Failed(_) | DownloadStep::Aborted
        )
    }
}

/// Outcome of a step's side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Start,
    CopySucceeded,
    CopyFailed(String),
    RequestCreated,
    TransferSucceeded,
    TransferFailed(String),
    VerifySucceeded,
    VerifyFailed(String),
    CacheSucceeded,
    CacheFailed(String),
    Abort,
}

/// Next step for `event` in `step`. Events that do not apply are ignored.
pub fn transition(step: &DownloadStep, kind: DownloaderKind, event: DownloadEvent) -> DownloadStep {
    use DownloadEvent as E;
    use DownloadStep as S;

    if step.is_terminal() {
        return step.clone();
    }

    match (step, event) {
        (_, E::Abort) => S::Aborted,
        (S::Pending, E::Start) => match kind {
            DownloaderKind::LocalCopy => S::CopyLocal,
            DownloaderKind::Normal | DownloaderKind::Resumable => S::Request,
        },
        (S::CopyLocal, E::CopySucceeded) => S::Verifying,
        (S::CopyLocal, E::CopyFailed(_)) => S::Request,
        (S::Request, E::RequestCreated) => S::Transferring,
        (S::Request | S::Transferring, E::TransferFailed(e)) => S::Failed(e),
        (S::Transferring, E::TransferSucceeded) => S::Verifying,
        (S::Verifying, E::VerifySucceeded) => S::Caching,
        (S::Verifying, E::VerifyFailed(e)) => S::Failed(e),
        (S::Caching, E::CacheSucceeded) => S::Succeeded,
        (S::Caching, E::CacheFailed(e)) => S::Failed(e),
        (current, _) => current.clone(),
    }
}

/// Everything a task touches while it runs.
pub struct TaskContext<'a> {
    pub store: &'a mut CacheStore,
    pub backend: &'a dyn DownloadBackend,
    pub local_copy: Option<&'a dyn LocalCopyService>,
    pub settings: &'a DownloadSettings,
    pub package_name: &'a str,
}

/// One bundle transfer shared by every requester of the same GUID.
pub struct DownloadTask {
    bundle: BundleDescriptor,
    url: String,
    kind: DownloaderKind,
    temp_path: PathBuf,
    ref_count: usize,
    sequence: u64,
    step: DownloadStep,
    request: Option<Box<dyn DownloadRequest>>,
    downloaded_bytes: u64,
    http_code: Option<u16>,
}

impl std::fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTask")
            .field("guid", &self.bundle.guid)
            .field("url", &self.url)
            .field("kind", &self.kind)
            .field("ref_count", &self.ref_count)
            .field("step", &self.step)
            .field("downloaded_bytes", &self.downloaded_bytes)
            .finish()
    }
}

impl DownloadTask {
    /// Create a pending task with one reference.
    pub fn new(
        bundle: BundleDescriptor,
        url: impl Into<String>,
        kind: DownloaderKind,
        temp_path: PathBuf,
        sequence: u64,
    ) -> Self {
        Self {
            bundle,
            url: url.into(),
            kind,
            temp_path,
            ref_count: 1,
            sequence,
            step: DownloadStep::Pending,
            request: None,
            downloaded_bytes: 0,
            http_code: None,
        }
    }

    pub fn bundle(&self) -> &BundleDescriptor {
        &self.bundle
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> DownloaderKind {
        self.kind
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn step(&self) -> &DownloadStep {
        &self.step
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn reference(&mut self) {
        self.ref_count += 1;
    }

    pub fn release(&mut self) {
        self.ref_count = self.ref_count.saturating_sub(1);
    }

    pub fn is_pending(&self) -> bool {
        self.step == DownloadStep::Pending
    }

    pub fn is_active(&self) -> bool {
        !self.is_pending() && !self.step.is_terminal()
    }

    pub fn is_done(&self) -> bool {
        self.step.is_terminal()
    }

    pub fn is_succeeded(&self) -> bool {
        self.step == DownloadStep::Succeeded
    }

    /// Failure reason of a failed or aborted task.
    pub fn error(&self) -> Option<String> {
        match &self.step {
            DownloadStep::Failed(reason) => Some(reason.clone()),
            DownloadStep::Aborted => Some("download aborted".to_string()),
            _ => None,
        }
    }

    pub fn http_code(&self) -> Option<u16> {
        self.http_code
    }

    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded_bytes
    }

    pub fn total_bytes(&self) -> u64 {
        self.bundle.file_size
    }

    pub fn progress(&self) -> f32 {
        if self.is_succeeded() || self.bundle.file_size == 0 {
            return if self.is_succeeded() { 1.0 } else { 0.0 };
        }
        (self.downloaded_bytes as f64 / self.bundle.file_size as f64).min(1.0) as f32
    }

    /// Leave the pending state and begin the transfer.
    pub fn start(&mut self, ctx: &mut TaskContext<'_>) {
        debug!(guid = %self.bundle.guid, kind = ?self.kind, url = %self.url, "Starting download");
        self.apply(DownloadEvent::Start);
        self.update(ctx);
    }

    /// Advance through every step that can complete without waiting.
    pub fn update(&mut self, ctx: &mut TaskContext<'_>) {
        loop {
            let event = match self.step {
                DownloadStep::CopyLocal => self.copy_local(ctx),
                DownloadStep::Request => self.create_request(ctx),
                DownloadStep::Transferring => match self.poll_request(ctx.settings) {
                    Some(event) => event,
                    None => return,
                },
                DownloadStep::Verifying => self.verify(),
                DownloadStep::Caching => self.cache(ctx.store),
                _ => return,
            };
            self.apply(event);
        }
    }

    /// Stop the task; a resumable partial file stays on disk.
    pub fn abort(&mut self) {
        if self.is_done() {
            return;
        }
        if let Some(mut request) = self.request.take() {
            request.abort();
        }
        debug!(guid = %self.bundle.guid, "Download aborted");
        self.apply(DownloadEvent::Abort);
    }

    fn apply(&mut self, event: DownloadEvent) {
        self.step = transition(&self.step, self.kind, event);
        match &self.step {
            DownloadStep::Succeeded => {
                info!(guid = %self.bundle.guid, bytes = self.bundle.file_size, "Bundle downloaded");
            }
            DownloadStep::Failed(reason) => {
                warn!(
                    guid = %self.bundle.guid,
                    url = %self.url,
                    reason = %reason,
                    "Bundle download failed"
                );
            }
            _ => {}
        }
    }

    fn copy_local(&mut self, ctx: &mut TaskContext<'_>) -> DownloadEvent {
        remove_file_if_exists(&self.temp_path);

        let Some(service) = ctx.local_copy else {
            return DownloadEvent::CopyFailed("no local copy service".to_string());
        };
        let info = LocalFileInfo {
            package_name: ctx.package_name.to_string(),
            bundle_name: self.bundle.bundle_name.clone(),
            source_file_url: self.url.clone(),
        };
        match service.copy_file(&info, &self.temp_path) {
            Ok(()) => {
                self.downloaded_bytes = file_len(&self.temp_path);
                DownloadEvent::CopySucceeded
            }
            Err(e) => {
                warn!(
                    guid = %self.bundle.guid,
                    error = %e,
                    "Local copy failed, falling back to request"
                );
                DownloadEvent::CopyFailed(e.to_string())
            }
        }
    }

    fn create_request(&mut self, ctx: &mut TaskContext<'_>) -> DownloadEvent {
        if let Some(parent) = self.temp_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return DownloadEvent::TransferFailed(format!(
                    "failed to create temp directory {}: {}",
                    parent.display(),
                    e
                ));
            }
        }

        let resume_from = match self.kind {
            DownloaderKind::Resumable => {
                let existing = file_len(&self.temp_path);
                if existing >= self.bundle.file_size {
                    remove_file_if_exists(&self.temp_path);
                    0
                } else {
                    existing
                }
            }
            DownloaderKind::Normal | DownloaderKind::LocalCopy => {
                remove_file_if_exists(&self.temp_path);
                0
            }
        };
        if resume_from > 0 {
            debug!(guid = %self.bundle.guid, resume_from, "Resuming partial download");
        }

        let mut request = ctx.backend.create_file_request(FileRequestArgs {
            url: self.url.clone(),
            save_path: self.temp_path.clone(),
            timeout: None,
            watchdog: ctx.settings.watchdog_time,
            resume_from,
            remove_file_on_abort: self.kind != DownloaderKind::Resumable,
        });
        request.send();
        self.downloaded_bytes = resume_from;
        self.request = Some(request);
        DownloadEvent::RequestCreated
    }

    fn poll_request(&mut self, settings: &DownloadSettings) -> Option<DownloadEvent> {
        let request = self.request.as_mut()?;
        request.poll();
        self.downloaded_bytes = request.downloaded_bytes();
        self.http_code = request.http_code();

        let event = match request.status() {
            RequestStatus::Succeed => DownloadEvent::TransferSucceeded,
            RequestStatus::Failed => {
                let reason = request
                    .error()
                    .unwrap_or_else(|| "download failed".to_string());
                let discard_partial = match self.kind {
                    DownloaderKind::Resumable => self
                        .http_code
                        .is_some_and(|code| settings.resume_response_codes.contains(&code)),
                    DownloaderKind::Normal | DownloaderKind::LocalCopy => true,
                };
                if discard_partial {
                    remove_file_if_exists(&self.temp_path);
                }
                DownloadEvent::TransferFailed(reason)
            }
            RequestStatus::Aborted => DownloadEvent::TransferFailed("request aborted".to_string()),
            RequestStatus::None | RequestStatus::Running => return None,
        };
        self.request = None;
        Some(event)
    }

    fn verify(&mut self) -> DownloadEvent {
        match verify_temp_file(&self.temp_path, &self.bundle) {
            Ok(()) => DownloadEvent::VerifySucceeded,
            Err(e) => {
                remove_file_if_exists(&self.temp_path);
                DownloadEvent::VerifyFailed(e.to_string())
            }
        }
    }

    fn cache(&mut self, store: &mut CacheStore) -> DownloadEvent {
        let result = store.write_bundle_file(&self.bundle, &self.temp_path);
        remove_file_if_exists(&self.temp_path);
        match result {
            Ok(()) => DownloadEvent::CacheSucceeded,
            Err(e) => DownloadEvent::CacheFailed(e.to_string()),
        }
    }
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn remove_file_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove temp file");
        }
    }
}
