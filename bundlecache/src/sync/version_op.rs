//! Request of the latest package version.

use std::time::Duration;

use tracing::{debug, warn};

use super::version_file_name;
use crate::download::{DataRequestArgs, DownloadRequest, RequestStatus};
use crate::fs::CacheFileSystem;
use crate::operation::{Operation, OperationState, OperationStatus};

const FAILURE_KEY: &str = "version";

/// Fetches `<package>.version` and exposes its trimmed contents.
pub struct RequestVersionOperation {
    append_timestamp: bool,
    timeout: Duration,
    request: Option<Box<dyn DownloadRequest>>,
    version: Option<String>,
    state: OperationState,
}

impl RequestVersionOperation {
    pub(crate) fn new(append_timestamp: bool, timeout: Duration) -> Self {
        Self {
            append_timestamp,
            timeout,
            request: None,
            version: None,
            state: OperationState::default(),
        }
    }

    /// The version once the operation succeeded.
    pub fn package_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn send(&mut self, fs: &CacheFileSystem) {
        let mut url = fs.request_url(FAILURE_KEY, &version_file_name(fs.package_name()));
        if self.append_timestamp {
            let separator = if url.contains('?') { '&' } else { '?' };
            url = format!("{}{}t={}", url, separator, chrono::Utc::now().timestamp_millis());
        }
        debug!(url = %url, "Requesting package version");

        let mut request = fs.services().backend.create_data_request(DataRequestArgs {
            url,
            timeout: Some(self.timeout),
            watchdog: fs.config().download.watchdog_time,
        });
        request.send();
        self.request = Some(request);
    }
}

impl Operation for RequestVersionOperation {
    fn update(&mut self, fs: &mut CacheFileSystem) {
        if self.state.is_done() {
            return;
        }
        self.state.processing();

        let Some(request) = self.request.as_mut() else {
            self.send(fs);
            return;
        };

        request.poll();
        match request.status() {
            RequestStatus::Succeed => {
                let data = request.take_data().unwrap_or_default();
                self.request = None;
                let version = String::from_utf8_lossy(&data).trim().to_string();
                if version.is_empty() {
                    self.state.fail("remote package version file content is empty");
                } else {
                    self.version = Some(version);
                    self.state.succeed();
                }
            }
            RequestStatus::Failed | RequestStatus::Aborted => {
                let error = request
                    .error()
                    .unwrap_or_else(|| "version request failed".to_string());
                self.request = None;
                fs.record_request_failure(FAILURE_KEY);
                warn!(
                    package = %fs.package_name(),
                    error = %error,
                    "Package version request failed"
                );
                self.state.fail(error);
            }
            RequestStatus::None | RequestStatus::Running => {}
        }
    }

    fn status(&self) -> OperationStatus {
        self.state.status
    }

    fn error(&self) -> Option<&str> {
        self.state.error()
    }

    fn abort(&mut self, _fs: &mut CacheFileSystem) {
        if self.state.is_done() {
            return;
        }
        if let Some(mut request) = self.request.take() {
            request.abort();
        }
        self.state.fail("user abort");
    }
}
