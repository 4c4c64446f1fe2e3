//! Transport abstraction used by download tasks.
//!
//! A backend creates request handles; the scheduling thread then calls
//! [`DownloadRequest::poll`] once per tick and reads the status. Handles
//! never block the caller.

use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Created but not sent.
    None,
    Running,
    Succeed,
    Failed,
    Aborted,
}

impl RequestStatus {
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            RequestStatus::Succeed | RequestStatus::Failed | RequestStatus::Aborted
        )
    }
}

/// Parameters of a request whose body is streamed into a file.
#[derive(Debug, Clone)]
pub struct FileRequestArgs {
    pub url: String,
    pub save_path: PathBuf,
    /// Total timeout; `None` for bundle files, which can be arbitrarily large.
    pub timeout: Option<Duration>,
    /// Abort when no new bytes arrive within this window.
    pub watchdog: Option<Duration>,
    /// Byte offset to resume from; the body is appended to `save_path`.
    pub resume_from: u64,
    /// Delete `save_path` when the request is aborted.
    pub remove_file_on_abort: bool,
}

/// Parameters of a request whose body is kept in memory.
#[derive(Debug, Clone)]
pub struct DataRequestArgs {
    pub url: String,
    pub timeout: Option<Duration>,
    pub watchdog: Option<Duration>,
}

/// Handle of one in-flight request.
pub trait DownloadRequest: Send {
    /// Start the transfer. Calling it twice has no effect.
    fn send(&mut self);

    /// Refresh progress and enforce the watchdog.
    fn poll(&mut self);

    fn status(&self) -> RequestStatus;

    fn is_done(&self) -> bool {
        self.status().is_done()
    }

    /// Bytes present at the destination, including any resumed prefix.
    fn downloaded_bytes(&self) -> u64;

    /// HTTP status of the response, when one was received.
    fn http_code(&self) -> Option<u16>;

    fn error(&self) -> Option<String>;

    fn abort(&mut self);

    /// Body of a finished data request.
    fn take_data(&mut self) -> Option<Vec<u8>> {
        None
    }
}

/// Factory of request handles.
pub trait DownloadBackend: Send + Sync {
    fn create_file_request(&self, args: FileRequestArgs) -> Box<dyn DownloadRequest>;

    fn create_data_request(&self, args: DataRequestArgs) -> Box<dyn DownloadRequest>;

    /// Called once per scheduler tick before any task is polled.
    fn update(&self) {}
}
