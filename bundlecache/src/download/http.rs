//! HTTP download backend.
//!
//! Each request runs on its own worker thread using the blocking reqwest
//! client and publishes progress through atomics, so polling from the
//! scheduling thread never blocks. Supports:
//! - Range requests for resuming partial files
//! - `file://` sources, read straight from disk
//! - Abort between chunks, optionally deleting the partial file
//! - A stall watchdog enforced on poll
//!
//! The handle settles the request itself on abort or watchdog timeout. The
//! worker may still be blocked in a read at that point, so every file
//! access it makes goes through a gate that abort also takes: once abort
//! returns, the worker never touches the destination again and a retry can
//! safely reuse the same path.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::backend::{
    DataRequestArgs, DownloadBackend, DownloadRequest, FileRequestArgs, RequestStatus,
};
use super::url::file_url_to_path;
use super::watchdog::Watchdog;

/// Buffer size for reading/writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Backend issuing real HTTP requests.
#[derive(Debug, Clone)]
pub struct HttpDownloadBackend {
    client: Client,
}

impl HttpDownloadBackend {
    /// Create a backend with a default client.
    ///
    /// The client has no overall timeout: requests get one only when the
    /// caller passes it, and stalls are left to the watchdog.
    ///
    /// # Errors
    ///
    /// Fails when the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("bundlecache/", env!("CARGO_PKG_VERSION")))
            .timeout(None)
            .build()?;
        Ok(Self { client })
    }

    /// Create a backend around an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn request(
        &self,
        url: String,
        sink: Sink,
        timeout: Option<Duration>,
        watchdog: Option<Duration>,
        resume_from: u64,
    ) -> Box<dyn DownloadRequest> {
        let remove_on_abort = match &sink {
            Sink::File { path, remove_on_abort: true } => Some(path.clone()),
            _ => None,
        };
        Box::new(HttpRequest {
            client: self.client.clone(),
            url,
            sink: Some(sink),
            remove_on_abort,
            timeout,
            resume_from,
            shared: Arc::new(Shared::default()),
            watchdog: Watchdog::new(watchdog),
        })
    }
}

impl DownloadBackend for HttpDownloadBackend {
    fn create_file_request(&self, args: FileRequestArgs) -> Box<dyn DownloadRequest> {
        let sink = Sink::File {
            path: args.save_path,
            remove_on_abort: args.remove_file_on_abort,
        };
        self.request(args.url, sink, args.timeout, args.watchdog, args.resume_from)
    }

    fn create_data_request(&self, args: DataRequestArgs) -> Box<dyn DownloadRequest> {
        self.request(args.url, Sink::Memory, args.timeout, args.watchdog, 0)
    }
}

/// Where the response body goes.
#[derive(Debug)]
enum Sink {
    File { path: PathBuf, remove_on_abort: bool },
    Memory,
}

/// State shared between the worker thread and the request handle.
#[derive(Debug)]
struct Shared {
    status: Mutex<RequestStatus>,
    downloaded: AtomicU64,
    http_code: AtomicU16,
    error: Mutex<Option<String>>,
    data: Mutex<Option<Vec<u8>>>,
    abort: AtomicBool,
    /// Held by the worker around file access and by [`Shared::cancel`].
    gate: Mutex<()>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            status: Mutex::new(RequestStatus::None),
            downloaded: AtomicU64::new(0),
            http_code: AtomicU16::new(0),
            error: Mutex::new(None),
            data: Mutex::new(None),
            abort: AtomicBool::new(false),
            gate: Mutex::new(()),
        }
    }
}

impl Shared {
    /// Stop the worker. No file access happens after this returns.
    fn cancel(&self) {
        let _gate = self.gate.lock();
        self.abort.store(true, Ordering::Release);
    }

    /// Publish a final status unless one is already set.
    fn settle(&self, status: RequestStatus, error: Option<String>) -> bool {
        let mut current = self.status.lock();
        if current.is_done() {
            return false;
        }
        *current = status;
        if error.is_some() {
            *self.error.lock() = error;
        }
        true
    }

    /// Run `f` under the gate unless the request was aborted.
    fn gated<T>(&self, f: impl FnOnce() -> io::Result<T>) -> Result<T, TransferError> {
        let _gate = self.gate.lock();
        if self.abort.load(Ordering::Acquire) {
            return Err(TransferError::Aborted);
        }
        Ok(f()?)
    }
}

enum TransferError {
    Aborted,
    Failed(String),
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        TransferError::Failed(e.to_string())
    }
}

struct HttpRequest {
    client: Client,
    url: String,
    sink: Option<Sink>,
    remove_on_abort: Option<PathBuf>,
    timeout: Option<Duration>,
    resume_from: u64,
    shared: Arc<Shared>,
    watchdog: Watchdog,
}

impl DownloadRequest for HttpRequest {
    fn send(&mut self) {
        let Some(sink) = self.sink.take() else {
            return;
        };
        *self.shared.status.lock() = RequestStatus::Running;

        let client = self.client.clone();
        let url = self.url.clone();
        let timeout = self.timeout;
        let resume_from = self.resume_from;
        let shared = Arc::clone(&self.shared);

        thread::spawn(move || run_transfer(&client, &url, sink, timeout, resume_from, &shared));
    }

    fn poll(&mut self) {
        if self.status() != RequestStatus::Running {
            return;
        }
        let bytes = self.shared.downloaded.load(Ordering::Acquire);
        if self.watchdog.observe(bytes) {
            warn!(url = %self.url, bytes, "Transfer stalled, aborting");
            // The partial file is left for the caller to keep or discard.
            self.shared.cancel();
            let secs = self.watchdog.limit().map(|l| l.as_secs()).unwrap_or(0);
            self.shared.settle(
                RequestStatus::Failed,
                Some(format!("watchdog timeout: no data received for {}s", secs)),
            );
        }
    }

    fn status(&self) -> RequestStatus {
        *self.shared.status.lock()
    }

    fn downloaded_bytes(&self) -> u64 {
        self.shared.downloaded.load(Ordering::Acquire)
    }

    fn http_code(&self) -> Option<u16> {
        match self.shared.http_code.load(Ordering::Acquire) {
            0 => None,
            code => Some(code),
        }
    }

    fn error(&self) -> Option<String> {
        self.shared.error.lock().clone()
    }

    fn abort(&mut self) {
        self.shared.cancel();
        self.sink = None;
        if self.shared.settle(RequestStatus::Aborted, None) {
            if let Some(path) = &self.remove_on_abort {
                let _ = fs::remove_file(path);
            }
        }
    }

    fn take_data(&mut self) -> Option<Vec<u8>> {
        self.shared.data.lock().take()
    }
}

impl Drop for HttpRequest {
    fn drop(&mut self) {
        self.shared.cancel();
    }
}

fn run_transfer(
    client: &Client,
    url: &str,
    sink: Sink,
    timeout: Option<Duration>,
    resume_from: u64,
    shared: &Shared,
) {
    match transfer(client, url, &sink, timeout, resume_from, shared) {
        Ok(()) => {
            debug!(url, bytes = shared.downloaded.load(Ordering::Acquire), "Transfer complete");
            shared.settle(RequestStatus::Succeed, None);
        }
        // Whoever aborted already settled the request and owns the file.
        Err(TransferError::Aborted) => {
            shared.settle(RequestStatus::Aborted, None);
        }
        Err(TransferError::Failed(reason)) => {
            debug!(url, reason = %reason, "Transfer failed");
            shared.settle(RequestStatus::Failed, Some(reason));
        }
    }
}

fn transfer(
    client: &Client,
    url: &str,
    sink: &Sink,
    timeout: Option<Duration>,
    resume_from: u64,
    shared: &Shared,
) -> Result<(), TransferError> {
    let (mut reader, offset) = open_source(client, url, timeout, resume_from, shared)?;
    shared.downloaded.store(offset, Ordering::Release);

    // Unbuffered so nothing is left to flush into the file after an abort.
    let mut file = match sink {
        Sink::File { path, .. } => Some(shared.gated(|| open_destination(path, offset))?),
        Sink::Memory => None,
    };
    let mut memory = Vec::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        if shared.abort.load(Ordering::Acquire) {
            return Err(TransferError::Aborted);
        }
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        match file.as_mut() {
            Some(file) => shared.gated(|| file.write_all(&buffer[..bytes_read]))?,
            None => memory.extend_from_slice(&buffer[..bytes_read]),
        }
        shared.downloaded.fetch_add(bytes_read as u64, Ordering::AcqRel);
    }

    if file.is_none() {
        *shared.data.lock() = Some(memory);
    }
    Ok(())
}

/// Open the body stream, returning it with the offset it starts at.
fn open_source(
    client: &Client,
    url: &str,
    timeout: Option<Duration>,
    resume_from: u64,
    shared: &Shared,
) -> Result<(Box<dyn Read + Send>, u64), TransferError> {
    if let Some(path) = file_url_to_path(url) {
        let mut file = File::open(&path)?;
        let len = file.metadata()?.len();
        let offset = resume_from.min(len);
        file.seek(SeekFrom::Start(offset))?;
        shared.http_code.store(StatusCode::OK.as_u16(), Ordering::Release);
        return Ok((Box::new(file), offset));
    }

    let mut request = client.get(url);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }
    if resume_from > 0 {
        request = request.header(RANGE, format!("bytes={}-", resume_from));
    }

    let response = request
        .send()
        .map_err(|e| TransferError::Failed(e.to_string()))?;
    let status = response.status();
    shared.http_code.store(status.as_u16(), Ordering::Release);

    if !status.is_success() {
        return Err(TransferError::Failed(format!("HTTP {}", status)));
    }

    // A server that ignores the Range header sends the whole body.
    let offset = if status == StatusCode::PARTIAL_CONTENT {
        resume_from
    } else {
        0
    };
    Ok((Box::new(response), offset))
}

fn open_destination(path: &Path, offset: u64) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if offset > 0 {
        OpenOptions::new().append(true).open(path)
    } else {
        File::create(path)
    }
}
