//! In-process download backend.
//!
//! Serves registered payloads chunk by chunk, one chunk per poll, so a
//! transfer spans several scheduler ticks exactly like a network request.
//! Every request is recorded with the offset it resumed from, which makes
//! the backend the deterministic transport for tests.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use super::backend::{
    DataRequestArgs, DownloadBackend, DownloadRequest, FileRequestArgs, RequestStatus,
};
use super::watchdog::Watchdog;

/// Default bytes delivered per poll (64KB).
const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// A request observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub url: String,
    pub resume_from: u64,
}

#[derive(Debug, Clone)]
enum Resource {
    Payload(Bytes),
    Failure(u16),
    /// Accepts the request but never delivers a byte.
    Stall,
}

#[derive(Debug)]
struct State {
    resources: HashMap<String, Resource>,
    requests: Vec<RequestRecord>,
    chunk_size: usize,
}

/// Backend serving payloads from memory.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                resources: HashMap::new(),
                requests: Vec::new(),
                chunk_size: DEFAULT_CHUNK_SIZE,
            })),
        }
    }

    /// Set the number of bytes delivered per poll.
    pub fn with_chunk_size(self, chunk_size: usize) -> Self {
        self.state.lock().chunk_size = chunk_size.max(1);
        self
    }

    /// Serve `data` at `url`.
    pub fn insert(&self, url: impl Into<String>, data: impl Into<Bytes>) {
        self.state
            .lock()
            .resources
            .insert(url.into(), Resource::Payload(data.into()));
    }

    /// Answer requests for `url` with an HTTP error.
    pub fn insert_failure(&self, url: impl Into<String>, http_code: u16) {
        self.state
            .lock()
            .resources
            .insert(url.into(), Resource::Failure(http_code));
    }

    /// Accept requests for `url` without ever sending data.
    pub fn insert_stall(&self, url: impl Into<String>) {
        self.state.lock().resources.insert(url.into(), Resource::Stall);
    }

    pub fn remove(&self, url: &str) {
        self.state.lock().resources.remove(url);
    }

    /// All requests sent so far, in order.
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.state.lock().requests.clone()
    }

    /// Number of requests sent for `url`.
    pub fn request_count(&self, url: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    fn request(
        &self,
        url: String,
        target: Target,
        watchdog: Option<Duration>,
        resume_from: u64,
    ) -> Box<dyn DownloadRequest> {
        Box::new(MemoryRequest {
            backend: self.clone(),
            url,
            target,
            resume_from,
            position: resume_from,
            resource: None,
            status: RequestStatus::None,
            http_code: None,
            error: None,
            watchdog: Watchdog::new(watchdog),
            data: None,
        })
    }
}

impl DownloadBackend for MemoryBackend {
    fn create_file_request(&self, args: FileRequestArgs) -> Box<dyn DownloadRequest> {
        let target = Target::File {
            path: args.save_path,
            file: None,
            remove_on_abort: args.remove_file_on_abort,
        };
        self.request(args.url, target, args.watchdog, args.resume_from)
    }

    fn create_data_request(&self, args: DataRequestArgs) -> Box<dyn DownloadRequest> {
        self.request(args.url, Target::Memory(Vec::new()), args.watchdog, 0)
    }
}

#[derive(Debug)]
enum Target {
    File {
        path: PathBuf,
        file: Option<File>,
        remove_on_abort: bool,
    },
    Memory(Vec<u8>),
}

#[derive(Debug)]
struct MemoryRequest {
    backend: MemoryBackend,
    url: String,
    target: Target,
    resume_from: u64,
    position: u64,
    resource: Option<Resource>,
    status: RequestStatus,
    http_code: Option<u16>,
    error: Option<String>,
    watchdog: Watchdog,
    data: Option<Vec<u8>>,
}

impl MemoryRequest {
    fn fail(&mut self, http_code: Option<u16>, error: String) {
        self.http_code = http_code.or(self.http_code);
        self.error = Some(error);
        self.status = RequestStatus::Failed;
        if let Target::File { file, .. } = &mut self.target {
            file.take();
        }
    }

    fn write_chunk(&mut self, payload: &Bytes) -> io::Result<()> {
        let chunk_size = self.backend.state.lock().chunk_size as u64;
        let end = (self.position + chunk_size).min(payload.len() as u64);
        let chunk = &payload[self.position as usize..end as usize];

        match &mut self.target {
            Target::File { path, file, .. } => {
                if file.is_none() {
                    if let Some(parent) = path.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let opened = if self.resume_from > 0 {
                        OpenOptions::new().append(true).open(&*path)?
                    } else {
                        File::create(&*path)?
                    };
                    *file = Some(opened);
                }
                if let Some(f) = file.as_mut() {
                    f.write_all(chunk)?;
                }
            }
            Target::Memory(buffer) => buffer.extend_from_slice(chunk),
        }

        self.position = end;
        Ok(())
    }
}

impl DownloadRequest for MemoryRequest {
    fn send(&mut self) {
        if self.status != RequestStatus::None {
            return;
        }
        let mut state = self.backend.state.lock();
        state.requests.push(RequestRecord {
            url: self.url.clone(),
            resume_from: self.resume_from,
        });
        self.resource = state.resources.get(&self.url).cloned();
        drop(state);

        self.status = RequestStatus::Running;
        self.watchdog.observe(self.position);
    }

    fn poll(&mut self) {
        if self.status != RequestStatus::Running {
            return;
        }

        match self.resource.clone() {
            None => self.fail(Some(404), format!("HTTP 404 Not Found: {}", self.url)),
            Some(Resource::Failure(code)) => self.fail(Some(code), format!("HTTP {}", code)),
            Some(Resource::Stall) => {
                if self.watchdog.observe(self.position) {
                    let secs = self.watchdog.limit().map(|l| l.as_secs()).unwrap_or(0);
                    self.fail(None, format!("watchdog timeout: no data received for {}s", secs));
                }
            }
            Some(Resource::Payload(payload)) => {
                if self.resume_from > payload.len() as u64 {
                    self.fail(Some(416), "HTTP 416 Range Not Satisfiable".to_string());
                    return;
                }
                self.http_code = Some(if self.resume_from > 0 { 206 } else { 200 });
                if let Err(e) = self.write_chunk(&payload) {
                    self.fail(None, e.to_string());
                    return;
                }
                if self.position == payload.len() as u64 {
                    if let Target::Memory(buffer) = &mut self.target {
                        self.data = Some(std::mem::take(buffer));
                    }
                    if let Target::File { file, .. } = &mut self.target {
                        file.take();
                    }
                    self.status = RequestStatus::Succeed;
                }
            }
        }
    }

    fn status(&self) -> RequestStatus {
        self.status
    }

    fn downloaded_bytes(&self) -> u64 {
        self.position
    }

    fn http_code(&self) -> Option<u16> {
        self.http_code
    }

    fn error(&self) -> Option<String> {
        self.error.clone()
    }

    fn abort(&mut self) {
        if self.status.is_done() {
            return;
        }
        self.status = RequestStatus::Aborted;
        if let Target::File {
            path,
            file,
            remove_on_abort,
        } = &mut self.target
        {
            file.take();
            if *remove_on_abort {
                let _ = fs::remove_file(&*path);
            }
        }
    }

    fn take_data(&mut self) -> Option<Vec<u8>> {
        self.data.take()
    }
}
