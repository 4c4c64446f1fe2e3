//! Download pipeline.
//!
//! The [`DownloadCenter`] multiplexes bundle downloads over a bounded set
//! of active [`DownloadTask`]s. Each task drives one transfer through the
//! [`DownloadBackend`] abstraction, verifies the temp file and promotes it
//! into the cache.
//!
//! # Backends
//!
//! - [`HttpDownloadBackend`]: reqwest on worker threads, with Range resume
//!   and `file://` sources
//! - [`MemoryBackend`]: in-process payloads served chunk by chunk, used by
//!   tests and offline embedding

mod backend;
mod center;
mod config;
mod http;
mod local;
mod memory;
mod task;
mod url;
mod watchdog;

pub use backend::{
    DataRequestArgs, DownloadBackend, DownloadRequest, FileRequestArgs, RequestStatus,
};
pub use center::{DownloadCenter, SharedTask};
pub use config::{
    DownloadSettings, DEFAULT_FAILED_TRY_AGAIN, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_MAX_REQUESTS_PER_TICK, DEFAULT_RESUME_MIN_SIZE, DEFAULT_RETRY_DELAY,
};
pub use http::HttpDownloadBackend;
pub use local::{FsLocalCopy, LocalCopyService, LocalFileInfo};
pub use memory::{MemoryBackend, RequestRecord};
pub use task::{transition, DownloadEvent, DownloadStep, DownloadTask, DownloaderKind, TaskContext};
pub use url::{file_url_to_path, is_local_file_url, to_file_url};
pub use watchdog::Watchdog;
