//! bundlecache - content-addressed bundle cache with verified downloads
//!
//! This library decides whether an asset bundle is present on local disk,
//! downloads it through a concurrency-limited, de-duplicating scheduler,
//! verifies it against the manifest's CRC32 and size, and hands the bytes
//! (decrypted when needed) to an asset-container loader.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────┐
//!   ManifestSync ───►│   CacheFileSystem    │◄─── AssetContainerLoader
//!                    └─────┬──────────┬─────┘
//!                          │          │
//!                ┌─────────▼───┐  ┌───▼────────────┐
//!                │ CacheStore  │  │ DownloadCenter │
//!                │ (index+disk)│  │  (scheduler)   │
//!                └─────────────┘  └───┬────────────┘
//!                                     │ DownloadTask ×N
//!                                 ┌───▼─────────────┐
//!                                 │ DownloadBackend │
//!                                 └─────────────────┘
//! ```
//!
//! All long-running work is expressed as [`operation::Operation`] step
//! functions advanced by a single scheduling thread; see
//! [`operation::wait_for_completion`] and [`operation::drive_to_completion`].

pub mod cache;
pub mod config;
pub mod download;
pub mod fs;
pub mod logging;
pub mod manifest;
pub mod operation;
pub mod sync;

pub use cache::{CacheError, CacheFileStatus, VerifyLevel};
pub use fs::{CacheFileSystem, FileSystemServices};
pub use manifest::{BundleDescriptor, PackageManifest};
pub use operation::{Operation, OperationStatus};

/// Library version, also used as the default application footprint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
