//! On-disk bundle cache.
//!
//! The cache keeps one folder per bundle GUID holding the data file and a
//! small binary sidecar (`__info`) with the CRC32, size and file name. The
//! in-memory [`CacheIndex`] only ever contains records whose data file was
//! verified, either at download time or by the startup scan.
//!
//! ```text
//! <root>/<package>/
//! ├── bundles/<hash prefix>/<guid>/__data
//! │                               └── __info
//! ├── manifest/<version>.bytes | <version>.hash | ApplicationFootPrint.bytes
//! └── temp/<guid>.temp
//! ```

mod error;
mod footprint;
mod index;
mod layout;
mod record;
mod store;
mod verify;

pub use error::{CacheError, CacheResult};
pub use footprint::{AppFootprint, InstallClearMode, FOOTPRINT_FILE_NAME};
pub use index::CacheIndex;
pub use layout::{CacheLayout, DATA_FILE_NAME, INFO_FILE_NAME, TEMP_FILE_EXTENSION};
pub use record::{BundleInfo, CacheRecord, VerifyState};
pub use store::{CacheStore, SearchOutcome};
pub use verify::{
    file_crc32, verify_file, verify_temp_file, CacheFileStatus, VerifyError, VerifyLevel,
    VerifyResult,
};
