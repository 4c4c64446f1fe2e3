//! Package manifest model.
//!
//! A manifest lists every bundle of a package version together with the
//! identity, size and checksums the cache needs to decide whether a local
//! file is usable. Manifests are stored as JSON bytes next to a hash file
//! holding the lowercase hex SHA-256 of those bytes.

mod bundle;
mod hash;
mod package;

pub use bundle::BundleDescriptor;
pub use hash::{calculate_checksum, calculate_file_checksum};
pub use package::{ManifestError, ManifestResult, PackageManifest};
