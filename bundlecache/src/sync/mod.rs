//! Manifest synchronisation.
//!
//! Fetches the published version string of a package and loads the
//! matching manifest, downloading the `.hash` and `.bytes` files into the
//! cache's manifest directory when they are not there yet.
//!
//! Remote file names:
//! - `<package>.version`: the current version string
//! - `<package>_<version>.hash`: lowercase hex SHA-256 of the manifest bytes
//! - `<package>_<version>.bytes`: the manifest itself

mod manifest_op;
mod version_op;

pub use manifest_op::LoadManifestOperation;
pub use version_op::RequestVersionOperation;

/// Remote file name of a package's version file.
pub fn version_file_name(package_name: &str) -> String {
    format!("{}.version", package_name)
}

/// Remote file name of a manifest's hash file.
pub fn manifest_hash_file_name(package_name: &str, version: &str) -> String {
    format!("{}_{}.hash", package_name, version)
}

/// Remote file name of a manifest.
pub fn manifest_file_name(package_name: &str, version: &str) -> String {
    format!("{}_{}.bytes", package_name, version)
}
