//! Application footprint used to detect overwrite installs.
//!
//! The footprint is the application version that last wrote the cache. A
//! different version on startup means the application was reinstalled
//! over an existing cache, which triggers the configured
//! [`InstallClearMode`].

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File name of the footprint inside the manifest directory.
pub const FOOTPRINT_FILE_NAME: &str = "ApplicationFootPrint.bytes";

/// What to clear when an overwrite install is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallClearMode {
    None,
    ClearAllCacheFiles,
    ClearAllBundleFiles,
    #[default]
    ClearAllManifestFiles,
}

impl InstallClearMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallClearMode::None => "none",
            InstallClearMode::ClearAllCacheFiles => "all",
            InstallClearMode::ClearAllBundleFiles => "bundles",
            InstallClearMode::ClearAllManifestFiles => "manifests",
        }
    }
}

impl fmt::Display for InstallClearMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallClearMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(InstallClearMode::None),
            "all" => Ok(InstallClearMode::ClearAllCacheFiles),
            "bundles" => Ok(InstallClearMode::ClearAllBundleFiles),
            "manifests" => Ok(InstallClearMode::ClearAllManifestFiles),
            other => Err(format!(
                "invalid install clear mode '{}', expected none, all, bundles or manifests",
                other
            )),
        }
    }
}

/// Footprint stored on disk and the value of the running application.
#[derive(Debug, Clone)]
pub struct AppFootprint {
    path: PathBuf,
    current: String,
    saved: String,
}

impl AppFootprint {
    /// Read the saved footprint, writing `current` on first run.
    pub fn load(path: &Path, current: &str) -> io::Result<Self> {
        let saved = match fs::read_to_string(path) {
            Ok(saved) => saved.trim().to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                write_footprint(path, current)?;
                current.to_string()
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            path: path.to_path_buf(),
            current: current.to_string(),
            saved,
        })
    }

    /// True when the cache was written by another application version.
    pub fn is_dirty(&self) -> bool {
        self.saved != self.current
    }

    pub fn saved(&self) -> &str {
        &self.saved
    }

    /// Overwrite the saved footprint with the running version.
    pub fn coverage(&mut self) -> io::Result<()> {
        write_footprint(&self.path, &self.current)?;
        self.saved = self.current.clone();
        Ok(())
    }
}

fn write_footprint(path: &Path, value: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_run_writes_footprint_and_is_clean() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest").join(FOOTPRINT_FILE_NAME);

        let footprint = AppFootprint::load(&path, "1.0.0").unwrap();

        assert!(!footprint.is_dirty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "1.0.0");
    }

    #[test]
    fn test_version_change_is_dirty_until_coverage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(FOOTPRINT_FILE_NAME);
        AppFootprint::load(&path, "1.0.0").unwrap();

        let mut footprint = AppFootprint::load(&path, "1.1.0").unwrap();
        assert!(footprint.is_dirty());
        assert_eq!(footprint.saved(), "1.0.0");

        footprint.coverage().unwrap();
        assert!(!footprint.is_dirty());
        assert!(!AppFootprint::load(&path, "1.1.0").unwrap().is_dirty());
    }

    #[test]
    fn test_install_clear_mode_parse() {
        assert_eq!(
            "bundles".parse::<InstallClearMode>().unwrap(),
            InstallClearMode::ClearAllBundleFiles
        );
        assert_eq!(InstallClearMode::default(), InstallClearMode::ClearAllManifestFiles);
        assert!("everything".parse::<InstallClearMode>().is_err());
        for mode in [
            InstallClearMode::None,
            InstallClearMode::ClearAllCacheFiles,
            InstallClearMode::ClearAllBundleFiles,
            InstallClearMode::ClearAllManifestFiles,
        ] {
            assert_eq!(mode.to_string().parse::<InstallClearMode>().unwrap(), mode);
        }
    }
}
