//! Copying bundles that ship with the application.

use std::fs;
use std::io;
use std::path::Path;

use super::url::file_url_to_path;

/// Source description handed to a [`LocalCopyService`].
#[derive(Debug, Clone)]
pub struct LocalFileInfo {
    pub package_name: String,
    pub bundle_name: String,
    pub source_file_url: String,
}

/// Copies a local bundle file to a destination path.
pub trait LocalCopyService: Send + Sync {
    fn copy_file(&self, info: &LocalFileInfo, dest: &Path) -> io::Result<()>;
}

/// Copies plain `file://` sources with the standard library.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsLocalCopy;

impl LocalCopyService for FsLocalCopy {
    fn copy_file(&self, info: &LocalFileInfo, dest: &Path) -> io::Result<()> {
        let source = file_url_to_path(&info.source_file_url).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsupported local url: {}", info.source_file_url),
            )
        })?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, dest).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::to_file_url;
    use tempfile::TempDir;

    fn info(url: String) -> LocalFileInfo {
        LocalFileInfo {
            package_name: "pkg".to_string(),
            bundle_name: "a".to_string(),
            source_file_url: url,
        }
    }

    #[test]
    fn test_copies_file_url() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.bundle");
        fs::write(&source, b"builtin").unwrap();
        let dest = dir.path().join("out").join("a.temp");

        FsLocalCopy.copy_file(&info(to_file_url(&source)), &dest).unwrap();

        assert_eq!(fs::read(dest).unwrap(), b"builtin");
    }

    #[test]
    fn test_rejects_archive_url() {
        let dir = TempDir::new().unwrap();
        let err = FsLocalCopy
            .copy_file(&info("jar:file:///app.apk!/a".to_string()), &dir.path().join("x"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
