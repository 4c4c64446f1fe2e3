//! Local file URL helpers.

use std::path::{Path, PathBuf};

const FILE_SCHEME: &str = "file://";

/// True for URLs served from the local file system.
pub fn is_local_file_url(url: &str) -> bool {
    url.starts_with("file:") || url.starts_with("jar:file:")
}

/// Convert a local path into a `file://` URL.
///
/// Characters that would otherwise be read as URL syntax are escaped.
pub fn to_file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let escaped = raw
        .replace('%', "%25")
        .replace('+', "%2B")
        .replace('#', "%23")
        .replace('?', "%3F");
    if escaped.starts_with('/') {
        format!("{}{}", FILE_SCHEME, escaped)
    } else {
        format!("{}/{}", FILE_SCHEME, escaped)
    }
}

/// Recover the local path from a `file://` URL.
///
/// Returns `None` for remote URLs and for archive (`jar:`) URLs, which
/// need a dedicated copy service.
pub fn file_url_to_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix(FILE_SCHEME)?;
    let decoded = rest
        .replace("%2B", "+")
        .replace("%23", "#")
        .replace("%3F", "?")
        .replace("%25", "%");
    Some(PathBuf::from(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_local_file_url() {
        assert!(is_local_file_url("file:///data/a.bundle"));
        assert!(is_local_file_url("jar:file:///app.apk!/assets/a.bundle"));
        assert!(!is_local_file_url("https://cdn.example.com/a.bundle"));
        assert!(!is_local_file_url("/data/a.bundle"));
    }

    #[test]
    fn test_file_url_escapes_and_restores_path() {
        let path = Path::new("/data/c++/a#1?.bundle");
        let url = to_file_url(path);

        assert_eq!(url, "file:///data/c%2B%2B/a%231%3F.bundle");
        assert_eq!(file_url_to_path(&url).unwrap(), path);
    }

    #[test]
    fn test_remote_url_has_no_path() {
        assert!(file_url_to_path("https://cdn.example.com/a").is_none());
        assert!(file_url_to_path("jar:file:///a.apk!/a").is_none());
    }
}
