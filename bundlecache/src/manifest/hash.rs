//! SHA-256 checksums for manifest files.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Lowercase hexadecimal SHA-256 of an in-memory buffer.
pub fn calculate_checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Lowercase hexadecimal SHA-256 of a file's contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn calculate_file_checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_checksum_known_value() {
        // echo -n "hello world" | sha256sum
        assert_eq!(
            calculate_checksum(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_file_checksum_matches_buffer_checksum() {
        let mut file = NamedTempFile::new().unwrap();
        let data = vec![0x5au8; BUFFER_SIZE * 2 + 17];
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        assert_eq!(
            calculate_file_checksum(file.path()).unwrap(),
            calculate_checksum(&data)
        );
    }

    #[test]
    fn test_file_checksum_missing_file() {
        assert!(calculate_file_checksum(Path::new("/nonexistent/manifest.bytes")).is_err());
    }
}
