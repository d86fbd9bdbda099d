//! Checksums for packaged blobs

use crate::domain::{Result, TransferError};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Hex-encoded SHA-256 of raw bytes
///
/// # Examples
///
/// ```
/// use vatransfer::core::package::checksum::calculate_checksum_bytes;
///
/// let checksum = calculate_checksum_bytes(b"EAV");
/// assert_eq!(checksum.len(), 64);
/// ```
pub fn calculate_checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hex-encoded SHA-256 of a file's contents
pub fn calculate_file_checksum(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| {
        TransferError::Io(format!("Failed to read {} for checksum: {}", path.display(), e))
    })?;
    Ok(calculate_checksum_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            calculate_checksum_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_checksum_matches_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("blob.db");
        std::fs::write(&path, b"Test data").unwrap();

        assert_eq!(
            calculate_file_checksum(&path).unwrap(),
            calculate_checksum_bytes(b"Test data")
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(calculate_file_checksum(&dir.path().join("nope")).is_err());
    }
}
