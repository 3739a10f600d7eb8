use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Marker stored for empty directories so they group together.
const EMPTY_DIRECTORY_MARKER: &str = "dir:empty";

/// SHA-256 of a file's bytes, lower-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentChecksum(String);

impl ContentChecksum {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn empty_directory() -> Self {
        Self(EMPTY_DIRECTORY_MARKER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn compute_checksum(bytes: &[u8]) -> ContentChecksum {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentChecksum(hex::encode(hasher.finalize()))
}

/// Streaming checksum of a file on disk.
pub fn checksum_file(path: &Path) -> io::Result<ContentChecksum> {
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(ContentChecksum(hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            compute_checksum(b"abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_checksum_matches_in_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &content).unwrap();

        assert_eq!(checksum_file(&path).unwrap(), compute_checksum(&content));
    }

    #[test]
    fn test_different_content_differs() {
        assert_ne!(compute_checksum(b"one"), compute_checksum(b"two"));
    }
}
