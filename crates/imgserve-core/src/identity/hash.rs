//! MD5 content hashing.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::types::ContentHash;

/// Content hashing for originals.
pub struct Hasher;

impl Hasher {
    /// Hash a file's contents without loading it into memory.
    pub fn content_hash(path: &Path) -> std::io::Result<ContentHash> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = Md5::new();

        let mut buffer = [0u8; 65536];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(ContentHash::from_hex_unchecked(format!(
            "{:x}",
            hasher.finalize()
        )))
    }

    /// Hash an in-memory buffer.
    pub fn content_hash_from_bytes(data: &[u8]) -> ContentHash {
        ContentHash::of_bytes(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_and_buffer_hashes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let from_file = Hasher::content_hash(&path).unwrap();
        let from_bytes = Hasher::content_hash_from_bytes(&data);
        assert_eq!(from_file, from_bytes);
        assert_eq!(from_file.as_str().len(), 32);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Hasher::content_hash(&dir.path().join("nope")).is_err());
    }
}
