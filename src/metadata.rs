//! Persisted run metadata: the prefix length plus the shared dictionary
//!
//! Layout: byte 0 is `prefix_len`, the rest is a gzip stream wrapping the
//! bincode encoding of the dictionary.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::dictionary::Dictionary;
use crate::error::DedupeError;
use crate::format::METADATA_FILE;

/// Everything the decode pass needs, persisted at the tree root.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub prefix_len: u8,
    pub dictionary: Dictionary,
}

impl Metadata {
    pub fn new(prefix_len: u8, dictionary: Dictionary) -> Self {
        Self {
            prefix_len,
            dictionary,
        }
    }

    /// Serialize to the on-disk layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DedupeError> {
        let encoded = bincode::serialize(&self.dictionary)
            .map_err(|e| DedupeError::SerializationError(e.to_string()))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&encoded)?;
        let compressed = encoder.finish()?;

        let mut bytes = Vec::with_capacity(compressed.len() + 1);
        bytes.push(self.prefix_len);
        bytes.extend_from_slice(&compressed);
        Ok(bytes)
    }

    /// Parse the on-disk layout, rejecting records this version cannot have
    /// written.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DedupeError> {
        let (&prefix_len, compressed) = bytes.split_first().ok_or_else(|| {
            DedupeError::MetadataMismatch("metadata record is empty".to_string())
        })?;
        if !(1..=8).contains(&prefix_len) {
            return Err(DedupeError::MetadataMismatch(format!(
                "unsupported prefix length {prefix_len}"
            )));
        }
        let mut decoder = GzDecoder::new(compressed);
        let mut encoded = Vec::new();
        decoder
            .read_to_end(&mut encoded)
            .map_err(|e| DedupeError::MetadataMismatch(format!("corrupt metadata stream: {e}")))?;
        let dictionary = bincode::deserialize(&encoded)
            .map_err(|e| DedupeError::SerializationError(e.to_string()))?;
        Ok(Self {
            prefix_len,
            dictionary,
        })
    }

    /// Write the record into `dir` and return its path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, DedupeError> {
        let path = dir.join(METADATA_FILE);
        fs::write(&path, self.to_bytes()?)?;
        Ok(path)
    }

    /// Load a record from an explicit path.
    pub fn load(path: &Path) -> Result<Self, DedupeError> {
        Self::from_bytes(&fs::read(path)?)
    }
}

/// Walk from `start` toward the filesystem root until a metadata record is
/// found.
pub fn find_upward(start: &Path) -> Result<PathBuf, DedupeError> {
    let mut dir = fs::canonicalize(start)?;
    loop {
        let candidate = dir.join(METADATA_FILE);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            return Err(DedupeError::MetadataNotFound {
                start: start.to_path_buf(),
            });
        }
    }
}
