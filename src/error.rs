//! Error types for tree-dedupe

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DedupeError {
    #[error("literal run exceeded the {limit} byte cap of a {prefix_len}-byte length prefix")]
    PrefixTooSmall { prefix_len: u8, limit: u64 },

    #[error("encoded stream references unknown dictionary code {code:02x?}")]
    UnknownCode { code: Vec<u8> },

    #[error("corrupt dictionary: {0}")]
    CorruptDictionary(String),

    #[error("no dedupe metadata found walking up from {}", start.display())]
    MetadataNotFound { start: PathBuf },

    #[error("metadata does not match the encoded stream: {0}")]
    MetadataMismatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl DedupeError {
    /// Surface a worker pool failure (lost task, closed semaphore) as an IO
    /// failure.
    pub(crate) fn worker(err: impl std::fmt::Display) -> Self {
        DedupeError::IoError(std::io::Error::new(
            std::io::ErrorKind::Other,
            err.to_string(),
        ))
    }
}
