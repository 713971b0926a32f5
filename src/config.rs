//! Configuration for tree-dedupe

use serde::{Deserialize, Serialize};

use crate::error::DedupeError;
use crate::format::max_prefixed_len;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeConfig {
    /// Starting block size for the search, and the block size used when no
    /// search runs.
    pub block_size: usize,
    /// Width in bytes of every length field in the encoded stream.
    pub prefix_len: u8,
    /// Initial distance between probed block sizes.
    pub search_step: usize,
    /// Upper bound on block-size search iterations.
    pub search_iterations: usize,
    /// Concurrent file scans and rewrites.
    pub max_workers: usize,
    /// File name suffixes to skip in addition to the tool's own artifacts.
    pub excluded_suffixes: Vec<String>,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            block_size: 128,
            prefix_len: 3, // literal runs up to 16 MB
            search_step: 64,
            search_iterations: 69,
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            excluded_suffixes: Vec::new(),
        }
    }
}

impl DedupeConfig {
    /// Reject parameter combinations that cannot produce a valid encoding.
    pub fn validate(&self) -> Result<(), DedupeError> {
        if self.block_size == 0 {
            return Err(DedupeError::InvalidConfig(
                "block_size must be at least 1".to_string(),
            ));
        }
        if !(1..=8).contains(&self.prefix_len) {
            return Err(DedupeError::InvalidConfig(format!(
                "prefix_len must be between 1 and 8, got {}",
                self.prefix_len
            )));
        }
        if self.block_size as u64 > max_prefixed_len(self.prefix_len) {
            return Err(DedupeError::InvalidConfig(format!(
                "block_size {} cannot be framed by a {}-byte length prefix",
                self.block_size, self.prefix_len
            )));
        }
        if self.search_step == 0 {
            return Err(DedupeError::InvalidConfig(
                "search_step must be at least 1".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(DedupeError::InvalidConfig(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
