//! tree-dedupe: block-level deduplication across a file tree.
//!
//! Scans every file for recurring fixed-size blocks, hill-climbs to a good
//! block size, then rewrites each file as literal runs interleaved with
//! compact references into one shared dictionary. The dictionary is
//! persisted at the tree root and the reverse pass reconstructs every file
//! byte for byte.
//!
//! Encoded frame layout, all integers big-endian:
//! `[literal_len][literal bytes][code_len][code bytes]`, final frame
//! literal-only.

pub mod config;
pub mod decoder;
pub mod dictionary;
pub mod encoder;
pub mod error;
pub mod estimator;
pub mod format;
pub mod metadata;
pub mod optimizer;
pub mod scanner;
pub mod session;
pub mod walk;

pub use config::DedupeConfig;
pub use decoder::{decode_file, decode_stream, DecodeStats};
pub use dictionary::{Dictionary, InverseDictionary};
pub use encoder::{encode_file, encode_stream, EncodeStats};
pub use error::DedupeError;
pub use estimator::estimated_savings;
pub use metadata::Metadata;
pub use optimizer::{search_block_size, SearchResult};
pub use scanner::{scan_corpus, scan_file, scan_reader, FrequencyTable};
pub use session::{
    format_bytes, DedupeReport, DedupeSession, FileFailure, UndedupeReport, UndedupeSession,
};
