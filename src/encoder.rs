//! Streaming encoder: rewrites input as literal runs and dictionary references
//!
//! The literal buffer grows one byte at a time through unmatched regions and
//! is checked against the dictionary at its trailing `block_size` window, so
//! recurring blocks are found at any byte offset, not only at multiples of
//! the block size.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::dictionary::Dictionary;
use crate::error::DedupeError;
use crate::format::{max_prefixed_len, read_up_to, write_len};

/// Byte accounting for one encoded stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeStats {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub frames: u64,
    pub matched_blocks: u64,
}

impl EncodeStats {
    /// Encoded size relative to the input, 1.0 for empty input.
    pub fn ratio(&self) -> f64 {
        if self.input_bytes == 0 {
            1.0
        } else {
            self.output_bytes as f64 / self.input_bytes as f64
        }
    }
}

/// Encode `reader` into `writer` using the shared dictionary.
///
/// Empty input produces an empty stream. Fails with
/// [`DedupeError::PrefixTooSmall`] before any oversized length field would
/// be written; the caller owns cleanup of the partial output.
pub fn encode_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    dictionary: &Dictionary,
    block_size: usize,
    prefix_len: u8,
) -> Result<EncodeStats, DedupeError> {
    let limit = max_prefixed_len(prefix_len);
    if block_size as u64 > limit {
        return Err(DedupeError::PrefixTooSmall { prefix_len, limit });
    }

    let mut stats = EncodeStats::default();
    let mut literal = vec![0u8; block_size];
    let got = read_up_to(reader, &mut literal)?;
    literal.truncate(got);
    stats.input_bytes += got as u64;

    let mut byte = [0u8; 1];
    loop {
        if literal.len() >= block_size {
            if let Some(code) = dictionary.code_for(&literal[literal.len() - block_size..]) {
                let run_len = literal.len() - block_size;
                write_len(writer, run_len as u64, prefix_len)?;
                writer.write_all(&literal[..run_len])?;
                write_len(writer, code.len() as u64, prefix_len)?;
                writer.write_all(code)?;
                stats.output_bytes +=
                    2 * u64::from(prefix_len) + run_len as u64 + code.len() as u64;
                stats.frames += 1;
                stats.matched_blocks += 1;

                literal.clear();
                literal.resize(block_size, 0);
                let got = read_up_to(reader, &mut literal)?;
                literal.truncate(got);
                stats.input_bytes += got as u64;
                continue;
            }
        }

        if reader.read(&mut byte)? == 0 {
            if !literal.is_empty() {
                write_len(writer, literal.len() as u64, prefix_len)?;
                writer.write_all(&literal)?;
                stats.output_bytes += u64::from(prefix_len) + literal.len() as u64;
                stats.frames += 1;
            }
            break;
        }
        literal.push(byte[0]);
        stats.input_bytes += 1;
        if literal.len() as u64 > limit {
            return Err(DedupeError::PrefixTooSmall { prefix_len, limit });
        }
    }
    writer.flush()?;
    Ok(stats)
}

/// Encode `src` into `dst`, syncing the output so a following rename
/// publishes complete bytes.
pub fn encode_file(
    src: &Path,
    dst: &Path,
    dictionary: &Dictionary,
    block_size: usize,
    prefix_len: u8,
) -> Result<EncodeStats, DedupeError> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut writer = BufWriter::new(File::create(dst)?);
    let stats = encode_stream(&mut reader, &mut writer, dictionary, block_size, prefix_len)?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(stats)
}
