//! Streaming decoder: reconstructs original bytes from an encoded stream

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::dictionary::InverseDictionary;
use crate::error::DedupeError;
use crate::format::read_len;

/// Byte accounting for one decoded stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeStats {
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub frames: u64,
}

/// Decode `reader` into `writer` using the inverted dictionary.
///
/// A clean end of stream at either length field terminates the frame
/// sequence; anything shorter than an announced length is a truncation
/// error, and a code absent from the dictionary fails the whole stream.
pub fn decode_stream<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    inverse: &InverseDictionary,
    prefix_len: u8,
) -> Result<DecodeStats, DedupeError> {
    let mut stats = DecodeStats::default();
    loop {
        let literal_len = match read_len(reader, prefix_len)? {
            Some(len) => len,
            None => break,
        };
        stats.input_bytes += u64::from(prefix_len);
        stats.frames += 1;

        let copied = io::copy(&mut reader.by_ref().take(literal_len), writer)?;
        if copied != literal_len {
            return Err(DedupeError::MetadataMismatch(format!(
                "literal run truncated ({copied} of {literal_len} bytes)"
            )));
        }
        stats.input_bytes += literal_len;
        stats.output_bytes += literal_len;

        let code_len = match read_len(reader, prefix_len)? {
            // The final frame carries no block reference.
            None => break,
            Some(len) => len,
        };
        stats.input_bytes += u64::from(prefix_len);

        let mut code = Vec::with_capacity(code_len as usize);
        reader.by_ref().take(code_len).read_to_end(&mut code)?;
        if code.len() as u64 != code_len {
            return Err(DedupeError::MetadataMismatch(format!(
                "code truncated ({} of {code_len} bytes)",
                code.len()
            )));
        }
        stats.input_bytes += code_len;

        let block = inverse
            .get(&code)
            .ok_or(DedupeError::UnknownCode { code })?;
        writer.write_all(block)?;
        stats.output_bytes += block.len() as u64;
    }
    writer.flush()?;
    Ok(stats)
}

/// Decode `src` into `dst`, syncing the output so a following rename
/// publishes complete bytes.
pub fn decode_file(
    src: &Path,
    dst: &Path,
    inverse: &InverseDictionary,
    prefix_len: u8,
) -> Result<DecodeStats, DedupeError> {
    let mut reader = BufReader::new(File::open(src)?);
    let mut writer = BufWriter::new(File::create(dst)?);
    let stats = decode_stream(&mut reader, &mut writer, inverse, prefix_len)?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(stats)
}
