//! On-disk names and the binary framing shared by the encoder and decoder
//!
//! An encoded file is a sequence of frames, all integers big-endian:
//! `[literal_len: prefix_len bytes][literal bytes][code_len: prefix_len bytes][code bytes]`
//! The final frame carries only the literal part.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::DedupeError;

/// Suffix appended to every encoded file.
pub const ENCODED_SUFFIX: &str = ".deduped";
/// Suffix for in-flight outputs, renamed away on commit.
pub const TMP_SUFFIX: &str = ".tmp";
/// Name of the persisted dictionary record at the tree root.
pub const METADATA_FILE: &str = ".dedupe-table";
/// Name of the JSON run report written next to the metadata.
pub const REPORT_FILE: &str = ".dedupe-report.json";

/// Largest value representable in `prefix_len` big-endian bytes.
pub fn max_prefixed_len(prefix_len: u8) -> u64 {
    if prefix_len >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * u32::from(prefix_len))) - 1
    }
}

/// Minimal-length big-endian encoding of a dictionary index.
/// Index 0 is a single zero byte; 256 becomes `[0x01, 0x00]`.
pub fn code_for_index(index: u64) -> Vec<u8> {
    let bytes = index.to_be_bytes();
    let lead = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    bytes[lead..].to_vec()
}

/// Write `value` as a `prefix_len`-byte big-endian field.
/// The value must fit, see [`max_prefixed_len`].
pub fn write_len<W: Write>(writer: &mut W, value: u64, prefix_len: u8) -> io::Result<()> {
    let bytes = value.to_be_bytes();
    writer.write_all(&bytes[8 - prefix_len as usize..])
}

/// Read a `prefix_len`-byte big-endian field.
///
/// `Ok(None)` marks a clean end of stream before the first byte of the field;
/// a partial field is a truncation error.
pub fn read_len<R: Read>(reader: &mut R, prefix_len: u8) -> Result<Option<u64>, DedupeError> {
    let want = prefix_len as usize;
    let mut buf = [0u8; 8];
    let got = read_up_to(reader, &mut buf[..want])?;
    if got == 0 {
        return Ok(None);
    }
    if got < want {
        return Err(DedupeError::MetadataMismatch(format!(
            "truncated length prefix ({got} of {want} bytes)"
        )));
    }
    let mut value = [0u8; 8];
    value[8 - want..].copy_from_slice(&buf[..want]);
    Ok(Some(u64::from_be_bytes(value)))
}

/// Fill `buf` from `reader`, stopping early only at end of stream.
/// Returns the number of bytes actually read.
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Path of the encoded counterpart of `path`.
pub fn encoded_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(ENCODED_SUFFIX);
    PathBuf::from(name)
}

/// Path used while `path` is being written, before the commit rename.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Original path of an encoded file, or `None` if the name does not carry
/// the encoded suffix.
pub fn strip_encoded_suffix(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(ENCODED_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    Some(path.with_file_name(stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_code_for_index_boundaries() {
        assert_eq!(code_for_index(0), vec![0x00]);
        assert_eq!(code_for_index(1), vec![0x01]);
        assert_eq!(code_for_index(255), vec![0xff]);
        assert_eq!(code_for_index(256), vec![0x01, 0x00]);
        assert_eq!(code_for_index(65535), vec![0xff, 0xff]);
        assert_eq!(code_for_index(65536), vec![0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_code_length_is_monotonic() {
        let mut last = 0;
        for index in [0u64, 1, 255, 256, 65535, 65536, 1 << 24] {
            let len = code_for_index(index).len();
            assert!(len >= last, "code shrank at index {}", index);
            last = len;
        }
    }

    #[test]
    fn test_max_prefixed_len() {
        assert_eq!(max_prefixed_len(1), 255);
        assert_eq!(max_prefixed_len(2), 65535);
        assert_eq!(max_prefixed_len(3), 16_777_215);
        assert_eq!(max_prefixed_len(8), u64::MAX);
    }

    #[test]
    fn test_len_field_roundtrip() {
        for (value, prefix_len) in [(0u64, 1u8), (255, 1), (300, 2), (16_777_215, 3), (7, 8)] {
            let mut buf = Vec::new();
            write_len(&mut buf, value, prefix_len).unwrap();
            assert_eq!(buf.len(), prefix_len as usize);
            let read = read_len(&mut Cursor::new(buf), prefix_len).unwrap();
            assert_eq!(read, Some(value));
        }
    }

    #[test]
    fn test_read_len_clean_end() {
        let read = read_len(&mut Cursor::new(Vec::new()), 3).unwrap();
        assert_eq!(read, None);
    }

    #[test]
    fn test_read_len_partial_field_is_error() {
        let result = read_len(&mut Cursor::new(vec![0x01]), 3);
        assert!(matches!(result, Err(DedupeError::MetadataMismatch(_))));
    }

    #[test]
    fn test_encoded_path_naming() {
        let encoded = encoded_path(Path::new("/tmp/data.bin"));
        assert_eq!(encoded, PathBuf::from("/tmp/data.bin.deduped"));
        assert_eq!(
            strip_encoded_suffix(&encoded),
            Some(PathBuf::from("/tmp/data.bin"))
        );
    }

    #[test]
    fn test_strip_suffix_rejects_plain_names() {
        assert_eq!(strip_encoded_suffix(Path::new("/tmp/data.bin")), None);
        assert_eq!(strip_encoded_suffix(Path::new("/tmp/.deduped")), None);
    }

    #[test]
    fn test_tmp_path_naming() {
        let tmp = tmp_path(Path::new("/tmp/data.bin.deduped"));
        assert_eq!(tmp, PathBuf::from("/tmp/data.bin.deduped.tmp"));
    }
}
