//! Block frequency scanning across a set of files

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::DedupeError;
use crate::format::read_up_to;

/// Occurrence counts for distinct blocks, keyed by exact content.
pub type FrequencyTable = HashMap<Vec<u8>, u64>;

/// Count every non-overlapping `block_size` segment of `reader`.
/// A trailing segment shorter than `block_size` is counted as well.
pub fn scan_reader<R: Read>(
    reader: &mut R,
    block_size: usize,
) -> Result<FrequencyTable, DedupeError> {
    let mut table = FrequencyTable::new();
    loop {
        let mut block = vec![0u8; block_size];
        let got = read_up_to(reader, &mut block)?;
        if got == 0 {
            break;
        }
        block.truncate(got);
        *table.entry(block).or_insert(0) += 1;
        if got < block_size {
            break;
        }
    }
    Ok(table)
}

/// Count the blocks of one file.
pub fn scan_file(path: &Path, block_size: usize) -> Result<FrequencyTable, DedupeError> {
    let mut reader = BufReader::new(File::open(path)?);
    scan_reader(&mut reader, block_size)
}

/// Fold `other` into `into`, summing counts per block.
pub fn merge_tables(into: &mut FrequencyTable, other: FrequencyTable) {
    for (block, count) in other {
        *into.entry(block).or_insert(0) += count;
    }
}

/// Blocks eligible for the dictionary: recurring, and exactly one block long.
/// Trailing partial segments can never qualify.
pub fn candidate_blocks(
    table: &FrequencyTable,
    block_size: usize,
) -> impl Iterator<Item = (&[u8], u64)> {
    table.iter().filter_map(move |(block, &count)| {
        (count > 1 && block.len() == block_size).then_some((block.as_slice(), count))
    })
}

/// Scan every file concurrently and merge the counts. Merge order does not
/// affect the result. Any unreadable file fails the whole scan.
pub async fn scan_corpus(
    files: &[PathBuf],
    block_size: usize,
    max_workers: usize,
) -> Result<FrequencyTable, DedupeError> {
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut tasks = JoinSet::new();
    for path in files {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(DedupeError::worker)?;
        let path = path.clone();
        tasks.spawn(async move {
            let _permit = permit;
            tokio::task::spawn_blocking(move || scan_file(&path, block_size)).await
        });
    }

    let mut table = FrequencyTable::new();
    while let Some(joined) = tasks.join_next().await {
        let scanned = joined
            .and_then(|inner| inner)
            .map_err(DedupeError::worker)??;
        merge_tables(&mut table, scanned);
    }
    debug!(
        block_size,
        distinct_blocks = table.len(),
        "corpus scan complete"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_scan_counts_aligned_blocks() {
        let data = b"abcdabcdabcd".to_vec();
        let table = scan_reader(&mut Cursor::new(data), 4).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table[&b"abcd".to_vec()], 3);
    }

    #[test]
    fn test_scan_counts_partial_tail() {
        let data = b"abcdxy".to_vec();
        let table = scan_reader(&mut Cursor::new(data), 4).unwrap();
        assert_eq!(table[&b"abcd".to_vec()], 1);
        assert_eq!(table[&b"xy".to_vec()], 1);
    }

    #[test]
    fn test_scan_empty_input() {
        let table = scan_reader(&mut Cursor::new(Vec::new()), 4).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_merge_sums_counts() {
        let mut left = FrequencyTable::new();
        left.insert(b"abcd".to_vec(), 2);
        let mut right = FrequencyTable::new();
        right.insert(b"abcd".to_vec(), 3);
        right.insert(b"wxyz".to_vec(), 1);
        merge_tables(&mut left, right);
        assert_eq!(left[&b"abcd".to_vec()], 5);
        assert_eq!(left[&b"wxyz".to_vec()], 1);
    }

    #[test]
    fn test_candidates_exclude_singletons_and_partials() {
        let mut table = FrequencyTable::new();
        table.insert(b"abcd".to_vec(), 3);
        table.insert(b"wxyz".to_vec(), 1);
        table.insert(b"xy".to_vec(), 5);
        let candidates: Vec<_> = candidate_blocks(&table, 4).collect();
        assert_eq!(candidates, vec![(b"abcd".as_slice(), 3)]);
    }

    #[tokio::test]
    async fn test_scan_corpus_merges_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.bin");
        let second = dir.path().join("second.bin");
        std::fs::write(&first, b"abcdabcd").unwrap();
        std::fs::write(&second, b"abcdwxyz").unwrap();

        let table = scan_corpus(&[first, second], 4, 2).await.unwrap();
        assert_eq!(table[&b"abcd".to_vec()], 3);
        assert_eq!(table[&b"wxyz".to_vec()], 1);
    }

    #[tokio::test]
    async fn test_scan_corpus_propagates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.bin");
        let result = scan_corpus(&[missing], 4, 2).await;
        assert!(result.is_err());
    }
}
