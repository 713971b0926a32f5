//! Dictionary construction: recurring blocks mapped to minimal-length codes

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DedupeError;
use crate::format::code_for_index;
use crate::scanner::{candidate_blocks, FrequencyTable};

/// Reverse mapping used by the decoder, keyed by code.
pub type InverseDictionary = HashMap<Vec<u8>, Vec<u8>>;

/// Shared mapping from recurring block content to its compact code.
///
/// Codes are assigned in descending frequency order with content as the tie
/// break, so the hottest blocks get the shortest codes and two builds over
/// the same counts produce the same dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dictionary {
    entries: HashMap<Vec<u8>, Vec<u8>>,
}

impl Dictionary {
    /// Build from a frequency table, keeping blocks that recur and are
    /// exactly `block_size` long.
    pub fn build(table: &FrequencyTable, block_size: usize) -> Self {
        let mut candidates: Vec<(&[u8], u64)> = candidate_blocks(table, block_size).collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let entries = candidates
            .into_iter()
            .enumerate()
            .map(|(index, (block, _))| (block.to_vec(), code_for_index(index as u64)))
            .collect();
        Self { entries }
    }

    /// Code for a block, if the block is in the dictionary.
    pub fn code_for(&self, block: &[u8]) -> Option<&[u8]> {
        self.entries.get(block).map(Vec::as_slice)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Block length shared by every entry, or `None` when empty.
    pub fn block_size(&self) -> Option<usize> {
        self.entries.keys().next().map(Vec::len)
    }

    /// All `(block, code)` pairs, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries
            .iter()
            .map(|(block, code)| (block.as_slice(), code.as_slice()))
    }

    /// Invert into code-to-block form for decoding.
    pub fn invert(&self) -> Result<InverseDictionary, DedupeError> {
        let mut inverse = InverseDictionary::with_capacity(self.entries.len());
        for (block, code) in &self.entries {
            if inverse.insert(code.clone(), block.clone()).is_some() {
                return Err(DedupeError::CorruptDictionary(format!(
                    "duplicate code {code:02x?}"
                )));
            }
        }
        Ok(inverse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_of(entries: &[(&[u8], u64)]) -> FrequencyTable {
        entries
            .iter()
            .map(|(block, count)| (block.to_vec(), *count))
            .collect()
    }

    #[test]
    fn test_most_frequent_gets_shortest_code() {
        let table = table_of(&[(b"aaaa", 5), (b"bbbb", 3), (b"cccc", 2)]);
        let dictionary = Dictionary::build(&table, 4);
        assert_eq!(dictionary.code_for(b"aaaa"), Some(&[0x00][..]));
        assert_eq!(dictionary.code_for(b"bbbb"), Some(&[0x01][..]));
        assert_eq!(dictionary.code_for(b"cccc"), Some(&[0x02][..]));
    }

    #[test]
    fn test_frequency_ties_break_on_content() {
        let table = table_of(&[(b"zzzz", 3), (b"aaaa", 3)]);
        let dictionary = Dictionary::build(&table, 4);
        assert_eq!(dictionary.code_for(b"aaaa"), Some(&[0x00][..]));
        assert_eq!(dictionary.code_for(b"zzzz"), Some(&[0x01][..]));
    }

    #[test]
    fn test_build_is_deterministic() {
        let table = table_of(&[(b"aaaa", 4), (b"bbbb", 4), (b"cccc", 2), (b"dddd", 9)]);
        assert_eq!(Dictionary::build(&table, 4), Dictionary::build(&table, 4));
    }

    #[test]
    fn test_singletons_and_partials_excluded() {
        let table = table_of(&[(b"aaaa", 1), (b"bb", 7), (b"cccc", 2)]);
        let dictionary = Dictionary::build(&table, 4);
        assert_eq!(dictionary.len(), 1);
        assert_eq!(dictionary.code_for(b"bb"), None);
        assert_eq!(dictionary.code_for(b"aaaa"), None);
    }

    #[test]
    fn test_empty_table_builds_empty_dictionary() {
        let dictionary = Dictionary::build(&FrequencyTable::new(), 4);
        assert!(dictionary.is_empty());
        assert_eq!(dictionary.block_size(), None);
    }

    #[test]
    fn test_block_size_from_entries() {
        let table = table_of(&[(b"aaaa", 2)]);
        assert_eq!(Dictionary::build(&table, 4).block_size(), Some(4));
    }

    #[test]
    fn test_codes_grow_past_256_entries() {
        let mut table = FrequencyTable::new();
        for i in 0..300u16 {
            let mut block = vec![0u8, 0u8];
            block.extend_from_slice(&i.to_be_bytes());
            table.insert(block, 2);
        }
        let dictionary = Dictionary::build(&table, 4);
        assert_eq!(dictionary.len(), 300);
        let one_byte = dictionary.iter().filter(|(_, code)| code.len() == 1).count();
        let two_byte = dictionary.iter().filter(|(_, code)| code.len() == 2).count();
        assert_eq!(one_byte, 256);
        assert_eq!(two_byte, 44);
    }

    #[test]
    fn test_invert_is_bijective() {
        let table = table_of(&[(b"aaaa", 5), (b"bbbb", 3)]);
        let dictionary = Dictionary::build(&table, 4);
        let inverse = dictionary.invert().unwrap();
        assert_eq!(inverse.len(), dictionary.len());
        for (block, code) in dictionary.iter() {
            assert_eq!(inverse[code], block);
        }
    }
}
