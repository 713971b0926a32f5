//! Net-savings estimation for a candidate block size

use crate::scanner::{candidate_blocks, FrequencyTable};

/// Projected net bytes saved by encoding with the dictionary implied by
/// `table` at `block_size`.
///
/// Each occurrence of a recurring block shrinks to a code plus framing, so it
/// saves `block_size - 2 * prefix_len - 1` bytes; each distinct entry costs
/// `block_size + prefix_len + 1` bytes of persisted dictionary. The result
/// can be negative, and is zero when nothing recurs.
pub fn estimated_savings(table: &FrequencyTable, block_size: usize, prefix_len: u8) -> i64 {
    let mut occurrences: i64 = 0;
    let mut unique: i64 = 0;
    for (_, count) in candidate_blocks(table, block_size) {
        occurrences += count as i64;
        unique += 1;
    }
    let saved_per_occurrence = block_size as i64 - 2 * i64::from(prefix_len) - 1;
    let cost_per_entry = block_size as i64 + i64::from(prefix_len) + 1;
    occurrences * saved_per_occurrence - unique * cost_per_entry
}
