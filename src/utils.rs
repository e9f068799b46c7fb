// src/utils.rs
// Utility functions for the LB Aggregator SDK

use chrono::Utc;

/// Creates a vector of (start_block, end_block) tuples for a given range and chunk size.
/// Keeps historical log scans bounded instead of issuing a single earliest-to-latest query.
pub fn create_block_chunks(from_block: u64, to_block: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let mut chunks = Vec::new();
    if chunk_size == 0 || from_block > to_block {
        return chunks;
    }
    let mut current_from = from_block;
    while current_from <= to_block {
        let current_to = std::cmp::min(current_from.saturating_add(chunk_size - 1), to_block);
        chunks.push((current_from, current_to));
        if current_to == u64::MAX {
            break;
        }
        current_from = current_to + 1;
    }
    chunks
}

/// Current wall-clock time as unix seconds.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Whole minutes elapsed since `timestamp` (unix seconds), clamped at zero.
pub fn minutes_since(timestamp: i64, now: i64) -> i64 {
    (now - timestamp).max(0) / 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_chunks_exact_split() {
        let chunks = create_block_chunks(0, 29, 10);
        assert_eq!(chunks, vec![(0, 9), (10, 19), (20, 29)]);
    }

    #[test]
    fn test_block_chunks_partial_tail() {
        let chunks = create_block_chunks(100, 125, 10);
        assert_eq!(chunks, vec![(100, 109), (110, 119), (120, 125)]);
    }

    #[test]
    fn test_block_chunks_single() {
        assert_eq!(create_block_chunks(5, 5, 10), vec![(5, 5)]);
    }

    #[test]
    fn test_block_chunks_invalid_range() {
        assert!(create_block_chunks(10, 5, 10).is_empty());
        assert!(create_block_chunks(0, 10, 0).is_empty());
    }

    #[test]
    fn test_minutes_since() {
        assert_eq!(minutes_since(1_000, 1_000 + 3_700), 61);
        assert_eq!(minutes_since(2_000, 1_000), 0);
    }
}
