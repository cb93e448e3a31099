//! Inclusive block ranges and range planning.

use serde::{Deserialize, Serialize};

/// Contiguous, inclusive block range synced as one job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// Block numbers of the range; empty when `start > end`.
    pub fn numbers(&self) -> Vec<u64> {
        (self.start..=self.end).collect()
    }

    /// Block count, saturating at `u64::MAX` for the full `0..=u64::MAX` span.
    pub fn len(&self) -> u64 {
        if self.is_valid() {
            (self.end - self.start).saturating_add(1)
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Splits `start..=end` into consecutive ranges of at most `size` blocks,
/// ordered by start.
pub fn plan_ranges(start: u64, end: u64, size: u64) -> Vec<BlockRange> {
    let size = size.max(1);
    let mut ranges = Vec::new();
    let mut current = start;
    while current <= end {
        let range_end = current.saturating_add(size - 1).min(end);
        ranges.push(BlockRange::new(current, range_end));
        if range_end == u64::MAX {
            break;
        }
        current = range_end + 1;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_covers_range_without_gaps() {
        let ranges = plan_ranges(10, 34, 10);
        assert_eq!(
            ranges,
            vec![
                BlockRange::new(10, 19),
                BlockRange::new(20, 29),
                BlockRange::new(30, 34),
            ]
        );
    }

    #[test]
    fn plan_single_block() {
        assert_eq!(plan_ranges(5, 5, 100), vec![BlockRange::new(5, 5)]);
    }

    #[test]
    fn plan_empty_when_inverted() {
        assert!(plan_ranges(6, 5, 100).is_empty());
    }

    #[test]
    fn plan_stops_at_u64_max() {
        let ranges = plan_ranges(u64::MAX - 1, u64::MAX, 1);
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn full_span_len_does_not_overflow() {
        assert_eq!(BlockRange::new(0, u64::MAX).len(), u64::MAX);
        assert_eq!(BlockRange::new(u64::MAX, u64::MAX).len(), 1);
    }

    #[test]
    fn inverted_range_has_no_numbers() {
        let range = BlockRange::new(3, 1);
        assert!(!range.is_valid());
        assert!(range.numbers().is_empty());
        assert_eq!(range.len(), 0);
    }
}
