//! Interval reconciliation.
//!
//! A staging buffer only holds the bytes that have been written into it or
//! fetched from the remote store. [`IntervalSet`] tracks those byte ranges and
//! [`IntervalSet::reconcile`] splits a query window into the parts servable
//! from the buffer (`covered`) and the parts that must be fetched (`gaps`).
//!
//! ```
//! use hdfs_mount_staging::{ByteRange, IntervalSet};
//!
//! let mut staged = IntervalSet::new();
//! staged.insert(ByteRange::new(5, 8));
//!
//! let plan = staged.reconcile(ByteRange::new(0, 10));
//! assert_eq!(plan.covered, vec![ByteRange::new(5, 8)]);
//! assert_eq!(plan.gaps, vec![ByteRange::new(0, 5), ByteRange::new(8, 10)]);
//! ```

use std::fmt;

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteRange {
    /// First byte in the range.
    pub start: u64,
    /// One past the last byte in the range.
    pub end: u64,
}

impl ByteRange {
    /// Creates a range. An inverted range is normalized to empty at `start`.
    pub const fn new(start: u64, end: u64) -> Self {
        if end < start {
            Self { start, end: start }
        } else {
            Self { start, end }
        }
    }

    /// Creates the range `[offset, offset + len)`, saturating at `u64::MAX`.
    pub const fn at(offset: u64, len: u64) -> Self {
        Self::new(offset, offset.saturating_add(len))
    }

    /// Number of bytes in the range.
    #[inline]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    /// True if the range holds no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Intersection of two ranges, or `None` if they do not overlap.
    pub fn intersect(&self, other: &ByteRange) -> Option<ByteRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(ByteRange { start, end })
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Result of reconciling a window against the staged ranges.
///
/// Both lists are sorted by start, non-overlapping, and together partition
/// the window exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Sub-ranges already present in the staging buffer.
    pub covered: Vec<ByteRange>,
    /// Sub-ranges that must be fetched from the remote store.
    pub gaps: Vec<ByteRange>,
}

/// Merges ranges into a minimal sorted sequence of disjoint ranges.
///
/// Adjacent ranges (`[0,5)` and `[5,8)`) are merged. Empty ranges are dropped.
pub fn merge(ranges: &[ByteRange]) -> Vec<ByteRange> {
    let mut sorted: Vec<ByteRange> = ranges.iter().copied().filter(|r| !r.is_empty()).collect();
    sorted.sort_unstable();

    let mut merged: Vec<ByteRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

/// Splits `window` into covered and gap ranges with respect to `staged`.
pub fn reconcile(staged: &[ByteRange], window: ByteRange) -> Reconciliation {
    let covered: Vec<ByteRange> = merge(staged)
        .iter()
        .filter_map(|r| r.intersect(&window))
        .collect();

    let mut gaps = Vec::new();
    let mut cursor = window.start;
    for range in &covered {
        if range.start > cursor {
            gaps.push(ByteRange::new(cursor, range.start));
        }
        cursor = range.end;
    }
    if cursor < window.end {
        gaps.push(ByteRange::new(cursor, window.end));
    }

    Reconciliation { covered, gaps }
}

/// Byte ranges staged into a buffer.
///
/// Ranges may overlap on insertion; they are merged before every query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalSet {
    ranges: Vec<ByteRange>,
}

impl IntervalSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a staged range. Empty ranges are ignored.
    pub fn insert(&mut self, range: ByteRange) {
        if !range.is_empty() {
            self.ranges.push(range);
        }
    }

    /// Replaces the set with the single range `[0, len)`.
    pub fn cover_all(&mut self, len: u64) {
        self.ranges.clear();
        self.insert(ByteRange::new(0, len));
    }

    /// Drops everything at or beyond `len`.
    pub fn clip(&mut self, len: u64) {
        self.ranges = self
            .ranges
            .iter()
            .filter_map(|r| r.intersect(&ByteRange::new(0, len)))
            .collect();
    }

    /// Collapses the stored ranges into their merged form.
    pub fn compact(&mut self) {
        self.ranges = merge(&self.ranges);
    }

    /// Splits `window` into covered and gap ranges.
    pub fn reconcile(&self, window: ByteRange) -> Reconciliation {
        reconcile(&self.ranges, window)
    }

    /// Merged view of the staged ranges.
    pub fn merged(&self) -> Vec<ByteRange> {
        merge(&self.ranges)
    }

    /// True if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// End of the furthest staged range (0 if empty).
    pub fn extent(&self) -> u64 {
        self.ranges.iter().map(|r| r.end).max().unwrap_or(0)
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn ranges() -> impl Strategy<Value = Vec<ByteRange>> {
        prop::collection::vec(
            (0u64..200, 0u64..60).prop_map(|(start, len)| ByteRange::at(start, len)),
            0..20,
        )
    }

    proptest! {
        /// Covered and gap ranges partition the window with no overlap and no hole.
        #[test]
        fn covered_and_gaps_partition_window(
            staged in ranges(),
            start in 0u64..250,
            len in 0u64..120,
        ) {
            let window = ByteRange::at(start, len);
            let plan = reconcile(&staged, window);

            let mut pieces: Vec<ByteRange> =
                plan.covered.iter().chain(plan.gaps.iter()).copied().collect();
            pieces.sort_unstable();

            let mut cursor = window.start;
            for piece in &pieces {
                prop_assert!(!piece.is_empty());
                prop_assert_eq!(piece.start, cursor);
                cursor = piece.end;
            }
            prop_assert_eq!(cursor, window.end);
        }

        /// Every covered byte is staged and every gap byte is not.
        #[test]
        fn classification_matches_membership(
            staged in ranges(),
            start in 0u64..250,
            len in 0u64..120,
        ) {
            let window = ByteRange::at(start, len);
            let plan = reconcile(&staged, window);
            let is_staged = |b: u64| staged.iter().any(|r| r.start <= b && b < r.end);

            for range in &plan.covered {
                for b in range.start..range.end {
                    prop_assert!(is_staged(b));
                }
            }
            for range in &plan.gaps {
                for b in range.start..range.end {
                    prop_assert!(!is_staged(b));
                }
            }
        }

        /// Merged output is sorted, disjoint and non-adjacent.
        #[test]
        fn merge_is_minimal(staged in ranges()) {
            let merged = merge(&staged);
            for pair in merged.windows(2) {
                prop_assert!(pair[0].end < pair[1].start);
            }
            let total: u64 = merged.iter().map(ByteRange::len).sum();
            let distinct = (0u64..260)
                .filter(|b| staged.iter().any(|r| r.start <= *b && *b < r.end))
                .count() as u64;
            prop_assert_eq!(total, distinct);
        }
    }
}
