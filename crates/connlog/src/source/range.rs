//! Byte ranges of a log file.

use std::fmt;

/// A span of file offsets assigned to one shard.
///
/// The range covers bytes `[from, to)`, but line ownership is shifted by
/// one line: a reader discards the line touching `from` and reads the line
/// starting exactly at `to`, so a range owns the lines whose first byte lies
/// in `(from, to]` (or `[0, to]` when `from == 0`). Boundaries produced by
/// [`plan_splits`](crate::source::plan_splits) always sit on line starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// Start offset (inclusive).
    pub from: u64,
    /// End offset (exclusive).
    pub to: u64,
}

impl ByteRange {
    /// Creates a new range. `from` must not exceed `to`.
    pub fn new(from: u64, to: u64) -> Self {
        debug_assert!(from <= to, "range start {from} past end {to}");
        Self { from, to }
    }

    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.to - self.from
    }

    /// Returns true if the range covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// Returns true if `offset` lies in `[from, to)`.
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.from && offset < self.to
    }

    /// Returns the part of this range at or after `offset`, if any.
    pub fn starting_at(&self, offset: u64) -> Option<Self> {
        if self.to <= offset {
            None
        } else {
            Some(Self::new(self.from.max(offset), self.to))
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}
