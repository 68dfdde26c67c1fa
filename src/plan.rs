//! Part size planning.

use std::fmt;

/// Physical hashing block size, and the smallest part size a vault accepts.
pub const BLOCK_SIZE: u64 = 1024 * 1024;

/// Maximum number of parts in one multipart upload.
pub const MAX_PARTS: u64 = 10_000;

/// The part size chosen for one file.
///
/// Always a power of two and at least [`BLOCK_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    part_size: u64,
}

impl ChunkPlan {
    /// Derives the smallest valid part size that keeps `size` within `max_parts` parts.
    ///
    /// The minimum size is rounded up, never down, so the part cap always holds at
    /// the cost of a possibly larger final part.
    ///
    /// # Example
    ///
    /// ```
    /// use glaceon::{ChunkPlan, BLOCK_SIZE, MAX_PARTS};
    ///
    /// assert_eq!(ChunkPlan::for_size(0, MAX_PARTS).part_size(), BLOCK_SIZE);
    /// assert_eq!(
    ///     ChunkPlan::for_size(MAX_PARTS * BLOCK_SIZE + 1, MAX_PARTS).part_size(),
    ///     2 * BLOCK_SIZE
    /// );
    /// ```
    pub fn for_size(size: u64, max_parts: u64) -> Self {
        let minimum = size.div_ceil(max_parts.max(1));
        let part_size = if minimum <= BLOCK_SIZE {
            BLOCK_SIZE
        } else {
            minimum.checked_next_power_of_two().unwrap_or(1 << 63)
        };
        Self { part_size }
    }

    /// Uses an explicit part size, if it is a power of two no smaller than [`BLOCK_SIZE`].
    pub fn with_part_size(part_size: u64) -> Option<Self> {
        (part_size.is_power_of_two() && part_size >= BLOCK_SIZE).then_some(Self { part_size })
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Number of parts needed for a file of `size` bytes. Zero for an empty file.
    pub fn part_count(&self, size: u64) -> u64 {
        size.div_ceil(self.part_size)
    }

    /// Byte range covered by part `index`; the last part may be short.
    pub fn part_range(&self, size: u64, index: u64) -> Option<ByteRange> {
        if index >= self.part_count(size) {
            return None;
        }
        let start = index * self.part_size;
        let len = self.part_size.min(size - start);
        Some(ByteRange { start, len })
    }
}

/// A contiguous, non-empty slice of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub len: u64,
}

impl ByteRange {
    /// Offset of the last byte in the range.
    pub fn end_inclusive(&self) -> u64 {
        self.start + self.len - 1
    }
}

/// Renders the `Content-Range` form the vault expects, e.g. `bytes 0-1048575/*`.
impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/*", self.start, self.end_inclusive())
    }
}
