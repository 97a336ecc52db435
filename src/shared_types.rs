/// Width in bytes of one encoded record.
pub const RECORD_WIDTH: u64 = 4;

/// Half-open byte interval `[start, end)` of the input file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Complete records contained in the range.
    pub fn record_count(&self) -> u64 {
        self.len() / RECORD_WIDTH
    }
}

pub type ByteCount = u64;
