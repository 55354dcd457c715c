use std::cmp;
use std::fmt;

use crate::error::Error;

/// Signed end position meaning "read to the end of the file".
pub const UNBOUNDED: i64 = -1;

/// A byte range `[start, end_inclusive]` within a file.
///
/// `end_inclusive == None` reads from `start` until the file reports end of
/// stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end_inclusive: Option<u64>,
}

impl ByteRange {
    /// The whole file.
    pub fn full() -> Self {
        Self::default()
    }

    /// Everything from `start` to the end of the file.
    pub fn starting_at(start: u64) -> Self {
        Self { start, end_inclusive: None }
    }

    pub fn bounded(start: u64, end_inclusive: u64) -> Self {
        Self { start, end_inclusive: Some(end_inclusive) }
    }

    /// Checks the range against a file of `file_len` bytes.
    ///
    /// An explicit end must address an existing byte and must not precede
    /// `start`. An unbounded range starting past the end of the file resolves
    /// to an empty range.
    pub fn resolve(&self, file_len: u64) -> Result<ResolvedRange, Error> {
        match self.end_inclusive {
            None => Ok(ResolvedRange {
                start: self.start,
                end: cmp::max(self.start, file_len),
                file_len,
            }),
            Some(end) if end >= file_len => {
                Err(Error::EndBeyondFileSize { end, total: file_len })
            }
            Some(end) if self.start > end => {
                Err(Error::StartGreaterThanEnd { start: self.start, end })
            }
            Some(end) => Ok(ResolvedRange { start: self.start, end: end + 1, file_len }),
        }
    }
}

impl TryFrom<(i64, i64)> for ByteRange {
    type Error = Error;

    /// Converts a signed `(start, end_inclusive)` pair where an end of `-1`
    /// means "to the end of the file".
    fn try_from((start, end_inclusive): (i64, i64)) -> Result<Self, Self::Error> {
        let start = u64::try_from(start).map_err(|_| Error::NegativeStart(start))?;
        let end_inclusive = match end_inclusive {
            UNBOUNDED => None,
            end => Some(u64::try_from(end).map_err(|_| Error::NegativeEnd(end))?),
        };
        Ok(Self { start, end_inclusive })
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end_inclusive {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}-", self.start),
        }
    }
}

/// A validated range together with the file length observed when it was
/// opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    /// First byte offset
    pub start: u64,

    /// One past the last byte offset
    pub end: u64,

    /// Length of the file at open time
    pub file_len: u64,
}

impl ResolvedRange {
    /// Number of bytes the range covers.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if the range does not cover the whole file
    pub fn is_partial(&self) -> bool {
        self.start > 0 || self.end < self.file_len
    }
}
