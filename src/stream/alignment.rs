//! Alignment arithmetic shared by the aligned streams. No I/O happens here.

use crate::aligned_buffer::memory_alignment;
use crate::error::{Error, Result};
use std::io::SeekFrom;
use std::ops::Range;

/// Physical alignment `A`, fixed for the lifetime of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Alignment(usize);

impl Alignment {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::invalid("alignment must be a positive integer"));
        }
        Ok(Self(size))
    }

    #[inline]
    pub fn size(self) -> usize {
        self.0
    }

    #[inline]
    fn wide(self) -> u64 {
        self.0 as u64
    }

    #[inline]
    pub fn floor(self, x: u64) -> u64 {
        x - x % self.wide()
    }

    #[inline]
    pub fn ceil(self, x: u64) -> u64 {
        x.div_ceil(self.wide()) * self.wide()
    }

    #[inline]
    pub fn floor_usize(self, x: usize) -> usize {
        x - x % self.0
    }

    /// Distance of `x` past the previous boundary.
    #[inline]
    pub fn offset_of(self, x: u64) -> usize {
        (x % self.wide()) as usize
    }

    #[inline]
    pub fn is_aligned(self, x: u64) -> bool {
        x % self.wide() == 0
    }

    #[inline]
    pub fn memory_alignment(self) -> usize {
        memory_alignment(self.0)
    }
}

/// Checks that `offset..offset + count` lies inside a buffer of `capacity` bytes.
pub fn validate_range(capacity: usize, offset: usize, count: usize) -> Result<Range<usize>> {
    match offset.checked_add(count) {
        Some(end) if end <= capacity => Ok(offset..end),
        _ => Err(Error::invalid(format!(
            "range {offset}+{count} exceeds buffer capacity {capacity}"
        ))),
    }
}

/// Absolute target of a seek. `Current` is relative to the logical position
/// and `End` to the logical length.
pub fn resolve_seek(pos: SeekFrom, position: u64, len: u64) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(delta) => position.checked_add_signed(delta),
        SeekFrom::End(delta) => len.checked_add_signed(delta),
    };
    target.ok_or_else(|| Error::invalid(format!("seek {pos:?} resolves to a negative position")))
}
