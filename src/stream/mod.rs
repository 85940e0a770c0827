//! Byte streams with ordinary random-access semantics layered over devices
//! that only accept aligned I/O.

pub mod alignment;
mod high_water;
mod reader;
mod shell;
mod writer;

pub use alignment::{resolve_seek, validate_range, Alignment};
pub use high_water::HighWaterMark;
pub use reader::AlignedReader;
pub use shell::Shell;
pub use writer::AlignedWriter;

use crate::error::Result;
use std::io::{self, SeekFrom};

/// Which operations a stream or device accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub read: bool,
    pub write: bool,
    pub seek: bool,
}

impl Capabilities {
    pub const NONE: Self = Self::new(false, false, false);
    pub const ALL: Self = Self::new(true, true, true);
    pub const READ_ONLY: Self = Self::new(true, false, true);
    pub const WRITE_ONLY: Self = Self::new(false, true, false);

    pub const fn new(read: bool, write: bool, seek: bool) -> Self {
        Self { read, write, seek }
    }

    pub const fn intersect(self, other: Self) -> Self {
        Self {
            read: self.read && other.read,
            write: self.write && other.write,
            seek: self.seek && other.seek,
        }
    }
}

/// A seekable byte stream addressed in logical positions.
pub trait ByteStream {
    fn capabilities(&self) -> Capabilities;

    /// Physical alignment the stream hides, 1 when it hides none.
    fn alignment_size(&self) -> usize {
        1
    }

    /// Reads up to `buf.len()` bytes. Returns fewer only at end of data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes all of `buf`.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Bytes past the old length read back as zero after an extension.
    fn set_len(&mut self, len: u64) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn position(&self) -> u64;

    fn len(&self) -> u64;

    fn close(&mut self) -> Result<()>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn can_read(&self) -> bool {
        self.capabilities().read
    }

    fn can_write(&self) -> bool {
        self.capabilities().write
    }

    fn can_seek(&self) -> bool {
        self.capabilities().seek
    }

    fn set_position(&mut self, position: u64) -> Result<u64> {
        self.seek(SeekFrom::Start(position))
    }

    /// Reads into `buf[offset..offset + count]`.
    fn read_range(&mut self, buf: &mut [u8], offset: usize, count: usize) -> Result<usize> {
        let range = validate_range(buf.len(), offset, count)?;
        self.read(&mut buf[range])
    }

    /// Writes `buf[offset..offset + count]`.
    fn write_range(&mut self, buf: &[u8], offset: usize, count: usize) -> Result<()> {
        let range = validate_range(buf.len(), offset, count)?;
        self.write(&buf[range])
    }
}

/// Adapts a [`ByteStream`] to the `std::io` traits.
#[derive(Debug)]
pub struct IoStream<S>(pub S);

impl<S> IoStream<S> {
    pub fn into_inner(self) -> S {
        self.0
    }
}

impl<S: ByteStream> io::Read for IoStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.0.read(buf)?)
    }
}

impl<S: ByteStream> io::Write for IoStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.0.flush()?)
    }
}

impl<S: ByteStream> io::Seek for IoStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.0.seek(pos)?)
    }
}
