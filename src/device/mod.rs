//! Inner byte resources underneath the aligned streams.
//!
//! A [`Device`] may refuse any transfer, seek, or resize that is not a
//! multiple of its physical alignment. The aligned streams in
//! [`crate::stream`] only ever issue aligned operations against it, except
//! for [`Device::trim`], which sets the exact final length once writing is
//! done.

mod file;
mod memory;

pub use file::{DirectFile, WriteMode};
pub use memory::{DeviceStats, MemoryDevice};

use crate::stream::Capabilities;
use std::io::{self, Read, Seek, Write};

pub trait Device: Read + Write + Seek {
    fn capabilities(&self) -> Capabilities;

    /// Current physical position.
    fn position(&self) -> u64;

    /// Current physical length.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resizes the resource. Implementations report the length the resource
    /// actually ended up with through [`Device::len`].
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Sets the exact final length, which need not be aligned.
    fn trim(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    /// Memory alignment required of caller buffers handed straight to the device.
    fn buffer_alignment(&self) -> usize {
        1
    }
}

impl<D: Device + ?Sized> Device for &mut D {
    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn len(&self) -> u64 {
        (**self).len()
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }

    fn trim(&mut self, len: u64) -> io::Result<()> {
        (**self).trim(len)
    }

    fn buffer_alignment(&self) -> usize {
        (**self).buffer_alignment()
    }
}

/// Reads until `buf` is full or the resource reports end of data.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
