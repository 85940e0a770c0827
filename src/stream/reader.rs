use super::alignment::{resolve_seek, Alignment};
use super::{ByteStream, Capabilities, Shell};
use crate::aligned_buffer::AlignedBuffer;
use crate::config::StreamConfig;
use crate::device::{read_full, Device};
use crate::error::{Error, Result};
use std::io::SeekFrom;

/// Where the logical cursor sits relative to the physical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// `n` bytes past the physical cursor, in a block not read yet.
    Ahead(usize),
    /// `n` bytes before the physical cursor, inside the scratch window.
    Behind(usize),
}

/// Read-only stream that accepts arbitrary offsets and lengths over a device
/// that only reads whole aligned blocks.
///
/// Requests of at least one block starting on a boundary go straight into the
/// caller's buffer. Everything else goes through one scratch block, which also
/// serves backward seeks that stay inside it.
#[derive(Debug)]
pub struct AlignedReader<D: Device> {
    shell: Shell<D>,
    align: Alignment,
    scratch: AlignedBuffer,
    cursor: Cursor,
    /// Valid scratch bytes, ending at the physical cursor.
    filled: usize,
}

impl<D: Device> AlignedReader<D> {
    pub fn new(device: D, config: StreamConfig) -> Result<Self> {
        let align = Alignment::new(config.alignment)?;
        if !device.capabilities().read {
            return Err(Error::invalid("aligned reader needs a readable device"));
        }

        let mut shell = Shell::with_mask(device, Capabilities::READ_ONLY);
        let physical = shell.get_ref().position();
        let skew = align.offset_of(physical);
        if skew != 0 {
            if !shell.can_seek() {
                return Err(Error::invalid(format!(
                    "device position {physical} is not aligned to {} and cannot be moved",
                    align.size()
                )));
            }
            shell.get_mut().seek(SeekFrom::Start(align.floor(physical)))?;
        }

        Ok(Self {
            scratch: AlignedBuffer::new(align.size(), align.size())?,
            shell,
            align,
            cursor: Cursor::Ahead(skew),
            filled: 0,
        })
    }

    pub fn with_alignment(device: D, alignment: usize) -> Result<Self> {
        Self::new(device, StreamConfig::new(alignment))
    }

    pub fn get_ref(&self) -> &D {
        self.shell.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut D {
        self.shell.get_mut()
    }

    pub fn physical_position(&self) -> u64 {
        self.shell.get_ref().position()
    }

    fn bulk_eligible(&self, buf: &[u8]) -> bool {
        let required = self.shell.get_ref().buffer_alignment().max(1);
        (buf.as_ptr() as usize) % required == 0
    }

    /// Reads the block at the physical cursor into the scratch buffer, skipping
    /// `skip` bytes already behind the logical cursor. Returns the bytes now
    /// available past the cursor; 0 at end of data.
    fn fill_window(&mut self, skip: usize) -> Result<usize> {
        let size = self.align.size();
        let n = read_full(self.shell.get_mut(), &mut self.scratch[..size])?;
        self.filled = n;
        if n <= skip {
            self.cursor = Cursor::Ahead(skip - n);
            return Ok(0);
        }
        self.cursor = Cursor::Behind(n - skip);
        Ok(n - skip)
    }

    /// Copies from the scratch window into `buf`, returning bytes copied.
    fn drain_window(&mut self, buf: &mut [u8]) -> usize {
        let Cursor::Behind(pending) = self.cursor else {
            return 0;
        };
        let start = self.filled - pending;
        let take = pending.min(buf.len());
        buf[..take].copy_from_slice(&self.scratch[start..start + take]);
        self.cursor = if take == pending {
            Cursor::Ahead(0)
        } else {
            Cursor::Behind(pending - take)
        };
        take
    }
}

impl<D: Device> ByteStream for AlignedReader<D> {
    fn capabilities(&self) -> Capabilities {
        self.shell.capabilities()
    }

    fn alignment_size(&self) -> usize {
        self.align.size()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.shell.ensure_readable()?;
        let size = self.align.size();
        let mut done = self.drain_window(buf);

        while done < buf.len() {
            let rest = buf.len() - done;
            let physical = self.physical_position();

            if rest >= size
                && self.cursor == Cursor::Ahead(0)
                && self.align.is_aligned(physical)
                && self.bulk_eligible(&buf[done..])
            {
                let bulk = self.align.floor_usize(rest);
                let n = read_full(self.shell.get_mut(), &mut buf[done..done + bulk])?;
                self.filled = 0;
                done += n;
                if n < bulk {
                    break;
                }
                continue;
            }

            let skip = match self.cursor {
                Cursor::Ahead(skip) => skip,
                Cursor::Behind(_) => 0,
            };
            if self.fill_window(skip)? == 0 {
                break;
            }
            done += self.drain_window(&mut buf[done..]);
            if self.filled < size {
                break;
            }
        }

        Ok(done)
    }

    fn write(&mut self, _buf: &[u8]) -> Result<()> {
        self.shell.ensure_writable()?;
        Err(Error::NotSupported("stream does not support writing"))
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.shell.ensure_seekable()?;
        let target = resolve_seek(pos, self.position(), self.len())?;
        let physical = self.physical_position();

        if target < physical && target >= physical - self.filled as u64 {
            self.cursor = Cursor::Behind((physical - target) as usize);
        } else if target == physical {
            self.cursor = Cursor::Ahead(0);
            self.filled = 0;
        } else {
            let base = self.align.floor(target);
            if base != physical {
                self.shell.get_mut().seek(SeekFrom::Start(base))?;
            }
            self.cursor = Cursor::Ahead((target - base) as usize);
            self.filled = 0;
        }
        Ok(target)
    }

    fn set_len(&mut self, _len: u64) -> Result<()> {
        self.shell.ensure_writable()?;
        Err(Error::NotSupported("stream does not support writing"))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> u64 {
        let physical = self.physical_position();
        match self.cursor {
            Cursor::Ahead(n) => physical + n as u64,
            Cursor::Behind(n) => physical - n as u64,
        }
    }

    fn len(&self) -> u64 {
        self.shell.get_ref().len()
    }

    fn close(&mut self) -> Result<()> {
        self.shell.close()
    }
}
