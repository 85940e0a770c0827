use super::alignment::{resolve_seek, Alignment};
use super::{ByteStream, Capabilities, Shell};
use crate::aligned_buffer::AlignedBuffer;
use crate::config::StreamConfig;
use crate::device::{read_full, Device};
use crate::error::{Error, Result};
use std::io::SeekFrom;
use tracing::warn;

/// State of the scratch block relative to the block at the physical cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Window {
    /// Scratch holds nothing for this block.
    Vacant,
    /// Scratch matches the device, with zeros past the logical end.
    Synced,
    /// Scratch holds bytes the device has not seen yet.
    Pending,
}

/// Logical length expressed against the physical length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overhang {
    /// Logical length is this many bytes past the physical length.
    Buffered(u64),
    /// Physical length runs this many zeroed bytes past the logical length.
    Cleared(u64),
}

impl Overhang {
    fn between(logical: u64, physical: u64) -> Self {
        if logical >= physical {
            Overhang::Buffered(logical - physical)
        } else {
            Overhang::Cleared(physical - logical)
        }
    }

    fn logical_len(self, physical: u64) -> u64 {
        match self {
            Overhang::Buffered(n) => physical + n,
            Overhang::Cleared(n) => physical.saturating_sub(n),
        }
    }
}

/// Writable stream with arbitrary offsets, lengths, and truncation over a
/// device that only takes whole aligned blocks.
///
/// The physical cursor always sits on a block boundary; the logical cursor is
/// `offset` bytes past it. Partial blocks are assembled in a scratch buffer,
/// reading the live sector first whenever bytes outside the write range must
/// survive. A trailing partial block stays pending until a later write
/// completes it, the stream seeks away, or it is flushed or closed.
///
/// Seeking needs a readable device, since moving into the middle of a block
/// reads that block first.
#[derive(Debug)]
pub struct AlignedWriter<D: Device> {
    shell: Shell<D>,
    align: Alignment,
    scratch: AlignedBuffer,
    spare: AlignedBuffer,
    offset: usize,
    window: Window,
    overhang: Overhang,
    resize_retry: bool,
}

impl<D: Device> AlignedWriter<D> {
    pub fn new(device: D, config: StreamConfig) -> Result<Self> {
        let align = Alignment::new(config.alignment)?;
        let caps = device.capabilities();
        if !caps.write {
            return Err(Error::invalid("aligned writer needs a writable device"));
        }

        let mask = Capabilities::new(false, true, caps.read);
        let mut shell = Shell::with_mask(device, mask);
        let physical = shell.get_ref().position();
        let offset = align.offset_of(physical);
        if offset != 0 {
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
            spare: AlignedBuffer::new(align.size(), align.size())?,
            shell,
            align,
            offset,
            window: Window::Vacant,
            overhang: Overhang::Buffered(0),
            resize_retry: config.resize_retry,
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

    pub fn physical_len(&self) -> u64 {
        self.shell.get_ref().len()
    }

    fn can_merge(&self) -> bool {
        let caps = self.shell.get_ref().capabilities();
        caps.read && caps.seek
    }

    fn settle(&mut self, logical_len: u64) {
        self.overhang = Overhang::between(logical_len, self.physical_len());
    }

    fn bulk_eligible(&self, buf: &[u8]) -> bool {
        let required = self.shell.get_ref().buffer_alignment().max(1);
        (buf.as_ptr() as usize) % required == 0
    }

    /// Fills the scratch buffer with the block at the physical cursor and
    /// zeroes everything at or past `logical_len`.
    fn load_block(&mut self, logical_len: u64) -> Result<()> {
        let size = self.align.size();
        let block = self.physical_position();
        self.scratch.clear();
        if self.can_merge() && block < self.physical_len() {
            read_full(self.shell.get_mut(), &mut self.scratch[..size])?;
            self.shell.get_mut().seek(SeekFrom::Start(block))?;
        }
        if logical_len < block + size as u64 {
            self.scratch.zero_from(logical_len.saturating_sub(block) as usize);
        }
        self.window = Window::Synced;
        Ok(())
    }

    /// Writes the scratch block at the physical cursor, which moves one block on.
    fn write_block(&mut self) -> Result<()> {
        let size = self.align.size();
        self.shell.get_mut().write_all(&self.scratch[..size])?;
        self.window = Window::Vacant;
        Ok(())
    }

    /// Writes a pending scratch block and puts the physical cursor back.
    fn persist_pending(&mut self) -> Result<()> {
        if self.window != Window::Pending {
            return Ok(());
        }
        let block = self.physical_position();
        self.write_block()?;
        self.shell.get_mut().seek(SeekFrom::Start(block))?;
        self.window = Window::Synced;
        Ok(())
    }

    /// Buffers the part of `buf` that fits in the current block, writing the
    /// block out once it is complete. Returns what is left of `buf`.
    fn write_unaligned<'a>(&mut self, buf: &'a [u8], logical_len: u64) -> Result<&'a [u8]> {
        let size = self.align.size();
        let take = (size - self.offset).min(buf.len());

        if self.window == Window::Vacant {
            let block = self.physical_position();
            let position = block + self.offset as u64;
            let covers_live = self.offset == 0 && position + take as u64 >= logical_len;
            if block < logical_len && !covers_live {
                self.load_block(logical_len)?;
            } else {
                self.scratch.clear();
            }
        }

        self.scratch[self.offset..self.offset + take].copy_from_slice(&buf[..take]);
        self.window = Window::Pending;
        self.offset += take;

        if self.offset == size {
            self.write_block()?;
            self.offset = 0;
        }
        Ok(&buf[take..])
    }

    /// Zeroes `[block + tail, block + A)` on the device, leaving the cursor where it was.
    fn clear_tail(&mut self, block: u64, tail: usize) -> Result<()> {
        let size = self.align.size();
        let restore = self.physical_position();
        let device = self.shell.get_mut();
        device.seek(SeekFrom::Start(block))?;
        self.spare.clear();
        read_full(device, &mut self.spare[..size])?;
        self.spare.zero_from(tail);
        device.seek(SeekFrom::Start(block))?;
        device.write_all(&self.spare[..size])?;
        device.seek(SeekFrom::Start(restore))?;
        Ok(())
    }

    fn resize(&mut self, target: u64) -> Result<()> {
        let device = self.shell.get_mut();
        device.set_len(target)?;
        let reported = device.len();
        if reported != target && self.resize_retry {
            warn!(target, reported, "device ignored resize, retrying");
            device.set_len(reported)?;
            device.set_len(target)?;
        }
        Ok(())
    }
}

impl<D: Device> ByteStream for AlignedWriter<D> {
    fn capabilities(&self) -> Capabilities {
        self.shell.capabilities()
    }

    fn alignment_size(&self) -> usize {
        self.align.size()
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        self.shell.ensure_readable()?;
        Err(Error::NotSupported("stream does not support reading"))
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.shell.ensure_writable()?;
        if buf.is_empty() {
            return Ok(());
        }
        let old_len = self.len();
        let new_len = old_len.max(self.position() + buf.len() as u64);
        let size = self.align.size();
        let mut rest = buf;

        if self.offset != 0 {
            rest = self.write_unaligned(rest, old_len)?;
        }

        if self.offset == 0 && rest.len() >= size && self.bulk_eligible(rest) {
            let bulk = self.align.floor_usize(rest.len());
            self.shell.get_mut().write_all(&rest[..bulk])?;
            self.window = Window::Vacant;
            rest = &rest[bulk..];
        }

        while !rest.is_empty() {
            rest = self.write_unaligned(rest, old_len)?;
        }

        self.settle(new_len);
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.shell.ensure_seekable()?;
        let len = self.len();
        let target = resolve_seek(pos, self.position(), len)?;
        let block = self.align.floor(target);

        if block == self.physical_position() {
            self.offset = (target - block) as usize;
            return Ok(target);
        }

        if self.window == Window::Pending {
            self.write_block()?;
        }
        self.shell.get_mut().seek(SeekFrom::Start(block))?;
        self.window = Window::Vacant;
        self.offset = (target - block) as usize;
        if self.offset != 0 {
            self.load_block(len)?;
        }
        self.settle(len);
        Ok(target)
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.shell.ensure_writable()?;
        self.shell.ensure_seekable()?;
        let old_len = self.len();
        let block = self.align.floor(len);
        let tail = self.align.offset_of(len);

        if self.position() > len {
            if self.physical_position() != block {
                self.window = Window::Vacant;
                self.shell.get_mut().seek(SeekFrom::Start(block))?;
            }
            self.offset = tail;
        }

        let physical = self.physical_position();
        let target = if tail == 0 {
            if physical >= block {
                self.window = Window::Vacant;
            }
            len
        } else if physical == block {
            if self.window == Window::Vacant {
                self.load_block(old_len)?;
            }
            self.scratch.zero_from(tail);
            self.window = Window::Pending;
            block
        } else {
            if len < old_len && block < self.physical_len() {
                self.clear_tail(block, tail)?;
            }
            block + self.align.size() as u64
        };

        self.resize(target)?;
        self.settle(len);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.shell.is_closed() {
            return Ok(());
        }
        if self.can_seek() {
            let len = self.len();
            if self.physical_position() <= len {
                self.persist_pending()?;
                self.settle(len);
            }
        }
        Ok(self.shell.get_mut().flush()?)
    }

    fn position(&self) -> u64 {
        self.physical_position() + self.offset as u64
    }

    fn len(&self) -> u64 {
        self.overhang.logical_len(self.physical_len())
    }

    fn close(&mut self) -> Result<()> {
        if self.shell.is_closed() {
            return Ok(());
        }
        let result = if self.can_seek() {
            self.flush()
        } else if self.window == Window::Pending && self.position() <= self.len() {
            let len = self.len();
            self.write_block().map(|()| self.settle(len))
        } else {
            Ok(())
        };
        let closed = self.shell.close();
        result.and(closed)
    }
}

impl<D: Device> Drop for AlignedWriter<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to persist pending block on drop");
        }
    }
}
