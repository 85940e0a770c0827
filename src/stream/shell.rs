use super::{ByteStream, Capabilities};
use crate::device::Device;
use crate::error::{Error, Result};
use std::io::SeekFrom;

/// Forwards every operation to a device, gated by a capability mask.
///
/// A capability is granted only while the shell is open, the mask allows it,
/// and the device reports it. Unsupported operations fail before the device
/// is touched. Closing flushes the device once; later closes are no-ops.
#[derive(Debug)]
pub struct Shell<D> {
    inner: D,
    mask: Capabilities,
    closed: bool,
}

impl<D: Device> Shell<D> {
    pub fn new(inner: D) -> Self {
        Self::with_mask(inner, Capabilities::ALL)
    }

    pub fn with_mask(inner: D, mask: Capabilities) -> Self {
        Self {
            inner,
            mask,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> &D {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut D {
        &mut self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn ensure_readable(&self) -> Result<()> {
        if self.capabilities().read {
            Ok(())
        } else {
            Err(Error::NotSupported("stream does not support reading"))
        }
    }

    pub fn ensure_writable(&self) -> Result<()> {
        if self.capabilities().write {
            Ok(())
        } else {
            Err(Error::NotSupported("stream does not support writing"))
        }
    }

    pub fn ensure_seekable(&self) -> Result<()> {
        if self.capabilities().seek {
            Ok(())
        } else {
            Err(Error::NotSupported("stream does not support seeking"))
        }
    }
}

impl<D: Device> ByteStream for Shell<D> {
    fn capabilities(&self) -> Capabilities {
        if self.closed {
            Capabilities::NONE
        } else {
            self.mask.intersect(self.inner.capabilities())
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_readable()?;
        Ok(self.inner.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        Ok(self.inner.write_all(buf)?)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.ensure_seekable()?;
        Ok(self.inner.seek(pos)?)
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.ensure_writable()?;
        Ok(self.inner.set_len(len)?)
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        Ok(self.inner.flush()?)
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        Ok(self.inner.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    #[test]
    fn test_mask_limits_capabilities() {
        let shell = Shell::with_mask(MemoryDevice::new(4), Capabilities::READ_ONLY);
        assert!(shell.can_read());
        assert!(shell.can_seek());
        assert!(!shell.can_write());
    }

    #[test]
    fn test_unsupported_write_does_not_touch_device() {
        let mut shell = Shell::with_mask(MemoryDevice::new(4), Capabilities::READ_ONLY);
        let err = shell.write(&[1, 2, 3, 4]).unwrap_err();
        assert!(matches!(err, Error::NotSupported(_)));
        assert_eq!(shell.get_ref().stats().writes, 0);
    }

    #[test]
    fn test_close_drops_all_capabilities() {
        let mut shell = Shell::new(MemoryDevice::new(4));
        shell.close().unwrap();
        shell.close().unwrap();
        assert!(shell.is_closed());
        assert_eq!(shell.capabilities(), Capabilities::NONE);
        assert!(matches!(shell.read(&mut [0u8; 4]), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_position_setter_is_seek_from_start() {
        let mut shell = Shell::new(MemoryDevice::with_data(vec![0u8; 16], 4));
        assert_eq!(shell.set_position(8).unwrap(), 8);
        assert_eq!(shell.position(), 8);
    }
}
