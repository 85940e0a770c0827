use super::Device;
use crate::stream::Capabilities;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Operation counters, used to check which physical calls a stream issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub reads: u64,
    pub writes: u64,
    pub seeks: u64,
    pub resizes: u64,
}

/// In-memory resource that behaves like a handle opened for unbuffered I/O:
/// positions, transfer lengths, and resizes must all be multiples of the
/// alignment. A read starting at or past the end returns 0, and a read that
/// runs into the end returns the bytes that exist.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    data: Vec<u8>,
    position: u64,
    alignment: u64,
    caps: Capabilities,
    stats: DeviceStats,
    stubborn_resize: bool,
}

impl MemoryDevice {
    pub fn new(alignment: usize) -> Self {
        Self::with_data(Vec::new(), alignment)
    }

    pub fn with_data(data: Vec<u8>, alignment: usize) -> Self {
        Self {
            data,
            position: 0,
            alignment: alignment.max(1) as u64,
            caps: Capabilities::ALL,
            stats: DeviceStats::default(),
            stubborn_resize: false,
        }
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    /// Makes the next `set_len` report success without resizing.
    pub fn with_stubborn_resize(mut self) -> Self {
        self.stubborn_resize = true;
        self
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = DeviceStats::default();
    }

    fn check_aligned(&self, what: &str, value: u64) -> io::Result<()> {
        if value % self.alignment != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unaligned {what} {value} (alignment {})", self.alignment),
            ));
        }
        Ok(())
    }

    fn require(&self, granted: bool, what: &'static str) -> io::Result<()> {
        if granted {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::Unsupported, what))
        }
    }
}

impl Read for MemoryDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.require(self.caps.read, "device is not readable")?;
        self.stats.reads += 1;
        let len = self.data.len() as u64;
        if self.position >= len {
            return Ok(0);
        }
        self.check_aligned("read position", self.position)?;
        self.check_aligned("read length", buf.len() as u64)?;

        let start = self.position as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for MemoryDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.require(self.caps.write, "device is not writable")?;
        self.stats.writes += 1;
        self.check_aligned("write position", self.position)?;
        self.check_aligned("write length", buf.len() as u64)?;

        let start = self.position as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        self.position = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryDevice {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.require(self.caps.seek, "device is not seekable")?;
        self.stats.seeks += 1;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => (self.data.len() as u64).checked_add_signed(delta),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "negative seek target"))?;
        self.check_aligned("seek target", target)?;
        self.position = target;
        Ok(target)
    }
}

impl Device for MemoryDevice {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.require(self.caps.write, "device is not writable")?;
        self.check_aligned("length", len)?;
        self.stats.resizes += 1;
        if self.stubborn_resize {
            self.stubborn_resize = false;
            return Ok(());
        }
        self.data.resize(len as usize, 0);
        Ok(())
    }

    fn trim(&mut self, len: u64) -> io::Result<()> {
        self.require(self.caps.write, "device is not writable")?;
        self.stats.resizes += 1;
        self.data.resize(len as usize, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unaligned_operations_rejected() {
        let mut device = MemoryDevice::with_data(vec![1u8; 64], 16);
        let mut buf = [0u8; 10];
        assert_eq!(
            device.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
        assert!(device.seek(SeekFrom::Start(3)).is_err());
        assert!(device.write(&[0u8; 15]).is_err());
        assert!(device.set_len(17).is_err());
        assert_eq!(device.stats().reads, 1);
    }

    #[test]
    fn test_read_at_end_is_short() {
        let mut device = MemoryDevice::with_data((0..40).collect(), 16);
        device.seek(SeekFrom::Start(32)).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(device.read(&mut buf).unwrap(), 8);
        assert_eq!(device.position(), 40);
        assert_eq!(device.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let mut device = MemoryDevice::new(4);
        device.seek(SeekFrom::Start(8)).unwrap();
        device.write_all(&[9u8; 4]).unwrap();
        assert_eq!(device.contents(), &[0, 0, 0, 0, 0, 0, 0, 0, 9, 9, 9, 9]);
    }

    #[test]
    fn test_stubborn_resize_ignores_one_call() {
        let mut device = MemoryDevice::new(4).with_stubborn_resize();
        device.set_len(8).unwrap();
        assert_eq!(Device::len(&device), 0);
        device.set_len(8).unwrap();
        assert_eq!(Device::len(&device), 8);
        assert_eq!(device.stats().resizes, 2);
    }

    #[test]
    fn test_trim_allows_unaligned_length() {
        let mut device = MemoryDevice::with_data(vec![5u8; 32], 16);
        device.trim(21).unwrap();
        assert_eq!(device.contents().len(), 21);
    }

    #[test]
    fn test_capabilities_enforced() {
        let mut device = MemoryDevice::new(4).with_capabilities(Capabilities::READ_ONLY);
        assert_eq!(
            device.write(&[0u8; 4]).unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
    }
}
