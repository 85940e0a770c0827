use super::{ByteStream, Capabilities};
use crate::error::Result;
use std::io::SeekFrom;

/// Remembers the furthest logical position the wrapped stream has reached.
///
/// Useful when whatever drove the stream leaves its final position
/// meaningless as a length, for example a one-shot encoder that never seeks
/// back: the mark is the true amount of data produced.
#[derive(Debug)]
pub struct HighWaterMark<S> {
    inner: S,
    mark: u64,
}

impl<S: ByteStream> HighWaterMark<S> {
    pub fn new(inner: S) -> Self {
        let mark = inner.position();
        Self { inner, mark }
    }

    #[inline]
    pub fn high_water_mark(&self) -> u64 {
        self.mark
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn observe(&mut self) {
        self.mark = self.mark.max(self.inner.position());
    }
}

impl<S: ByteStream> ByteStream for HighWaterMark<S> {
    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn alignment_size(&self) -> usize {
        self.inner.alignment_size()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        self.observe();
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.inner.write(buf)?;
        self.observe();
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = self.inner.seek(pos)?;
        self.observe();
        Ok(target)
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.inner.set_len(len)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
