//! Whole-file copies over aligned devices.
//!
//! Every routine reads and writes in whole aligned blocks. The last block of
//! a copy is zero-padded before it is written, and the target is trimmed back
//! to the exact logical length afterwards.

use crate::aligned_buffer::AlignedBuffer;
use crate::config::{CopyMode, CopyOptions, StreamConfig};
use crate::device::{read_full, Device, DirectFile, WriteMode};
use crate::error::{Error, Result};
use crate::pool::BufferPool;
use crate::stream::{AlignedReader, AlignedWriter, Alignment, ByteStream, HighWaterMark};
use parking_lot::Mutex;
use serde::Serialize;
use std::io::{self, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// Shared stop flag, checked by copy loops between blocks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyReport {
    pub source_len: u64,
    pub bytes_copied: u64,
    pub resumed_from: u64,
    pub mode: CopyMode,
    pub elapsed_ms: u128,
}

fn unexpected_eof(copied: u64, length: u64) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("source ended after {copied} of {length} bytes"),
    ))
}

/// Reads the next chunk of at most `want` bytes into `buffer`, requesting a
/// whole number of blocks. Returns the logical bytes obtained.
fn fill_chunk<R: Device + ?Sized>(
    source: &mut R,
    buffer: &mut AlignedBuffer,
    want: usize,
    align: Alignment,
) -> Result<usize> {
    let span = (align.ceil(want as u64) as usize).min(buffer.capacity());
    let n = read_full(source, &mut buffer[..span])?;
    let got = n.min(want);
    buffer.set_used(got)?;
    Ok(got)
}

/// Zero-pads the valid prefix up to the next boundary and writes it.
fn drain_chunk<W: Device + ?Sized>(
    target: &mut W,
    buffer: &mut AlignedBuffer,
    align: Alignment,
) -> Result<()> {
    let used = buffer.used();
    let padded = (align.ceil(used as u64) as usize).min(buffer.capacity());
    buffer[used..padded].fill(0);
    target.write_all(&buffer[..padded])?;
    Ok(())
}

fn trim_overshoot<W: Device + ?Sized>(target: &mut W, end: u64) -> Result<()> {
    if target.position() > end {
        debug!(end, physical = target.position(), "trimming padded tail");
        target.trim(end)?;
    }
    Ok(())
}

/// Single-threaded copy of `length` bytes from the current positions.
pub fn copy_sequential<R: Device, W: Device>(
    source: &mut R,
    target: &mut W,
    length: u64,
    buffer: &mut AlignedBuffer,
    alignment: usize,
    cancel: &CancelToken,
) -> Result<u64> {
    let align = Alignment::new(alignment)?;
    if buffer.capacity() % align.size() != 0 {
        return Err(Error::invalid("buffer capacity must be a multiple of the alignment"));
    }
    let end = target.position() + length;
    let mut copied = 0u64;

    while copied < length {
        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }
        let want = (buffer.capacity() as u64).min(length - copied) as usize;
        let got = fill_chunk(source, buffer, want, align)?;
        if got == 0 {
            return Err(unexpected_eof(copied, length));
        }
        drain_chunk(target, buffer, align)?;
        copied += got as u64;
    }

    trim_overshoot(target, end)?;
    Ok(copied)
}

fn read_task<R: Device>(
    source: &mut R,
    length: u64,
    pool: &BufferPool,
    cancel: &CancelToken,
) -> Result<u64> {
    let align = pool.alignment();
    let mut total = 0u64;

    while total < length {
        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }
        let mut buffer = pool.allocate()?;
        let want = (buffer.capacity() as u64).min(length - total) as usize;
        let got = match fill_chunk(source, &mut buffer, want, align) {
            Ok(got) => got,
            Err(e) => {
                pool.free(buffer);
                return Err(e);
            }
        };
        if got == 0 {
            pool.free(buffer);
            return Err(unexpected_eof(total, length));
        }
        pool.enqueue(buffer);
        total += got as u64;
    }
    Ok(total)
}

fn write_task<W: Device>(
    target: &mut W,
    length: u64,
    pool: &BufferPool,
    cancel: &CancelToken,
) -> Result<u64> {
    let align = pool.alignment();
    let mut written = 0u64;

    while written < length {
        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }
        let mut buffer = pool.dequeue()?;
        let used = buffer.used() as u64;
        let result = drain_chunk(target, &mut buffer, align);
        pool.free(buffer);
        result?;
        written += used;
    }
    Ok(written)
}

/// Keeps the first real failure; an abort only fills an empty slot.
fn record_failure(slot: &Mutex<Option<Error>>, err: Error) {
    let mut slot = slot.lock();
    let replace = match slot.as_ref() {
        None => true,
        Some(existing) => existing.is_aborted() && !err.is_aborted(),
    };
    if replace {
        *slot = Some(err);
    }
}

/// Cancels the pool if a task unwinds, so its counterpart cannot block forever.
struct CancelOnPanic<'a>(&'a BufferPool);

impl Drop for CancelOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

/// Copies `length` bytes with one reader thread and one writer thread
/// circulating the buffers of `pool`.
///
/// A failure on either side cancels the pool, which stops the other side at
/// its next block. The first real error is returned; [`Error::Aborted`] only
/// when cancellation was all that happened.
pub fn copy_threaded<R, W>(
    source: &mut R,
    target: &mut W,
    length: u64,
    pool: &BufferPool,
    cancel: &CancelToken,
) -> Result<u64>
where
    R: Device + Send,
    W: Device + Send,
{
    let end = target.position() + length;
    let failure = Mutex::new(None);
    debug!(
        length,
        buffers = pool.capacity(),
        buffer_len = pool.buffer_len(),
        "starting threaded copy"
    );

    let failure_slot = &failure;
    let (src, dst) = (&mut *source, &mut *target);

    let written = thread::scope(|scope| {
        let reader = scope.spawn(move || {
            let _guard = CancelOnPanic(pool);
            read_task(src, length, pool, cancel).inspect_err(|_| pool.cancel())
        });
        let writer = scope.spawn(move || {
            let _guard = CancelOnPanic(pool);
            write_task(dst, length, pool, cancel).inspect_err(|_| pool.cancel())
        });

        let mut written = 0;
        for (role, handle) in [("reader", reader), ("writer", writer)] {
            match handle.join() {
                Ok(Ok(n)) if role == "writer" => written = n,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => record_failure(failure_slot, e),
                Err(_) => record_failure(
                    failure_slot,
                    Error::Io(io::Error::other(format!("{role} task panicked"))),
                ),
            }
        }
        written
    });

    if let Some(err) = failure.into_inner() {
        return Err(err);
    }
    trim_overshoot(target, end)?;
    Ok(written)
}

/// Copies through an aligned reader and writer, taking the final length
/// from the writer's high-water mark.
fn copy_stream<R: Device, W: Device>(
    source: &mut R,
    target: &mut W,
    length: u64,
    options: &CopyOptions,
    cancel: &CancelToken,
) -> Result<u64> {
    let config = StreamConfig::new(options.alignment);
    let mut reader = AlignedReader::new(&mut *source, config)?;
    let mut sink = HighWaterMark::new(AlignedWriter::new(&mut *target, config)?);
    let start = sink.position();
    let mut buffer = AlignedBuffer::new(options.buffer_len, options.alignment)?;
    let mut copied = 0u64;

    while copied < length {
        if cancel.is_cancelled() {
            return Err(Error::Aborted);
        }
        let want = (buffer.capacity() as u64).min(length - copied) as usize;
        let n = reader.read(&mut buffer[..want])?;
        if n == 0 {
            return Err(unexpected_eof(copied, length));
        }
        sink.write(&buffer[..n])?;
        copied += n as u64;
    }

    let mark = sink.high_water_mark();
    let mut writer = sink.into_inner();
    writer.close()?;
    drop(writer);
    drop(reader);
    target.trim(mark)?;
    Ok(mark - start)
}

/// Copies `source` to `target` with unbuffered I/O on both ends.
pub fn copy_file(
    source: impl AsRef<Path>,
    target: impl AsRef<Path>,
    options: &CopyOptions,
    cancel: &CancelToken,
) -> Result<CopyReport> {
    let (source, target) = (source.as_ref(), target.as_ref());
    options.validate()?;
    let align = Alignment::new(options.alignment)?;
    let started = Instant::now();

    let mut src = DirectFile::open_read(source, options.alignment)?;
    let source_len = src.len();

    let exists = target.try_exists()?;
    let mode = match (exists, options.resumable, options.overwrite) {
        (false, _, _) => WriteMode::Create,
        (true, true, _) => WriteMode::Resume,
        (true, false, true) => WriteMode::Truncate,
        (true, false, false) => return Err(Error::TargetExists(target.to_path_buf())),
    };
    let mut dst = DirectFile::open_write(target, options.alignment, mode)?;

    // Only a strictly shorter, non-empty target is a partial copy. Anything
    // else is rewritten from the start.
    let existing = dst.len();
    let mut resumed_from = 0;
    if mode == WriteMode::Resume && existing > 0 && existing < source_len {
        resumed_from = align.floor(existing);
        src.seek(SeekFrom::Start(resumed_from))?;
        dst.seek(SeekFrom::Start(resumed_from))?;
    } else {
        if mode == WriteMode::Resume && existing > 0 {
            info!(
                target = %target.display(),
                existing,
                source_len,
                "target is not shorter than source, copying from the start"
            );
        }
        dst.set_len(align.ceil(source_len))?;
    }

    info!(
        source = %source.display(),
        target = %target.display(),
        source_len,
        resumed_from,
        mode = %options.mode,
        direct = src.is_direct() && dst.is_direct(),
        "copy started"
    );

    let remaining = source_len - resumed_from;
    let bytes_copied = match options.mode {
        CopyMode::Sequential => {
            let mut buffer = AlignedBuffer::new(options.buffer_len, options.alignment)?;
            copy_sequential(&mut src, &mut dst, remaining, &mut buffer, options.alignment, cancel)?
        }
        CopyMode::Threaded => {
            let pool = BufferPool::new(options.buffer_count, options.buffer_len, options.alignment)?;
            copy_threaded(&mut src, &mut dst, remaining, &pool, cancel)?
        }
        CopyMode::Stream => copy_stream(&mut src, &mut dst, remaining, options, cancel)?,
    };

    if dst.len() != source_len {
        dst.trim(source_len)?;
    }
    dst.sync()?;

    let report = CopyReport {
        source_len,
        bytes_copied,
        resumed_from,
        mode: options.mode,
        elapsed_ms: started.elapsed().as_millis(),
    };
    info!(bytes_copied, elapsed_ms = report.elapsed_ms as u64, "copy finished");
    Ok(report)
}
