//! Files and block devices opened for unbuffered I/O.

use super::Device;
use crate::aligned_buffer::memory_alignment;
use crate::stream::Capabilities;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

#[cfg(target_os = "linux")]
fn get_block_device_size(file: &File) -> io::Result<u64> {
    use std::os::unix::io::AsRawFd;

    const BLKGETSIZE64: libc::c_ulong = 0x80081272;

    let mut size: u64 = 0;
    let result = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size) };

    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(size)
    }
}

#[cfg(not(target_os = "linux"))]
fn get_block_device_size(_file: &File) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Not supported on this platform",
    ))
}

/// Turns on `O_DIRECT` for an already opened descriptor.
#[cfg(target_os = "linux")]
fn enable_direct(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_DIRECT) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail if the target exists.
    Create,
    Truncate,
    /// Keep existing contents, for continuing an interrupted copy.
    Resume,
}

/// A file or block device opened so that transfers bypass the OS cache.
///
/// When the platform or filesystem refuses unbuffered access the handle falls
/// back to ordinary buffered I/O; [`DirectFile::is_direct`] tells which one
/// was obtained. Either way the handle is meant to be driven through the
/// aligned streams or the copy routines, which only issue aligned requests.
#[derive(Debug)]
pub struct DirectFile {
    file: File,
    position: u64,
    len: u64,
    caps: Capabilities,
    alignment: usize,
    direct: bool,
}

impl DirectFile {
    pub fn open_read(path: impl AsRef<Path>, alignment: usize) -> io::Result<Self> {
        let path = path.as_ref();

        #[cfg(target_os = "linux")]
        let (file, direct) = {
            use std::os::unix::fs::OpenOptionsExt;
            match OpenOptions::new()
                .read(true)
                .custom_flags(libc::O_DIRECT)
                .open(path)
            {
                Ok(f) => (f, true),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "O_DIRECT refused, using buffered reads");
                    (OpenOptions::new().read(true).open(path)?, false)
                }
            }
        };

        #[cfg(windows)]
        let (file, direct) = {
            use std::os::windows::fs::OpenOptionsExt;
            use windows_sys::Win32::Storage::FileSystem::FILE_FLAG_NO_BUFFERING;
            match OpenOptions::new()
                .read(true)
                .custom_flags(FILE_FLAG_NO_BUFFERING)
                .open(path)
            {
                Ok(f) => (f, true),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "unbuffered open refused, using buffered reads");
                    (OpenOptions::new().read(true).open(path)?, false)
                }
            }
        };

        #[cfg(not(any(target_os = "linux", windows)))]
        let (file, direct) = (OpenOptions::new().read(true).open(path)?, false);

        #[cfg(target_os = "linux")]
        {
            use rustix::fs::{fadvise, Advice};

            let _ = fadvise(&file, 0, None, Advice::Sequential);
        }

        let mut len = file.metadata()?.len();
        if len == 0 {
            if let Ok(device_size) = get_block_device_size(&file) {
                len = device_size;
            }
        }

        debug!(path = %path.display(), len, direct, "opened source");
        Ok(Self {
            file,
            position: 0,
            len,
            caps: Capabilities::READ_ONLY,
            alignment,
            direct,
        })
    }

    /// Opens a target for writing. The handle is also readable so the aligned
    /// writer can merge partial sectors.
    pub fn open_write(path: impl AsRef<Path>, alignment: usize, mode: WriteMode) -> io::Result<Self> {
        let path = path.as_ref();
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        match mode {
            WriteMode::Create => options.create_new(true),
            WriteMode::Truncate => options.create(true).truncate(true),
            WriteMode::Resume => options.create(true),
        };

        #[cfg(target_os = "linux")]
        let (file, direct) = {
            let file = options.open(path)?;
            match enable_direct(&file) {
                Ok(()) => (file, true),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "O_DIRECT refused, using buffered writes");
                    (file, false)
                }
            }
        };

        #[cfg(windows)]
        let (file, direct) = {
            use std::os::windows::fs::OpenOptionsExt;
            use windows_sys::Win32::Storage::FileSystem::{
                FILE_FLAG_NO_BUFFERING, FILE_FLAG_WRITE_THROUGH,
            };
            let mut unbuffered = options.clone();
            unbuffered.custom_flags(FILE_FLAG_NO_BUFFERING | FILE_FLAG_WRITE_THROUGH);
            match unbuffered.open(path) {
                Ok(f) => (f, true),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(e),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "unbuffered open refused, using buffered writes");
                    (options.open(path)?, false)
                }
            }
        };

        #[cfg(not(any(target_os = "linux", windows)))]
        let (file, direct) = (options.open(path)?, false);

        let len = file.metadata()?.len();
        debug!(path = %path.display(), len, direct, ?mode, "opened target");
        Ok(Self {
            file,
            position: 0,
            len,
            caps: Capabilities::ALL,
            alignment,
            direct,
        })
    }

    #[inline]
    pub fn is_direct(&self) -> bool {
        self.direct
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

impl Read for DirectFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.file.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for DirectFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.position += n as u64;
        self.len = self.len.max(self.position);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for DirectFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.file.seek(pos)?;
        Ok(self.position)
    }
}

impl Device for DirectFile {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.len = self.file.metadata()?.len();
        Ok(())
    }

    #[cfg(unix)]
    fn trim(&mut self, len: u64) -> io::Result<()> {
        rustix::fs::ftruncate(&self.file, len)?;
        self.len = len;
        Ok(())
    }

    fn buffer_alignment(&self) -> usize {
        if self.direct {
            memory_alignment(self.alignment)
        } else {
            1
        }
    }
}
