use crate::error::{Error, Result};
use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Largest power of two dividing `alignment`, which is what a sector-sized
/// I/O alignment requires of the memory backing a transfer.
pub fn memory_alignment(alignment: usize) -> usize {
    if alignment == 0 {
        1
    } else {
        alignment & alignment.wrapping_neg()
    }
}

/// Fixed-capacity heap buffer whose start address satisfies a direct-I/O alignment.
///
/// Dereferences to the whole capacity. `used()` marks the valid prefix; the
/// bytes behind it are left as they were and must not be treated as content.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    capacity: usize,
    used: usize,
    layout: Layout,
}

impl AlignedBuffer {
    pub fn new(capacity: usize, alignment: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid("buffer capacity must be greater than 0"));
        }

        let layout = Layout::from_size_align(capacity, memory_alignment(alignment))
            .map_err(|e| Error::invalid(format!("invalid buffer layout: {e}")))?;

        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            handle_alloc_error(layout);
        };

        Ok(Self {
            ptr,
            capacity,
            used: 0,
            layout,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    pub fn set_used(&mut self, used: usize) -> Result<()> {
        if used > self.capacity {
            return Err(Error::invalid(format!(
                "used length {used} exceeds capacity {}",
                self.capacity
            )));
        }
        self.used = used;
        Ok(())
    }

    /// Marks the buffer empty without touching its bytes.
    #[inline]
    pub fn reset(&mut self) {
        self.used = 0;
    }

    /// The valid prefix.
    #[inline]
    pub fn filled(&self) -> &[u8] {
        &self.as_slice()[..self.used]
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.capacity) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.as_mut_slice().fill(0);
        self.used = 0;
    }

    /// Zeroes `[from, capacity)`.
    #[inline]
    pub fn zero_from(&mut self, from: usize) {
        let from = from.min(self.capacity);
        self.as_mut_slice()[from..].fill(0);
    }

    #[inline]
    pub fn is_aligned(&self) -> bool {
        (self.ptr.as_ptr() as usize) % self.layout.align() == 0
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl DerefMut for AlignedBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("capacity", &self.capacity)
            .field("used", &self.used)
            .field("alignment", &self.alignment())
            .finish()
    }
}

// The buffer exclusively owns its allocation.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}
