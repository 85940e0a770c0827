//! Bounded set of aligned buffers circulated between a reader and a writer.

use crate::aligned_buffer::AlignedBuffer;
use crate::error::{Error, Result};
use crate::stream::Alignment;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct QueueState<T> {
    items: VecDeque<T>,
    cancelled: bool,
}

/// Strict FIFO whose `pop` blocks while the queue is empty.
///
/// Every `push` wakes one waiter. A woken waiter re-checks the queue under the
/// lock, so spurious wakeups are harmless and no wakeup is lost when several
/// items arrive before anyone runs. Cancelling wakes every waiter and makes
/// all further pops fail with [`Error::Aborted`].
pub struct BlockingQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self::with_items(Vec::new())
    }

    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: items.into_iter().collect(),
                cancelled: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn push(&self, item: T) {
        self.state.lock().items.push_back(item);
        self.available.notify_one();
    }

    pub fn pop(&self) -> Result<T> {
        let mut state = self.state.lock();
        loop {
            if state.cancelled {
                return Err(Error::Aborted);
            }
            if let Some(item) = state.items.pop_front() {
                return Ok(item);
            }
            self.available.wait(&mut state);
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    pub fn cancel(&self) {
        self.state.lock().cancelled = true;
        self.available.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// `N` equally sized buffers, each owned at any moment by exactly one of the
/// free queue, the ready queue, or whoever took it out.
///
/// Buffers move by value, so ownership is tracked by the type system: a
/// buffer handed out by [`BufferPool::allocate`] or [`BufferPool::dequeue`]
/// is in neither queue until it is given back.
pub struct BufferPool {
    free: BlockingQueue<AlignedBuffer>,
    ready: BlockingQueue<AlignedBuffer>,
    capacity: usize,
    buffer_len: usize,
    alignment: Alignment,
}

impl BufferPool {
    pub fn new(count: usize, buffer_len: usize, alignment: usize) -> Result<Self> {
        let alignment = Alignment::new(alignment)?;
        if count == 0 {
            return Err(Error::invalid("buffer pool needs at least one buffer"));
        }
        if buffer_len == 0 || buffer_len % alignment.size() != 0 {
            return Err(Error::invalid(format!(
                "buffer length {buffer_len} must be a positive multiple of {}",
                alignment.size()
            )));
        }

        let buffers = (0..count)
            .map(|_| AlignedBuffer::new(buffer_len, alignment.size()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            free: BlockingQueue::with_items(buffers),
            ready: BlockingQueue::new(),
            capacity: count,
            buffer_len,
            alignment,
        })
    }

    /// Takes a free buffer, blocking until one is returned.
    pub fn allocate(&self) -> Result<AlignedBuffer> {
        self.free.pop()
    }

    pub fn free(&self, mut buffer: AlignedBuffer) {
        buffer.reset();
        self.free.push(buffer);
    }

    /// Hands a filled buffer to the consumer.
    pub fn enqueue(&self, buffer: AlignedBuffer) {
        self.ready.push(buffer);
    }

    /// Takes the oldest filled buffer, blocking until one is enqueued.
    pub fn dequeue(&self) -> Result<AlignedBuffer> {
        self.ready.pop()
    }

    pub fn cancel(&self) {
        self.free.cancel();
        self.ready.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.free.is_cancelled()
    }

    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_queue_is_fifo() {
        let queue = BlockingQueue::new();
        for i in 0..5 {
            queue.push(i);
        }
        let drained: Vec<i32> = (0..5).map(|_| queue.pop().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(BlockingQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop().unwrap())
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(42u32);
        assert_eq!(consumer.join().unwrap(), 42);
    }

    #[test]
    fn test_cancel_wakes_waiters() {
        let queue: Arc<BlockingQueue<u8>> = Arc::new(BlockingQueue::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        queue.cancel();
        for waiter in waiters {
            assert!(matches!(waiter.join().unwrap(), Err(Error::Aborted)));
        }
    }

    #[test]
    fn test_pool_construction() {
        let pool = BufferPool::new(3, 4096, 512).unwrap();
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.free_len(), 3);
        assert_eq!(pool.ready_len(), 0);

        let buffer = pool.allocate().unwrap();
        assert_eq!(buffer.capacity(), 4096);
        assert!(buffer.is_aligned());
        assert_eq!(pool.free_len(), 2);
        pool.enqueue(buffer);
        assert_eq!(pool.ready_len(), 1);
    }

    #[test]
    fn test_pool_rejects_bad_geometry() {
        assert!(BufferPool::new(0, 4096, 512).is_err());
        assert!(BufferPool::new(2, 1000, 512).is_err());
        assert!(BufferPool::new(2, 4096, 0).is_err());
    }
}
