pub mod aligned_buffer;
pub mod config;
pub mod copy;
pub mod device;
pub mod digest;
pub mod error;
pub mod pool;
pub mod stream;

pub use aligned_buffer::AlignedBuffer;
pub use config::{CopyMode, CopyOptions, StreamConfig};
pub use copy::{copy_file, copy_sequential, copy_threaded, CancelToken, CopyReport};
pub use device::{Device, DirectFile, MemoryDevice, WriteMode};
pub use digest::DigestAlgorithm;
pub use error::{Error, Result};
pub use pool::{BlockingQueue, BufferPool};
pub use stream::{
    AlignedReader, AlignedWriter, Alignment, ByteStream, Capabilities, HighWaterMark, IoStream,
    Shell,
};
