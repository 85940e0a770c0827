use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("Operation aborted")]
    Aborted,

    #[error("Target already exists: {}", .0.display())]
    TargetExists(PathBuf),

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// True for errors raised by cooperative cancellation rather than a real failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Error::Aborted)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(inner) => inner,
            Error::InvalidArgument(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            Error::NotSupported(what) => io::Error::new(io::ErrorKind::Unsupported, what),
            Error::Aborted => io::Error::new(io::ErrorKind::Interrupted, "operation aborted"),
            other => io::Error::other(other.to_string()),
        }
    }
}
