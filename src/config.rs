//! Tunables for aligned streams and whole-file copies.

use crate::error::{Error, Result};
use serde::Serialize;

/// Sector size used when the caller does not pick one.
pub const DEFAULT_ALIGNMENT: usize = 512;

/// Page size, the stricter alignment some direct-I/O stacks demand.
pub const PAGE_ALIGNMENT: usize = 4096;

pub const DEFAULT_BUFFER_LEN: usize = 4 * 1024 * 1024;
pub const DEFAULT_BUFFER_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub alignment: usize,
    /// Repeat a resize that the device reported as not taking effect.
    pub resize_retry: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            resize_retry: true,
        }
    }
}

impl StreamConfig {
    pub fn new(alignment: usize) -> Self {
        Self {
            alignment,
            ..Self::default()
        }
    }

    pub fn with_resize_retry(mut self, enabled: bool) -> Self {
        self.resize_retry = enabled;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    Sequential,
    #[default]
    Threaded,
    Stream,
}

impl std::fmt::Display for CopyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CopyMode::Sequential => write!(f, "sequential"),
            CopyMode::Threaded => write!(f, "threaded"),
            CopyMode::Stream => write!(f, "stream"),
        }
    }
}

impl std::str::FromStr for CopyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(CopyMode::Sequential),
            "threaded" => Ok(CopyMode::Threaded),
            "stream" => Ok(CopyMode::Stream),
            other => Err(Error::invalid(format!("unknown copy mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub alignment: usize,
    pub buffer_len: usize,
    pub buffer_count: usize,
    pub mode: CopyMode,
    /// Continue a previous partial copy instead of starting over.
    pub resumable: bool,
    pub overwrite: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            alignment: DEFAULT_ALIGNMENT,
            buffer_len: DEFAULT_BUFFER_LEN,
            buffer_count: DEFAULT_BUFFER_COUNT,
            mode: CopyMode::default(),
            resumable: false,
            overwrite: false,
        }
    }
}

impl CopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_buffer_len(mut self, len: usize) -> Self {
        self.buffer_len = len;
        self
    }

    pub fn with_buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }

    pub fn with_mode(mut self, mode: CopyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn resumable(mut self, enabled: bool) -> Self {
        self.resumable = enabled;
        self
    }

    pub fn overwrite(mut self, enabled: bool) -> Self {
        self.overwrite = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.alignment == 0 {
            return Err(Error::invalid("alignment must be positive"));
        }
        if self.buffer_count == 0 {
            return Err(Error::invalid("buffer count must be at least 1"));
        }
        if self.buffer_len == 0 || self.buffer_len % self.alignment != 0 {
            return Err(Error::invalid(format!(
                "buffer length {} must be a positive multiple of the alignment {}",
                self.buffer_len, self.alignment
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = CopyOptions::default();
        assert_eq!(options.alignment, 512);
        assert_eq!(options.buffer_len, 4 * 1024 * 1024);
        assert_eq!(options.mode, CopyMode::Threaded);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let options = CopyOptions::new()
            .with_alignment(4096)
            .with_buffer_len(8192)
            .with_buffer_count(2)
            .with_mode(CopyMode::Stream)
            .resumable(true);

        assert_eq!(options.alignment, 4096);
        assert_eq!(options.buffer_count, 2);
        assert!(options.resumable);
        assert!(!options.overwrite);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(CopyOptions::new().with_alignment(0).validate().is_err());
        assert!(CopyOptions::new().with_buffer_count(0).validate().is_err());
        assert!(CopyOptions::new().with_buffer_len(1000).validate().is_err());
        assert!(CopyOptions::new().with_buffer_len(0).validate().is_err());
    }

    #[test]
    fn test_copy_mode_parse() {
        assert_eq!("Stream".parse::<CopyMode>().unwrap(), CopyMode::Stream);
        assert_eq!(CopyMode::Sequential.to_string(), "sequential");
        assert!("parallel".parse::<CopyMode>().is_err());
    }
}
