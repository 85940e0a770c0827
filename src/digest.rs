//! Content digests computed through the aligned read path.

use crate::aligned_buffer::AlignedBuffer;
use crate::config::{StreamConfig, DEFAULT_BUFFER_LEN};
use crate::device::DirectFile;
use crate::error::{Error, Result};
use crate::stream::{AlignedReader, ByteStream};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
    Sha384,
    Sha512,
    Crc32,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
            DigestAlgorithm::Crc32 => "crc32",
        };
        f.write_str(name)
    }
}

impl FromStr for DigestAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha1" => Ok(DigestAlgorithm::Sha1),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            "sha384" => Ok(DigestAlgorithm::Sha384),
            "sha512" => Ok(DigestAlgorithm::Sha512),
            "crc32" => Ok(DigestAlgorithm::Crc32),
            _ => Err(Error::invalid(format!("unknown digest algorithm '{s}'"))),
        }
    }
}

enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
    Crc32(crc32fast::Hasher),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            DigestAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            DigestAlgorithm::Sha384 => Hasher::Sha384(Sha384::new()),
            DigestAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            DigestAlgorithm::Crc32 => Hasher::Crc32(crc32fast::Hasher::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Crc32(h) => h.update(data),
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha384(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
            Hasher::Crc32(h) => hex::encode(h.finalize().to_be_bytes()),
        }
    }
}

/// Hashes everything from the stream's current position to its end.
pub fn digest_stream<S: ByteStream + ?Sized>(
    stream: &mut S,
    algorithm: DigestAlgorithm,
    buffer: &mut AlignedBuffer,
) -> Result<String> {
    let mut hasher = Hasher::new(algorithm);
    loop {
        let n = stream.read(buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher.finish_hex())
}

pub fn digest_file(path: impl AsRef<Path>, algorithm: DigestAlgorithm, alignment: usize) -> Result<String> {
    let device = DirectFile::open_read(path, alignment)?;
    let mut reader = AlignedReader::new(device, StreamConfig::new(alignment))?;
    let mut buffer = AlignedBuffer::new(DEFAULT_BUFFER_LEN, alignment)?;
    digest_stream(&mut reader, algorithm, &mut buffer)
}

/// Returns the digest when it matches `expected` (compared case-insensitively).
pub fn verify_file(
    path: impl AsRef<Path>,
    algorithm: DigestAlgorithm,
    alignment: usize,
    expected: &str,
) -> Result<String> {
    let actual = digest_file(path, algorithm, alignment)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(actual)
    } else {
        Err(Error::DigestMismatch {
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        })
    }
}
