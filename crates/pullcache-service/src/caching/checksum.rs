use std::fmt::{self, Write};
use std::io;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// A SHA-256 checksum of computed pull data.
///
/// Two results with equal checksums are considered identical from the client's point of view, so
/// the input of a checksum must cover everything a client would care about, and nothing more.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Create a [`ChecksumBuilder`] to hash data piece by piece.
    pub fn builder() -> ChecksumBuilder {
        ChecksumBuilder {
            hasher: Sha256::new(),
        }
    }

    /// Computes the checksum of a byte slice.
    pub fn of_bytes(bytes: impl AsRef<[u8]>) -> Self {
        let mut builder = Self::builder();
        builder.update(bytes);
        builder.build()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            f.write_fmt(format_args!("{b:02x}"))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({self})")
    }
}

/// A builder for [`Checksum`]s.
///
/// This builder implements the [`Write`](std::fmt::Write) trait for human readable input, and can
/// hash any [`Serialize`] value through its JSON representation. The input has to be **stable**:
/// equal data must always be fed in the same order and format, or results will needlessly be
/// reported as changed.
pub struct ChecksumBuilder {
    hasher: Sha256,
}

impl ChecksumBuilder {
    /// Feeds raw bytes into the checksum.
    pub fn update(&mut self, bytes: impl AsRef<[u8]>) {
        self.hasher.update(bytes);
    }

    /// Feeds the JSON serialization of `value` into the checksum.
    ///
    /// Serialization is streamed into the hasher, no intermediate buffer is allocated.
    pub fn write_value<T: Serialize + ?Sized>(&mut self, value: &T) -> serde_json::Result<()> {
        serde_json::to_writer(HashWriter(&mut self.hasher), value)
    }

    /// Writes the language of the data into the checksum.
    ///
    /// The same data reported for documents of different languages may be rendered differently
    /// by the client, so the language takes part in the checksum.
    pub fn write_language(&mut self, language: &str) -> fmt::Result {
        self.write_fmt(format_args!("language: {language}\n"))
    }

    /// Finalize the [`Checksum`].
    pub fn build(self) -> Checksum {
        Checksum(self.hasher.finalize().into())
    }
}

impl fmt::Write for ChecksumBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.hasher.update(s.as_bytes());
        Ok(())
    }
}

struct HashWriter<'a>(&'a mut Sha256);

impl io::Write for HashWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
