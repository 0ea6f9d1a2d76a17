//! Growable byte buffer with a hard capacity ceiling.
//!
//! A [`Buffer`] owns a data region of `capacity` bytes and a write cursor.
//! The readable region is always `[0, len)`. Growth is explicit
//! ([`Buffer::resize`]) or automatic ([`Buffer::append_and_grow`],
//! [`Buffer::format_append_and_grow`]), but never goes past the
//! `capacity_max` fixed when the buffer was created. That ceiling is what
//! bounds per-connection memory.
//!
//! Data loss is always reported: a truncating append returns
//! [`BufferError::Truncated`], a formatted append that does not fit returns
//! [`BufferError::Overflow`] with the size it would have needed and leaves
//! the logical length untouched.

use std::fmt;
use std::io::{self, Read, Write};

use thiserror::Error;

/// Errors reported by [`Buffer`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// No room at all; nothing was stored.
    #[error("buffer is full")]
    Full,
    /// Only a prefix of the input fit; `stored` bytes were kept.
    #[error("buffer truncated input: stored {stored} of {requested} bytes")]
    Truncated { stored: usize, requested: usize },
    /// Formatted output did not fit; `needed` is the total length required.
    #[error("formatted output needs {needed} bytes")]
    Overflow { needed: usize },
    /// A `Display` implementation reported an error while formatting.
    #[error("formatting failed")]
    Format,
    /// The allocator refused to grow the data region.
    #[error("failed to allocate {requested} bytes")]
    Alloc { requested: usize },
}

/// Byte container with a current capacity, a hard maximum and a write cursor.
pub struct Buffer {
    /// Data region, `data.len()` is the current capacity.
    data: Vec<u8>,
    write_pos: usize,
    capacity_max: usize,
}

impl Buffer {
    /// Creates an empty buffer whose ceiling equals its initial capacity.
    pub fn new(capacity: usize) -> Self {
        Self::with_limit(capacity, capacity)
    }

    /// Creates an empty buffer of `initial` bytes that may grow up to `max`.
    ///
    /// A `max` smaller than `initial` is raised to `initial`.
    pub fn with_limit(initial: usize, max: usize) -> Self {
        Self {
            data: vec![0; initial],
            write_pos: 0,
            capacity_max: max.max(initial),
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn capacity_max(&self) -> usize {
        self.capacity_max
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.write_pos
    }

    pub fn is_empty(&self) -> bool {
        self.write_pos == 0
    }

    /// Free bytes left in the current data region.
    pub fn available(&self) -> usize {
        self.data.len() - self.write_pos
    }

    pub fn is_full(&self) -> bool {
        self.available() == 0
    }

    /// True once the buffer is full and cannot grow any further.
    pub fn is_exhausted(&self) -> bool {
        self.is_full() && self.capacity() >= self.capacity_max
    }

    /// The readable region `[0, len)`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.write_pos]
    }

    /// Empties the buffer without releasing its storage.
    pub fn reset(&mut self) {
        self.write_pos = 0;
    }

    /// Reallocates the data region to `capacity` bytes, clamped to the ceiling.
    ///
    /// Shrinking below the current length truncates the written data.
    /// Returns the capacity actually applied.
    pub fn resize(&mut self, capacity: usize) -> Result<usize, BufferError> {
        let capacity = capacity.min(self.capacity_max);
        let current = self.data.len();

        if capacity > current {
            self.data
                .try_reserve_exact(capacity - current)
                .map_err(|_| BufferError::Alloc {
                    requested: capacity,
                })?;
            self.data.resize(capacity, 0);
        } else if capacity < current {
            self.data.truncate(capacity);
            self.data.shrink_to_fit();
        }

        if self.write_pos > capacity {
            self.write_pos = capacity;
        }

        Ok(capacity)
    }

    /// Copies as much of `bytes` as fits into the free region.
    ///
    /// Returns the number of bytes stored when everything fit,
    /// [`BufferError::Truncated`] when only a prefix was stored and
    /// [`BufferError::Full`] when nothing could be stored.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize, BufferError> {
        if bytes.is_empty() {
            return Ok(0);
        }

        let room = self.available();
        if room == 0 {
            return Err(BufferError::Full);
        }

        let stored = room.min(bytes.len());
        self.data[self.write_pos..self.write_pos + stored].copy_from_slice(&bytes[..stored]);
        self.write_pos += stored;

        if stored < bytes.len() {
            return Err(BufferError::Truncated {
                stored,
                requested: bytes.len(),
            });
        }

        Ok(stored)
    }

    /// Like [`append`](Self::append), but first grows the buffer to exactly
    /// fit `bytes`. Truncation only happens once the ceiling is reached.
    pub fn append_and_grow(&mut self, bytes: &[u8]) -> Result<usize, BufferError> {
        let needed = self.write_pos.saturating_add(bytes.len());
        if needed > self.capacity() {
            self.resize(needed)?;
        }
        self.append(bytes)
    }

    /// Formats `args` into the free region.
    ///
    /// On success returns the new length. When the output does not fit the
    /// length is left unchanged and [`BufferError::Overflow`] carries the
    /// total length the buffer would need.
    pub fn format_append(&mut self, args: fmt::Arguments<'_>) -> Result<usize, BufferError> {
        let mut spare = SpareWriter {
            spare: &mut self.data[self.write_pos..],
            written: 0,
            overflowed: false,
        };

        fmt::write(&mut spare, args).map_err(|_| BufferError::Format)?;

        if spare.overflowed {
            return Err(BufferError::Overflow {
                needed: self.write_pos + spare.written,
            });
        }

        self.write_pos += spare.written;
        Ok(self.write_pos)
    }

    /// Like [`format_append`](Self::format_append), but on overflow resizes
    /// once to the exact size needed and retries.
    pub fn format_append_and_grow(
        &mut self,
        args: fmt::Arguments<'_>,
    ) -> Result<usize, BufferError> {
        match self.format_append(args) {
            Err(BufferError::Overflow { needed }) => {
                self.resize(needed)?;
                self.format_append(args)
            }
            other => other,
        }
    }

    /// Issues a single read into the free region and advances the cursor.
    ///
    /// Returns `Ok(0)` when the peer closed. A full buffer is reported as
    /// an error rather than as a zero-length read.
    pub fn read_from<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<usize> {
        if self.is_full() {
            return Err(io::Error::other(BufferError::Full));
        }

        let n = reader.read(&mut self.data[self.write_pos..])?;
        self.write_pos += n;
        Ok(n)
    }

    /// Writes `[offset, offset + len)` of the readable region, or
    /// `[offset, len)` when `len` is `None`.
    pub fn write_to<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        offset: usize,
        len: Option<usize>,
    ) -> io::Result<usize> {
        let end = match len {
            Some(len) => offset.saturating_add(len).min(self.write_pos),
            None => self.write_pos,
        };
        let start = offset.min(end);
        writer.write(&self.data[start..end])
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = &self.as_bytes()[..self.write_pos.min(16)];
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity())
            .field("capacity_max", &self.capacity_max)
            .field("len", &self.write_pos)
            .field("head", &String::from_utf8_lossy(head))
            .finish()
    }
}

/// `fmt::Write` adapter over the free region that keeps counting after it
/// runs out of room, so the caller learns the full size required.
struct SpareWriter<'a> {
    spare: &'a mut [u8],
    written: usize,
    overflowed: bool,
}

impl fmt::Write for SpareWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.written + s.len();
        if !self.overflowed && end <= self.spare.len() {
            self.spare[self.written..end].copy_from_slice(s.as_bytes());
        } else {
            self.overflowed = true;
        }
        self.written = end;
        Ok(())
    }
}
