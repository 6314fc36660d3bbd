//! Fixed-capacity single-producer/single-consumer byte ring.
//!
//! [`ring_buffer`] returns a [`RingWriter`] and a [`RingReader`]. Owning a half
//! is the right to use that end, so the one-writer/one-reader rule is checked by
//! the compiler rather than by convention. Neither end locks, blocks or panics:
//! transfers are all-or-nothing and report the number of bytes moved (0 when
//! the request does not fit).
//!
//! Capacity is rounded up to a power of two. Read and write positions are
//! tracked independently, so every byte of the capacity is usable; no slot is
//! reserved to tell "full" from "empty".
//!
//! There is no in-place resize. To change capacity, build a new pair on a
//! thread that is neither the producer nor the consumer and hand the halves
//! over.

use rtrb::{Consumer, Producer, RingBuffer};

/// Creates a ring of at least `capacity` bytes (rounded up to a power of two, minimum 1).
pub fn ring_buffer(capacity: usize) -> (RingWriter, RingReader) {
    let capacity = capacity.max(1).next_power_of_two();
    let (producer, consumer) = RingBuffer::<u8>::new(capacity);
    (
        RingWriter { inner: producer },
        RingReader { inner: consumer },
    )
}

/// Producer half of a byte ring.
pub struct RingWriter {
    inner: Producer<u8>,
}

impl RingWriter {
    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.buffer().capacity()
    }

    /// Bytes that can be written right now.
    #[inline]
    pub fn write_space(&self) -> usize {
        self.inner.slots()
    }

    /// Whether `n` bytes can be written right now. Always `false` for `n == 0`.
    #[inline]
    pub fn can_write(&self, n: usize) -> bool {
        n > 0 && n <= self.write_space()
    }

    /// Writes all of `data`, or nothing. Returns the bytes written.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.write_parts(&[data])
    }

    /// Writes the concatenation of `parts` as one unit, or nothing.
    ///
    /// The reader observes either none of the bytes or all of them.
    pub fn write_parts(&mut self, parts: &[&[u8]]) -> usize {
        let total: usize = parts.iter().map(|p| p.len()).sum();
        if !self.can_write(total) {
            return 0;
        }
        let Ok(mut chunk) = self.inner.write_chunk(total) else {
            return 0;
        };
        let (first, second) = chunk.as_mut_slices();
        scatter(first, second, parts);
        chunk.commit_all();
        total
    }
}

/// Consumer half of a byte ring.
pub struct RingReader {
    inner: Consumer<u8>,
}

impl RingReader {
    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.buffer().capacity()
    }

    /// Bytes available to read.
    #[inline]
    pub fn read_space(&self) -> usize {
        self.inner.slots()
    }

    /// Whether `n` bytes are available. Always `false` for `n == 0`.
    #[inline]
    pub fn can_read(&self, n: usize) -> bool {
        n > 0 && n <= self.read_space()
    }

    /// Fills `dest` completely and consumes the bytes, or does nothing.
    pub fn read(&mut self, dest: &mut [u8]) -> usize {
        self.read_advance(dest, true)
    }

    /// Fills `dest` without consuming anything.
    pub fn peek(&mut self, dest: &mut [u8]) -> usize {
        self.read_advance(dest, false)
    }

    /// Fills `dest` completely, consuming the bytes only when `advance` is set.
    pub fn read_advance(&mut self, dest: &mut [u8], advance: bool) -> usize {
        let n = dest.len();
        if !self.can_read(n) {
            return 0;
        }
        let Ok(chunk) = self.inner.read_chunk(n) else {
            return 0;
        };
        let (first, second) = chunk.as_slices();
        dest[..first.len()].copy_from_slice(first);
        dest[first.len()..].copy_from_slice(second);
        if advance {
            chunk.commit_all();
        }
        n
    }

    /// Discards `n` bytes, or nothing if fewer are available.
    pub fn skip(&mut self, n: usize) -> usize {
        if !self.can_read(n) {
            return 0;
        }
        match self.inner.read_chunk(n) {
            Ok(chunk) => {
                chunk.commit_all();
                n
            }
            Err(_) => 0,
        }
    }
}

/// Copies `parts` back to back across the two wrap segments.
fn scatter(first: &mut [u8], second: &mut [u8], parts: &[&[u8]]) {
    let mut offset = 0;
    for part in parts {
        let mut src = *part;
        while !src.is_empty() {
            let dst = if offset < first.len() {
                &mut first[offset..]
            } else {
                &mut second[offset - first.len()..]
            };
            let n = src.len().min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
            src = &src[n..];
            offset += n;
        }
    }
}
