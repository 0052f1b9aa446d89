//! Accumulates written bytes into pooled buffers.
//!
//! The buffer list grows as data is written. Content can be handed off as one
//! contiguous buffer ([`BufferAccumulator::take_buffer`]), viewed in place
//! ([`BufferAccumulator::to_buffer`]), copied out ([`BufferAccumulator::to_vec`])
//! or written to a sink. [`BufferAccumulator::ensure_writable`] exposes the
//! tail buffer so producers can write into it directly instead of copying.

use std::fmt;
use std::io::Write;

use bytes::{Buf, BufMut, BytesMut};

use crate::buffer::pool::{NullBufferPool, SharedBufferPool};
use crate::error::Result;

/// Ordered list of pooled buffers holding accumulated bytes.
///
/// Buffers still owned when the accumulator is closed or dropped go back to
/// the pool.
pub struct BufferAccumulator {
    buffers: Vec<BytesMut>,
    pool: SharedBufferPool,
}

/// Free bytes left in a buffer before it would have to reallocate.
#[inline]
fn space(buffer: &BytesMut) -> usize {
    buffer.capacity() - buffer.len()
}

impl BufferAccumulator {
    /// Create an accumulator drawing buffers from `pool`.
    #[must_use]
    pub fn new(pool: SharedBufferPool) -> Self {
        Self {
            buffers: Vec::new(),
            pool,
        }
    }

    /// Create an accumulator, falling back to a [`NullBufferPool`].
    #[must_use]
    pub fn with_pool(pool: Option<SharedBufferPool>) -> Self {
        Self::new(pool.unwrap_or_else(NullBufferPool::shared))
    }

    /// Total number of readable bytes across all owned buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.iter().map(BytesMut::len).sum()
    }

    /// Check if no readable bytes are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.iter().all(BytesMut::is_empty)
    }

    /// Number of buffers currently owned.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// The pool buffers are drawn from.
    #[must_use]
    pub fn pool(&self) -> &SharedBufferPool {
        &self.pool
    }

    /// Tail buffer with at least one free byte, see [`Self::ensure_writable_with`].
    pub fn ensure_writable(&mut self, min_allocation: usize) -> &mut BytesMut {
        self.ensure_writable_with(1, min_allocation)
    }

    /// Tail buffer with at least `min_free` free bytes.
    ///
    /// When the tail has less room (or there is no tail yet) a buffer of at
    /// least `max(min_free, min_allocation)` bytes is acquired and appended.
    /// The buffer stays owned by the accumulator; write at most its free space
    /// into it.
    pub fn ensure_writable_with(&mut self, min_free: usize, min_allocation: usize) -> &mut BytesMut {
        let tail_space = self.buffers.last().map_or(0, space);
        if tail_space < min_free {
            let buffer = self.pool.acquire(min_free.max(min_allocation), false);
            self.buffers.push(buffer);
        }

        let last = self.buffers.len() - 1;
        &mut self.buffers[last]
    }

    /// Copy `bytes` into the accumulator.
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        let mut source = bytes;
        self.append_buf(&mut source);
    }

    /// Copy the remaining bytes of `source` into the accumulator.
    ///
    /// Each step fills whatever room the tail buffer has and only acquires a
    /// new buffer once the tail is full. The source's read cursor advances.
    pub fn append_buf<B: Buf>(&mut self, source: &mut B) {
        while source.has_remaining() {
            let wanted = source.remaining();
            let tail = self.ensure_writable(wanted);
            let chunk = source.chunk();
            let n = chunk.len().min(space(tail));
            tail.put_slice(&chunk[..n]);
            source.advance(n);
        }
    }

    /// Move all accumulated bytes out as one contiguous buffer.
    ///
    /// A single owned buffer is handed over as-is. Otherwise a buffer of
    /// [`Self::len`] bytes is acquired, everything is copied into it and the
    /// old buffers are released. The accumulator is empty afterwards and the
    /// caller is responsible for releasing the returned buffer.
    pub fn take_buffer(&mut self) -> BytesMut {
        if self.buffers.len() == 1 {
            if let Some(only) = self.buffers.pop() {
                return only;
            }
        }

        let mut combined = self.pool.acquire(self.len(), false);
        for buffer in self.buffers.drain(..) {
            combined.put_slice(&buffer);
            self.pool.release(buffer);
        }
        combined
    }

    /// Consolidate into one buffer that stays owned by the accumulator.
    ///
    /// The view lives until the next mutation; the buffer itself is released
    /// on [`Self::close`].
    pub fn to_buffer(&mut self) -> &BytesMut {
        let combined = self.take_buffer();
        self.buffers.push(combined);
        &self.buffers[0]
    }

    /// Copy all accumulated bytes into a new vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let length = self.len();
        if length == 0 {
            return Vec::new();
        }

        let mut bytes = Vec::with_capacity(length);
        for buffer in &self.buffers {
            bytes.extend_from_slice(buffer);
        }
        bytes
    }

    /// Append all accumulated bytes to `target`.
    pub fn write_to_buffer(&self, target: &mut BytesMut) {
        target.reserve(self.len());
        for buffer in &self.buffers {
            target.put_slice(buffer);
        }
    }

    /// Write all accumulated bytes to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the writer fails.
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<()> {
        for buffer in &self.buffers {
            out.write_all(buffer)?;
        }
        Ok(())
    }

    /// Write all accumulated bytes to an async writer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the writer fails.
    #[cfg(feature = "async-tokio")]
    pub async fn write_to_async<W>(&self, out: &mut W) -> Result<()>
    where
        W: tokio::io::AsyncWrite + Unpin,
    {
        use tokio::io::AsyncWriteExt;

        for buffer in &self.buffers {
            out.write_all(buffer).await?;
        }
        Ok(())
    }

    /// Release every owned buffer back to the pool.
    pub fn close(&mut self) {
        for buffer in self.buffers.drain(..) {
            self.pool.release(buffer);
        }
    }
}

impl Default for BufferAccumulator {
    fn default() -> Self {
        Self::with_pool(None)
    }
}

impl Drop for BufferAccumulator {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for BufferAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferAccumulator")
            .field("buffers", &self.buffers.len())
            .field("len", &self.len())
            .finish()
    }
}
