//! Buffer pools consumed through an acquire/release contract.
//!
//! Buffers are plain [`BytesMut`] values. Releasing a buffer moves it into the
//! pool, so a released buffer can neither be released twice nor used again.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;

use crate::config::PoolConfig;

/// Source of reusable byte buffers.
pub trait BufferPool: Send + Sync {
    /// Acquire an empty buffer with at least `min_capacity` bytes of capacity.
    ///
    /// `prefer_direct` is a hint for pools that distinguish memory kinds.
    fn acquire(&self, min_capacity: usize, prefer_direct: bool) -> BytesMut;

    /// Give a buffer back to the pool.
    fn release(&self, buffer: BytesMut);
}

/// Pool handle shared between accumulators and extensions.
pub type SharedBufferPool = Arc<dyn BufferPool>;

/// Pool that allocates on every acquire and drops released buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBufferPool;

impl NullBufferPool {
    /// Shared handle to a null pool.
    #[must_use]
    pub fn shared() -> SharedBufferPool {
        Arc::new(NullBufferPool)
    }
}

impl BufferPool for NullBufferPool {
    fn acquire(&self, min_capacity: usize, _prefer_direct: bool) -> BytesMut {
        BytesMut::with_capacity(min_capacity)
    }

    fn release(&self, _buffer: BytesMut) {}
}

/// Usage counters of a [`BucketedBufferPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers handed out by `acquire`.
    pub acquired: usize,
    /// Buffers given back through `release`.
    pub released: usize,
    /// Buffers that had to be freshly allocated.
    pub allocated: usize,
    /// Idle buffers currently retained for reuse.
    pub retained: usize,
}

/// Pool keeping idle buffers in size-class buckets.
///
/// Bucket `n` (1-based) holds buffers of at least `n * factor` bytes. Requests
/// larger than `max_capacity` bypass the buckets entirely.
pub struct BucketedBufferPool {
    config: PoolConfig,
    buckets: Mutex<Vec<VecDeque<BytesMut>>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    allocated: AtomicUsize,
}

impl BucketedBufferPool {
    /// Create a pool with the given sizing.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let config = PoolConfig::new(config.factor, config.max_capacity, config.max_bucket_size);
        let buckets = (0..config.bucket_count()).map(|_| VecDeque::new()).collect();
        Self {
            config,
            buckets: Mutex::new(buckets),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            allocated: AtomicUsize::new(0),
        }
    }

    /// Shared handle to a new pool.
    #[must_use]
    pub fn shared(config: PoolConfig) -> SharedBufferPool {
        Arc::new(Self::new(config))
    }

    /// Pool sizing.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Snapshot of the usage counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let retained = self.lock_buckets().iter().map(VecDeque::len).sum();
        PoolStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            allocated: self.allocated.load(Ordering::Relaxed),
            retained,
        }
    }

    /// Drop every retained buffer.
    pub fn clear(&self) {
        for bucket in self.lock_buckets().iter_mut() {
            bucket.clear();
        }
    }

    fn lock_buckets(&self) -> std::sync::MutexGuard<'_, Vec<VecDeque<BytesMut>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(&self, capacity: usize) -> BytesMut {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        BytesMut::with_capacity(capacity)
    }
}

impl BufferPool for BucketedBufferPool {
    fn acquire(&self, min_capacity: usize, _prefer_direct: bool) -> BytesMut {
        self.acquired.fetch_add(1, Ordering::Relaxed);

        if min_capacity > self.config.max_capacity {
            tracing::trace!(min_capacity, "acquiring unpooled buffer");
            return self.allocate(min_capacity);
        }

        let bucket = min_capacity.div_ceil(self.config.factor).max(1);
        let reused = self
            .lock_buckets()
            .get_mut(bucket - 1)
            .and_then(VecDeque::pop_front);

        match reused {
            Some(buffer) => buffer,
            None => self.allocate(bucket * self.config.factor),
        }
    }

    fn release(&self, mut buffer: BytesMut) {
        self.released.fetch_add(1, Ordering::Relaxed);

        let capacity = buffer.capacity();
        if capacity < self.config.factor || capacity > self.config.max_capacity {
            return;
        }

        let bucket = capacity / self.config.factor;
        buffer.clear();

        let mut buckets = self.lock_buckets();
        if let Some(slot) = buckets.get_mut(bucket - 1) {
            if slot.len() < self.config.max_bucket_size {
                slot.push_back(buffer);
            }
        }
    }
}

impl fmt::Debug for BucketedBufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketedBufferPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
