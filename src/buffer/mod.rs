//! Pooled byte buffers and the accumulator built on top of them.
//!
//! # Example
//!
//! ```rust
//! use wspipe::buffer::{BucketedBufferPool, BufferAccumulator, BufferPool};
//! use wspipe::config::PoolConfig;
//!
//! let pool = BucketedBufferPool::shared(PoolConfig::default());
//! let mut accumulator = BufferAccumulator::new(pool.clone());
//! accumulator.append_bytes(b"hello ");
//! accumulator.append_bytes(b"world");
//!
//! let payload = accumulator.take_buffer();
//! assert_eq!(&payload[..], b"hello world");
//! pool.release(payload);
//! ```

pub mod accumulator;
pub mod pool;

pub use accumulator::BufferAccumulator;
pub use pool::{BucketedBufferPool, BufferPool, NullBufferPool, PoolStats, SharedBufferPool};
