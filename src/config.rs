//! Configuration and limits for the frame pipeline.

use crate::session::Behavior;

/// Size limits enforced by extensions that transform payloads.
///
/// These limits prevent resource exhaustion attacks and ensure
/// bounded memory usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of a single frame payload in bytes.
    ///
    /// Default: 16 MB (16 * 1024 * 1024)
    pub max_frame_size: usize,

    /// Maximum size of a complete message in bytes.
    ///
    /// Applies to inflated payloads of compressed messages.
    ///
    /// Default: 64 MB (64 * 1024 * 1024)
    pub max_message_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl Limits {
    /// Create new limits with custom values.
    #[must_use]
    pub const fn new(max_frame_size: usize, max_message_size: usize) -> Self {
        Self {
            max_frame_size,
            max_message_size,
        }
    }

    /// Create limits suitable for small embedded systems.
    ///
    /// - Max frame: 64 KB
    /// - Max message: 256 KB
    #[must_use]
    pub const fn embedded() -> Self {
        Self {
            max_frame_size: 64 * 1024,
            max_message_size: 256 * 1024,
        }
    }

    /// Validate that message size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageTooLarge`](crate::Error::MessageTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_message_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_message_size {
            Err(crate::Error::MessageTooLarge {
                size,
                max: self.max_message_size,
            })
        } else {
            Ok(())
        }
    }

    /// Validate that frame size is within limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`](crate::Error::FrameTooLarge) if `size` exceeds the configured maximum.
    pub const fn check_frame_size(&self, size: usize) -> Result<(), crate::Error> {
        if size > self.max_frame_size {
            Err(crate::Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            })
        } else {
            Ok(())
        }
    }
}

/// Sizing of the bucketed buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Capacity step between buckets. Bucket `n` holds buffers of `n * factor` bytes.
    ///
    /// Default: 4 KB
    pub factor: usize,

    /// Largest capacity the pool retains. Bigger requests are allocated fresh.
    ///
    /// Default: 64 KB
    pub max_capacity: usize,

    /// Maximum number of idle buffers kept per bucket.
    ///
    /// Default: 64
    pub max_bucket_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            factor: 4 * 1024,
            max_capacity: 64 * 1024,
            max_bucket_size: 64,
        }
    }
}

impl PoolConfig {
    /// Create a pool configuration with custom values.
    ///
    /// A zero `factor` is bumped to 1.
    #[must_use]
    pub const fn new(factor: usize, max_capacity: usize, max_bucket_size: usize) -> Self {
        Self {
            factor: if factor == 0 { 1 } else { factor },
            max_capacity,
            max_bucket_size,
        }
    }

    /// Number of buckets needed to cover `max_capacity`.
    #[must_use]
    pub const fn bucket_count(&self) -> usize {
        self.max_capacity.div_ceil(self.factor)
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which side of the connection this pipeline runs on.
    ///
    /// Default: Server
    pub behavior: Behavior,

    /// Resource limits.
    pub limits: Limits,

    /// Buffer pool sizing.
    pub pool: PoolConfig,

    /// Minimum allocation used when an accumulator needs a fresh buffer.
    ///
    /// Default: 4 KB (4096)
    pub accumulator_allocation_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            behavior: Behavior::Server,
            limits: Limits::default(),
            pool: PoolConfig::default(),
            accumulator_allocation_size: 4096,
        }
    }
}

impl Config {
    /// Create a new configuration with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set buffer pool sizing.
    #[must_use]
    pub const fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the accumulator's minimum allocation size.
    #[must_use]
    pub const fn with_accumulator_allocation_size(mut self, size: usize) -> Self {
        self.accumulator_allocation_size = size;
        self
    }

    /// Configure for server behavior.
    #[must_use]
    pub fn server() -> Self {
        Self {
            behavior: Behavior::Server,
            ..Default::default()
        }
    }

    /// Configure for client behavior.
    #[must_use]
    pub fn client() -> Self {
        Self {
            behavior: Behavior::Client,
            ..Default::default()
        }
    }
}
