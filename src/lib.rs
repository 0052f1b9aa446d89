//! # wspipe - Buffer accumulation and extension pipeline for WebSocket engines
//!
//! `wspipe` provides two building blocks a WebSocket implementation sits on:
//!
//! - **Pooled buffer accumulation**: [`BufferAccumulator`] collects variable-size
//!   writes into buffers drawn from a [`BufferPool`] and hands them off as one
//!   contiguous payload.
//! - **Extension negotiation and chaining**: [`ExtensionStack`] instantiates the
//!   negotiated extensions (RFC 6455 Section 9), enforces exclusive use of the
//!   reserved bits and routes frames through them in both directions.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wspipe::{Callback, Config, ExtensionConfig, ExtensionRegistry, ExtensionResources, ExtensionStack, Frame};
//!
//! let config = Config::server();
//! let registry = Arc::new(ExtensionRegistry::with_defaults());
//! let mut stack = ExtensionStack::from_config(registry, &config);
//!
//! let offered = ExtensionConfig::parse_header(request_header)?;
//! stack.negotiate(&ExtensionResources::from_config(&config), &offered, &accepted)?;
//! stack.initialize(app_sink, network_sink, session)?;
//!
//! stack.send_frame(Frame::text("hello"), Callback::noop(), false)?;
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod extensions;
pub mod protocol;
pub mod session;

#[cfg(test)]
mod testing;

pub use buffer::{BucketedBufferPool, BufferAccumulator, BufferPool, NullBufferPool};
pub use config::{Config, Limits, PoolConfig};
pub use error::{Error, Result};
pub use extensions::{
    Extension, ExtensionConfig, ExtensionParam, ExtensionRegistry, ExtensionResources,
    ExtensionStack, RsvBits, StackState,
};
pub use protocol::{Frame, OpCode};
pub use session::{Behavior, Callback, IncomingFrames, OutgoingFrames, SessionContext};
