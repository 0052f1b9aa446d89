//! Test harness utilities for driving extension stacks.
//!
//! Provides session sinks, a session context, a marker extension with
//! configurable reserved bits and shared counters for concurrency tests.

#![allow(dead_code)]

mod metrics;
mod session;

pub use metrics::Metrics;
pub use session::{
    AnsweringIncoming, ChannelOutgoing, CollectingIncoming, CollectingOutgoing, Delivered, MarkerExtension,
    StaticSession, marker_registry,
};
