//! Session-facing contracts: connection behavior, frame handlers and
//! completion callbacks.
//!
//! The owning session supplies a terminal [`IncomingFrames`] sink, a terminal
//! [`OutgoingFrames`] sink and a [`SessionContext`]. Frames travel through the
//! extension chain with a [`Callback`] that reports the outcome upstream.

mod behavior;
mod callback;
mod frames;

pub use behavior::Behavior;
pub use callback::Callback;
pub use frames::{IncomingFrames, OutgoingFrames, SessionContext, SharedSession};
