//! Frame model shared by the extension chain (RFC 6455 Section 5).
//!
//! Wire encoding and decoding belong to the session's codec; extensions only
//! see decoded frames.

pub mod frame;
pub mod opcode;

pub use frame::{Frame, MAX_CONTROL_FRAME_PAYLOAD};
pub use opcode::OpCode;
