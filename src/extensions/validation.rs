//! Frame validation for security hardening (RFC 6455).
//!
//! Runs as the internal `@validation` extension and enforces:
//! - Control frames must not be fragmented (RFC 6455 Section 5.5)
//! - Control frames must not carry reserved bits
//! - Control frame payloads must not exceed 125 bytes
//! - Frame size limits

use tracing::debug;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::extensions::{Extension, ExtensionConfig};
use crate::protocol::{Frame, MAX_CONTROL_FRAME_PAYLOAD};
use crate::session::{Callback, IncomingFrames, OutgoingFrames, SharedSession};

/// Frame validator for both directions of the chain.
///
/// A violating frame is not forwarded; its callback fails instead. Inbound
/// violations also abort the session, since the peer broke the protocol.
pub struct ValidationExtension {
    config: ExtensionConfig,
    limits: Limits,
    session: Option<SharedSession>,
}

impl ValidationExtension {
    /// Registered extension name. Internal, never advertised.
    pub const NAME: &'static str = "@validation";

    /// Create a validator enforcing `limits`.
    #[must_use]
    pub fn new(config: ExtensionConfig, limits: Limits) -> Self {
        Self {
            config,
            limits,
            session: None,
        }
    }

    /// Validate a frame in either direction.
    ///
    /// # Errors
    ///
    /// - `Error::FragmentedControlFrame` - Control frame without FIN
    /// - `Error::ReservedBitsSet` - Control frame with an RSV bit set
    /// - `Error::ControlFrameTooLarge` - Control payload over 125 bytes
    /// - `Error::FrameTooLarge` - Frame exceeds size limit
    pub fn validate(&self, frame: &Frame) -> Result<()> {
        if frame.opcode.is_control() {
            self.validate_control(frame)?;
        }
        self.limits.check_frame_size(frame.payload_len())
    }

    fn validate_control(&self, frame: &Frame) -> Result<()> {
        if !frame.fin {
            return Err(Error::FragmentedControlFrame);
        }
        if !frame.rsv_bits().is_empty() {
            return Err(Error::ReservedBitsSet);
        }
        if frame.payload_len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(frame.payload_len()));
        }
        Ok(())
    }
}

impl Extension for ValidationExtension {
    fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    fn set_session(&mut self, session: SharedSession) {
        self.session = Some(session);
    }

    fn on_frame(&self, frame: Frame, callback: Callback, next: &mut dyn IncomingFrames) {
        match self.validate(&frame) {
            Ok(()) => next.on_frame(frame, callback),
            Err(err) => {
                debug!(opcode = %frame.opcode, error = %err, "rejecting inbound frame");
                if let Some(session) = &self.session {
                    session.abort(&err);
                }
                callback.failed(err);
            }
        }
    }

    fn send_frame(
        &self,
        frame: Frame,
        callback: Callback,
        batch: bool,
        next: &mut dyn OutgoingFrames,
    ) {
        match self.validate(&frame) {
            Ok(()) => next.send_frame(frame, callback, batch),
            Err(err) => {
                debug!(opcode = %frame.opcode, error = %err, "rejecting outbound frame");
                callback.failed(err);
            }
        }
    }
}

impl std::fmt::Debug for ValidationExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationExtension")
            .field("limits", &self.limits)
            .field("has_session", &self.session.is_some())
            .finish()
    }
}
