//! Extension that forwards every frame unchanged.

use tracing::trace;

use crate::extensions::{Extension, ExtensionConfig};
use crate::protocol::Frame;
use crate::session::{Callback, IncomingFrames, OutgoingFrames};

/// Pass-through extension, useful for exercising negotiation.
///
/// Any parameters are accepted and echoed back in its config.
#[derive(Debug, Clone)]
pub struct IdentityExtension {
    config: ExtensionConfig,
}

impl IdentityExtension {
    /// Registered extension name.
    pub const NAME: &'static str = "identity";

    /// Create an instance for the negotiated `config`.
    #[must_use]
    pub fn new(config: ExtensionConfig) -> Self {
        Self { config }
    }
}

impl Extension for IdentityExtension {
    fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    fn on_frame(&self, frame: Frame, callback: Callback, next: &mut dyn IncomingFrames) {
        trace!(opcode = %frame.opcode, len = frame.payload_len(), "identity in");
        next.on_frame(frame, callback);
    }

    fn send_frame(
        &self,
        frame: Frame,
        callback: Callback,
        batch: bool,
        next: &mut dyn OutgoingFrames,
    ) {
        trace!(opcode = %frame.opcode, len = frame.payload_len(), "identity out");
        next.send_frame(frame, callback, batch);
    }
}
