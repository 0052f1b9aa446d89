//! Frame handler capabilities shared by extensions and sessions.

use std::sync::Arc;

use crate::error::Error;
use crate::protocol::Frame;
use crate::session::{Behavior, Callback};

/// Receiver of inbound frames.
pub trait IncomingFrames {
    /// Handle a frame travelling toward the application.
    ///
    /// The callback must be completed exactly once, synchronously or later.
    fn on_frame(&mut self, frame: Frame, callback: Callback);

    /// Type name used in diagnostics.
    fn handler_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Receiver of outbound frames.
pub trait OutgoingFrames {
    /// Handle a frame travelling toward the network.
    ///
    /// `batch` is a hint that flushing may be deferred.
    fn send_frame(&mut self, frame: Frame, callback: Callback, batch: bool);

    /// Type name used in diagnostics.
    fn handler_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Connection-scoped operations an extension may need from its session.
pub trait SessionContext: Send + Sync {
    /// Which side of the connection the session runs on.
    fn behavior(&self) -> Behavior;

    /// Tear the connection down after an unrecoverable extension failure.
    fn abort(&self, cause: &Error);
}

/// Session context shared by every extension of one connection.
pub type SharedSession = Arc<dyn SessionContext>;
