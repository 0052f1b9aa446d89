//! Outbound fragmentation of large data frames.

use tracing::trace;

use crate::error::{Error, Result};
use crate::extensions::{Extension, ExtensionConfig};
use crate::protocol::{Frame, OpCode};
use crate::session::{Callback, IncomingFrames, OutgoingFrames};

const MAX_LENGTH: &str = "maxLength";

/// Splits outbound data frames into payloads of at most `maxLength` bytes.
///
/// The first fragment keeps the opcode and reserved bits of the original
/// frame, the following ones are continuations. Only the last fragment
/// carries the original `fin`. Control frames and inbound frames pass
/// through untouched.
#[derive(Debug, Clone)]
pub struct FragmentExtension {
    config: ExtensionConfig,
    max_length: usize,
}

impl FragmentExtension {
    /// Registered extension name.
    pub const NAME: &'static str = "fragment";

    /// Create an instance from `fragment; maxLength=<n>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] if `maxLength` is missing, not a
    /// positive integer, or if any other parameter is present.
    pub fn from_config(config: ExtensionConfig) -> Result<Self> {
        if let Some(unknown) = config.params.iter().find(|p| p.name != MAX_LENGTH) {
            return Err(Error::InvalidExtension(format!(
                "unknown fragment parameter '{}'",
                unknown.name
            )));
        }

        let max_length = config
            .param_value(MAX_LENGTH)
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .ok_or_else(|| {
                Error::InvalidExtension(format!(
                    "fragment requires a positive {}, got '{}'",
                    MAX_LENGTH, config
                ))
            })?;

        Ok(Self { config, max_length })
    }

    /// Largest payload a single outbound fragment carries.
    #[must_use]
    pub const fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Extension for FragmentExtension {
    fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    fn on_frame(&self, frame: Frame, callback: Callback, next: &mut dyn IncomingFrames) {
        next.on_frame(frame, callback);
    }

    fn send_frame(
        &self,
        frame: Frame,
        callback: Callback,
        batch: bool,
        next: &mut dyn OutgoingFrames,
    ) {
        let len = frame.payload_len();
        if frame.opcode.is_control() || len <= self.max_length {
            next.send_frame(frame, callback, batch);
            return;
        }

        let count = len.div_ceil(self.max_length);
        trace!(len, count, max_length = self.max_length, "fragmenting frame");

        let payload = frame.payload().clone();
        let parts = callback.split(count);
        for (index, part) in parts.into_iter().enumerate() {
            let start = index * self.max_length;
            let end = (start + self.max_length).min(len);
            let last = index + 1 == count;

            let mut fragment = frame.with_payload(payload.slice(start..end));
            fragment.fin = last && frame.fin;
            if index > 0 {
                fragment.opcode = OpCode::Continuation;
                fragment.rsv1 = false;
                fragment.rsv2 = false;
                fragment.rsv3 = false;
            }
            next.send_frame(fragment, part, batch || !last);
        }
    }
}
