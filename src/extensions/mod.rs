//! WebSocket Extension Framework (RFC 6455 Section 9).
//!
//! Extensions are negotiated per connection and linked into a bidirectional
//! chain by [`ExtensionStack`]. Outbound frames visit extensions in negotiated
//! order before reaching the network; inbound frames visit them in reverse
//! order before reaching the application.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wspipe::extensions::{ExtensionConfig, ExtensionRegistry, ExtensionResources, ExtensionStack};
//! use wspipe::session::Behavior;
//!
//! let registry = Arc::new(ExtensionRegistry::with_defaults());
//! let mut stack = ExtensionStack::new(registry, Behavior::Server);
//!
//! let offered = ExtensionConfig::parse_header("fragment; maxLength=1024, identity")?;
//! stack.negotiate(&ExtensionResources::default(), &offered, &offered)?;
//! stack.initialize(session_incoming, session_outgoing, session)?;
//!
//! stack.send_frame(Frame::text("hello"), Callback::noop(), false)?;
//! ```

#[cfg(feature = "compression")]
pub mod deflate;
pub mod fragment;
pub mod identity;
pub mod registry;
pub mod stack;
mod state;
pub mod validation;

pub use registry::{ExtensionFactory, ExtensionRegistry, ExtensionResources};
pub use stack::{ChainEndpoint, ExtensionStack};
pub use state::StackState;

use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::session::{Callback, IncomingFrames, OutgoingFrames, SharedSession};
use std::fmt;

/// Prefix marking internal extensions that are never advertised to the peer.
pub const INTERNAL_PREFIX: char = '@';

/// Represents a single extension parameter.
///
/// Extension parameters follow the format: `name; param1=value1; param2`
/// For example: `permessage-deflate; client_max_window_bits=15; server_no_context_takeover`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionParam {
    /// Parameter name (e.g., "client_max_window_bits").
    pub name: String,
    /// Optional parameter value. None for boolean parameters.
    pub value: Option<String>,
}

impl ExtensionParam {
    /// Create a new parameter with a value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Create a boolean/flag parameter (no value).
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Parse a single parameter from a string (e.g., "param=value" or "param").
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        match s.split_once('=') {
            Some((name, value)) => Self::new(name.trim(), value.trim().trim_matches('"')),
            None => Self::flag(s),
        }
    }
}

impl fmt::Display for ExtensionParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// An extension name plus its ordered parameters.
///
/// Used both for what a client offers and for what a server negotiates,
/// e.g. `permessage-deflate; client_max_window_bits=15`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionConfig {
    /// Extension name (e.g., "permessage-deflate").
    pub name: String,
    /// Extension parameters in header order.
    pub params: Vec<ExtensionParam>,
}

impl ExtensionConfig {
    /// Create a config with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Create a config with parameters.
    pub fn with_params(name: impl Into<String>, params: Vec<ExtensionParam>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Append a parameter.
    #[must_use]
    pub fn param(mut self, param: ExtensionParam) -> Self {
        self.params.push(param);
        self
    }

    /// Parse a single extension config from a string.
    ///
    /// Format: `extension-name; param1=value1; param2`
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] if the extension name is empty.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(';');
        let name = parts.next().unwrap_or_default().trim();

        if name.is_empty() {
            return Err(Error::InvalidExtension("Empty extension name".into()));
        }

        let params = parts
            .filter(|p| !p.trim().is_empty())
            .map(ExtensionParam::parse)
            .collect();

        Ok(Self::with_params(name, params))
    }

    /// Parse a `Sec-WebSocket-Extensions` header value.
    ///
    /// Extensions are comma-separated, parameters are semicolon-separated.
    /// An empty header yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidExtension`] if any entry has an empty name.
    pub fn parse_header(header: &str) -> Result<Vec<Self>> {
        if header.trim().is_empty() {
            return Ok(Vec::new());
        }
        header.split(',').map(|s| Self::parse(s.trim())).collect()
    }

    /// Render a list of configs as a `Sec-WebSocket-Extensions` header value.
    pub fn to_header(configs: &[ExtensionConfig]) -> String {
        configs
            .iter()
            .map(ExtensionConfig::parameterized_name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Name together with parameters, the identity used to match offers.
    pub fn parameterized_name(&self) -> String {
        self.to_string()
    }

    /// Get a parameter by name.
    pub fn get_param(&self, name: &str) -> Option<&ExtensionParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Get a parameter's value by name.
    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.get_param(name).and_then(|p| p.value.as_deref())
    }

    /// Check if a parameter is present.
    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    /// Check if this names an internal extension.
    pub fn is_internal(&self) -> bool {
        self.name.starts_with(INTERNAL_PREFIX)
    }
}

impl fmt::Display for ExtensionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for param in &self.params {
            write!(f, "; {}", param)?;
        }
        Ok(())
    }
}

/// RSV bit usage declaration for extensions.
///
/// Each reserved bit may be claimed by at most one active extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RsvBits {
    /// Extension uses RSV1 bit (e.g., permessage-deflate).
    pub rsv1: bool,
    /// Extension uses RSV2 bit.
    pub rsv2: bool,
    /// Extension uses RSV3 bit.
    pub rsv3: bool,
}

impl RsvBits {
    /// No RSV bits used.
    pub const NONE: Self = Self {
        rsv1: false,
        rsv2: false,
        rsv3: false,
    };

    /// RSV1 only (used by permessage-deflate).
    pub const RSV1: Self = Self {
        rsv1: true,
        rsv2: false,
        rsv3: false,
    };

    /// RSV2 only.
    pub const RSV2: Self = Self {
        rsv1: false,
        rsv2: true,
        rsv3: false,
    };

    /// RSV3 only.
    pub const RSV3: Self = Self {
        rsv1: false,
        rsv2: false,
        rsv3: true,
    };

    /// Bits indexed by position: `[rsv1, rsv2, rsv3]`.
    #[must_use]
    pub const fn as_array(&self) -> [bool; 3] {
        [self.rsv1, self.rsv2, self.rsv3]
    }

    /// Check if any bits conflict with another RsvBits declaration.
    #[must_use]
    pub const fn conflicts_with(&self, other: &RsvBits) -> bool {
        (self.rsv1 && other.rsv1) || (self.rsv2 && other.rsv2) || (self.rsv3 && other.rsv3)
    }

    /// Bits set in either declaration.
    #[must_use]
    pub const fn union(&self, other: &RsvBits) -> RsvBits {
        RsvBits {
            rsv1: self.rsv1 || other.rsv1,
            rsv2: self.rsv2 || other.rsv2,
            rsv3: self.rsv3 || other.rsv3,
        }
    }

    /// Check if no bit is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !(self.rsv1 || self.rsv2 || self.rsv3)
    }
}

impl fmt::Display for RsvBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = ["rsv1", "rsv2", "rsv3"];
        let set: Vec<&str> = self
            .as_array()
            .iter()
            .zip(names)
            .filter_map(|(&on, name)| on.then_some(name))
            .collect();
        write!(f, "[{}]", set.join(","))
    }
}

/// A negotiated, per-connection frame transformer.
///
/// An extension sits between two neighbours in each direction. It receives a
/// frame plus its callback and either forwards (possibly transformed, split or
/// merged) frames to `next`, or completes the callback itself. Every callback
/// it receives must end up completed exactly once.
///
/// `on_frame` and `send_frame` run concurrently on the same instance, one
/// call per direction at a time. State belonging to one direction is kept
/// apart from the other's so neither blocks the other.
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct Passthrough {
///     config: ExtensionConfig,
/// }
///
/// impl Extension for Passthrough {
///     fn config(&self) -> &ExtensionConfig { &self.config }
///
///     fn on_frame(&self, frame: Frame, callback: Callback, next: &mut dyn IncomingFrames) {
///         next.on_frame(frame, callback)
///     }
///
///     fn send_frame(&self, frame: Frame, callback: Callback, batch: bool, next: &mut dyn OutgoingFrames) {
///         next.send_frame(frame, callback, batch)
///     }
/// }
/// ```
pub trait Extension: Send + Sync {
    /// Extension name as used in the Sec-WebSocket-Extensions header.
    fn name(&self) -> &str {
        &self.config().name
    }

    /// The configuration this instance was created from.
    fn config(&self) -> &ExtensionConfig;

    /// Reserved bits this extension uses.
    fn rsv_bits(&self) -> RsvBits {
        RsvBits::NONE
    }

    /// Receive the connection's session context once the chain is complete.
    fn set_session(&mut self, _session: SharedSession) {}

    /// Handle an inbound frame and pass the result toward the application.
    fn on_frame(&self, frame: Frame, callback: Callback, next: &mut dyn IncomingFrames);

    /// Handle an outbound frame and pass the result toward the network.
    fn send_frame(
        &self,
        frame: Frame,
        callback: Callback,
        batch: bool,
        next: &mut dyn OutgoingFrames,
    );

    /// Type name used in diagnostics.
    fn handler_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl fmt::Debug for dyn Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name())
            .field("rsv_bits", &self.rsv_bits())
            .field("config", &self.config().to_string())
            .finish()
    }
}
