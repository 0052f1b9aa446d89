//! Error types for buffer accumulation and extension negotiation.
//!
//! Negotiation faults are split by who is to blame: the remote party
//! ([`Error::MalformedRequest`], [`Error::MalformedResponse`]) or the local
//! side ([`Error::Negotiation`]). Lifecycle misuse is reported as
//! [`Error::InvalidState`].

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating extensions or processing frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The client offered an extension configuration the server cannot instantiate.
    #[error("Malformed request: could not instantiate offered extension '{extension}': {source}")]
    MalformedRequest {
        /// Parameterized name of the failing extension.
        extension: String,
        /// Instantiation failure.
        source: Box<Error>,
    },

    /// The server responded with an extension configuration the client never offered.
    #[error(
        "Malformed response: could not instantiate negotiated extension '{extension}': {source}"
    )]
    MalformedResponse {
        /// Parameterized name of the failing extension.
        extension: String,
        /// Instantiation failure.
        source: Box<Error>,
    },

    /// The local side accepted an extension configuration it cannot honor.
    #[error("Extension negotiation failed for '{extension}': {source}")]
    Negotiation {
        /// Parameterized name of the failing extension.
        extension: String,
        /// Instantiation failure.
        source: Box<Error>,
    },

    /// An operation was called out of lifecycle order.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid extension configuration or parameters.
    #[error("Invalid extension: {0}")]
    InvalidExtension(String),

    /// Extension failed while transforming a frame.
    #[error("Extension error: {0}")]
    Extension(String),

    /// A frame completion callback was dropped without being completed.
    #[error("Frame callback dropped without completion")]
    CallbackAbandoned,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// HTTP status a handshake should answer with when negotiation fails.
    ///
    /// Remote faults map to `400 Bad Request`, local faults to
    /// `500 Internal Server Error`. Other errors are not handshake related.
    #[must_use]
    pub const fn http_status(&self) -> Option<u16> {
        match self {
            Error::MalformedRequest { .. } | Error::MalformedResponse { .. } => Some(400),
            Error::Negotiation { .. } => Some(500),
            _ => None,
        }
    }

    /// Check if this error blames the remote peer.
    #[must_use]
    pub const fn is_remote_fault(&self) -> bool {
        matches!(
            self,
            Error::MalformedRequest { .. } | Error::MalformedResponse { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
