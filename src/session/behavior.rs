//! Which side of a WebSocket connection a pipeline runs on.

/// Connection behavior.
///
/// Decides how extension instantiation failures are attributed during
/// negotiation, and which context-takeover parameters apply to each
/// direction of a compression extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Behavior {
    /// Client side - sends offers, receives the negotiated response.
    Client,
    /// Server side - receives offers, picks the negotiated response.
    Server,
}

impl Behavior {
    /// Check if this is the server side.
    #[inline]
    #[must_use]
    pub const fn is_server(&self) -> bool {
        matches!(self, Behavior::Server)
    }
}

impl std::fmt::Display for Behavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Behavior::Client => write!(f, "CLIENT"),
            Behavior::Server => write!(f, "SERVER"),
        }
    }
}
