//! Lifecycle of an extension stack.

/// Extension stack lifecycle state.
///
/// `Empty → Negotiated → Active`. Frames can only be forwarded once the
/// session's endpoints have been spliced onto the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum StackState {
    /// Nothing negotiated yet.
    #[default]
    Empty,
    /// Extensions chosen, chain not yet connected to the session.
    Negotiated,
    /// Chain connected to the session; frames flow.
    Active,
}

impl StackState {
    /// Check if `negotiate` may run in this state.
    ///
    /// Returns `true` for `Empty` or `Negotiated`.
    #[must_use]
    #[inline]
    pub const fn can_negotiate(&self) -> bool {
        !matches!(self, StackState::Active)
    }

    /// Check if `initialize` may run in this state.
    #[must_use]
    #[inline]
    pub const fn can_initialize(&self) -> bool {
        matches!(self, StackState::Negotiated)
    }

    /// Check if frames may be forwarded in this state.
    #[must_use]
    #[inline]
    pub const fn can_forward(&self) -> bool {
        matches!(self, StackState::Active)
    }
}

impl std::fmt::Display for StackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackState::Empty => write!(f, "Empty"),
            StackState::Negotiated => write!(f, "Negotiated"),
            StackState::Active => write!(f, "Active"),
        }
    }
}
