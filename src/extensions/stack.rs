//! The negotiated extension chain of one connection.
//!
//! Negotiated extensions are kept in a single ordered list. Instead of linking
//! each extension to its neighbours, the two traversal orders are computed
//! from the list: outbound frames walk it front to back and end at the
//! session's outgoing sink, inbound frames walk it back to front and end at
//! the session's incoming sink.
//!
//! Each direction has its own lane. A receive and a send may run at the same
//! time on different threads, and the session's incoming sink may send (a
//! pong, a close echo) while the inbound frame is still being handled.

use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extensions::{
    Extension, ExtensionConfig, ExtensionRegistry, ExtensionResources, RsvBits, StackState,
};
use crate::protocol::Frame;
use crate::session::{Behavior, Callback, IncomingFrames, OutgoingFrames, SharedSession};

const NULL: &str = "<null>";

type IncomingLane = Mutex<Box<dyn IncomingFrames + Send>>;
type OutgoingLane = Mutex<Box<dyn OutgoingFrames + Send>>;

/// The session's terminal sinks, spliced onto the chain ends by `initialize`.
///
/// A lane is held for the whole traversal of a frame in its direction, which
/// keeps frames of that direction in order.
struct SessionEndpoints {
    incoming: IncomingLane,
    outgoing: OutgoingLane,
    incoming_handler: &'static str,
    outgoing_handler: &'static str,
}

fn enter<T: ?Sized>(lane: &Mutex<Box<T>>) -> MutexGuard<'_, Box<T>> {
    lane.lock().unwrap_or_else(PoisonError::into_inner)
}

/// First handler a frame reaches when entering the stack in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEndpoint<'a> {
    /// A negotiated extension.
    Extension {
        /// Extension name.
        name: &'a str,
        /// Implementing type.
        handler: &'static str,
    },
    /// The session sink itself (no extensions negotiated).
    Session {
        /// Implementing type.
        handler: &'static str,
    },
}

impl ChainEndpoint<'_> {
    /// Type name of the handler.
    #[must_use]
    pub const fn handler_name(&self) -> &'static str {
        match self {
            ChainEndpoint::Extension { handler, .. } | ChainEndpoint::Session { handler } => {
                handler
            }
        }
    }

    fn of(extension: &dyn Extension) -> ChainEndpoint<'_> {
        ChainEndpoint::Extension {
            name: extension.name(),
            handler: extension.handler_name(),
        }
    }
}

impl fmt::Display for ChainEndpoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.handler_name())
    }
}

/// Inbound view of the chain: the remaining extensions, last one first.
struct IncomingChain<'a> {
    extensions: &'a [Box<dyn Extension>],
    session: &'a mut dyn IncomingFrames,
}

impl IncomingFrames for IncomingChain<'_> {
    fn on_frame(&mut self, frame: Frame, callback: Callback) {
        match self.extensions.split_last() {
            Some((extension, rest)) => {
                let mut next = IncomingChain {
                    extensions: rest,
                    session: &mut *self.session,
                };
                extension.on_frame(frame, callback, &mut next);
            }
            None => self.session.on_frame(frame, callback),
        }
    }
}

/// Outbound view of the chain: the remaining extensions, first one first.
struct OutgoingChain<'a> {
    extensions: &'a [Box<dyn Extension>],
    session: &'a mut dyn OutgoingFrames,
}

impl OutgoingFrames for OutgoingChain<'_> {
    fn send_frame(&mut self, frame: Frame, callback: Callback, batch: bool) {
        match self.extensions.split_first() {
            Some((extension, rest)) => {
                let mut next = OutgoingChain {
                    extensions: rest,
                    session: &mut *self.session,
                };
                extension.send_frame(frame, callback, batch, &mut next);
            }
            None => self.session.send_frame(frame, callback, batch),
        }
    }
}

/// Negotiates and runs the extension chain of one connection.
///
/// Lifecycle: [`negotiate`](Self::negotiate) picks the active extensions,
/// [`initialize`](Self::initialize) connects the chain ends to the session,
/// after which [`on_frame`](Self::on_frame) and
/// [`send_frame`](Self::send_frame) forward traffic.
///
/// Once initialized the stack is shared by reference (typically in an
/// `Arc`): `on_frame` and `send_frame` take `&self` and may be called
/// concurrently from different threads. Calls in the same direction are
/// serialized, so a direction must not be re-entered from its own sink.
pub struct ExtensionStack {
    registry: Arc<ExtensionRegistry>,
    behavior: Behavior,
    extensions: Option<Vec<Box<dyn Extension>>>,
    endpoints: Option<SessionEndpoints>,
}

impl ExtensionStack {
    /// Create an empty stack.
    #[must_use]
    pub fn new(registry: Arc<ExtensionRegistry>, behavior: Behavior) -> Self {
        Self {
            registry,
            behavior,
            extensions: None,
            endpoints: None,
        }
    }

    /// Create an empty stack using the configured behavior.
    #[must_use]
    pub fn from_config(registry: Arc<ExtensionRegistry>, config: &Config) -> Self {
        Self::new(registry, config.behavior)
    }

    /// Which side of the connection this stack runs on.
    #[must_use]
    pub const fn behavior(&self) -> Behavior {
        self.behavior
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StackState {
        match (&self.extensions, &self.endpoints) {
            (_, Some(_)) => StackState::Active,
            (Some(_), None) => StackState::Negotiated,
            (None, None) => StackState::Empty,
        }
    }

    /// Accepted extensions in negotiated order, `None` before negotiation.
    #[must_use]
    pub fn extensions(&self) -> Option<&[Box<dyn Extension>]> {
        self.extensions.as_deref()
    }

    /// Check if negotiation accepted at least one extension.
    #[must_use]
    pub fn has_negotiated_extensions(&self) -> bool {
        self.extensions.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Configs of accepted extensions in negotiated order.
    ///
    /// Internal extensions (names starting with `@`) are left out. Empty
    /// before negotiation.
    #[must_use]
    pub fn negotiated_extensions(&self) -> Vec<ExtensionConfig> {
        self.extensions
            .iter()
            .flatten()
            .filter(|e| !e.config().is_internal())
            .map(|e| e.config().clone())
            .collect()
    }

    /// Perform the extension negotiation.
    ///
    /// `offered` is what the client asked for, `negotiated` what the server
    /// accepted. Each negotiated config is instantiated in order. Unknown
    /// names are skipped, and an extension claiming a reserved bit that an
    /// earlier one already holds is dropped. Both cases are silent.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] once the stack has been initialized
    /// - [`Error::MalformedRequest`], [`Error::MalformedResponse`] or
    ///   [`Error::Negotiation`] if an extension cannot be instantiated; which
    ///   one depends on the behavior and on whether the failing config was
    ///   offered. The previous negotiation result is kept in that case.
    pub fn negotiate(
        &mut self,
        resources: &ExtensionResources,
        offered: &[ExtensionConfig],
        negotiated: &[ExtensionConfig],
    ) -> Result<()> {
        if !self.state().can_negotiate() {
            return Err(Error::InvalidState(
                "cannot negotiate extensions after initialization".into(),
            ));
        }

        debug!(
            behavior = %self.behavior,
            configs = %ExtensionConfig::to_header(negotiated),
            "negotiating extensions"
        );

        let mut accepted: Vec<Box<dyn Extension>> = Vec::new();
        let mut claimed_bits = RsvBits::NONE;
        let mut rsv_claims: [Option<String>; 3] = Default::default();

        for config in negotiated {
            let extension = match self.registry.new_instance(resources, config) {
                Ok(Some(extension)) => extension,
                Ok(None) => {
                    debug!(extension = %config, "extension not available, skipping");
                    continue;
                }
                Err(cause) => return Err(self.instantiation_failure(config, offered, cause)),
            };

            let wanted = extension.rsv_bits();
            if wanted.conflicts_with(&claimed_bits) {
                let (bit, holder) = wanted
                    .as_array()
                    .iter()
                    .zip(&rsv_claims)
                    .enumerate()
                    .find_map(|(bit, (&on, holder))| {
                        holder.as_deref().filter(|_| on).map(|h| (bit + 1, h))
                    })
                    .unwrap_or((0, NULL));
                debug!(
                    "Not adding extension {}. Extension {} already claimed RSV{}",
                    config, holder, bit
                );
                continue;
            }

            for (slot, on) in rsv_claims.iter_mut().zip(wanted.as_array()) {
                if on {
                    *slot = Some(extension.name().to_string());
                }
            }
            claimed_bits = claimed_bits.union(&wanted);

            debug!(extension = %config, "adding extension");
            accepted.push(extension);
        }

        self.extensions = Some(accepted);
        Ok(())
    }

    fn instantiation_failure(
        &self,
        config: &ExtensionConfig,
        offered: &[ExtensionConfig],
        cause: Error,
    ) -> Error {
        let extension = config.parameterized_name();
        let was_offered = offered
            .iter()
            .any(|o| o.parameterized_name() == extension);
        let source = Box::new(cause);

        let err = match (self.behavior.is_server(), was_offered) {
            (true, true) => Error::MalformedRequest { extension, source },
            (false, false) => Error::MalformedResponse { extension, source },
            _ => Error::Negotiation { extension, source },
        };
        debug!(behavior = %self.behavior, error = %err, "extension instantiation failed");
        err
    }

    /// Connect the chain ends to the session.
    ///
    /// With no extensions the session sinks become the stack's entry points
    /// directly. Otherwise outbound frames leave the first extension into
    /// `outgoing` and inbound frames leave the last extension into `incoming`.
    /// Every extension receives `session`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before negotiation or when already
    /// initialized.
    pub fn initialize<I, O>(&mut self, incoming: I, outgoing: O, session: SharedSession) -> Result<()>
    where
        I: IncomingFrames + Send + 'static,
        O: OutgoingFrames + Send + 'static,
    {
        let state = self.state();
        if !state.can_initialize() {
            return Err(Error::InvalidState(format!(
                "cannot initialize extension stack in state {}",
                state
            )));
        }

        for extension in self.extensions.iter_mut().flatten() {
            extension.set_session(Arc::clone(&session));
        }

        self.endpoints = Some(SessionEndpoints {
            incoming_handler: incoming.handler_name(),
            outgoing_handler: outgoing.handler_name(),
            incoming: Mutex::new(Box::new(incoming)),
            outgoing: Mutex::new(Box::new(outgoing)),
        });
        debug!(stack = %self, "extension stack initialized");
        Ok(())
    }

    /// Forward an inbound frame into the chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before initialization; the callback is
    /// failed with the same error. Frame processing errors are reported
    /// through the callback only.
    pub fn on_frame(&self, frame: Frame, callback: Callback) -> Result<()> {
        let Some(endpoints) = self.active_endpoints() else {
            return Err(not_initialized(callback, "receive"));
        };
        let mut session = enter(&endpoints.incoming);
        let mut chain = IncomingChain {
            extensions: self.extensions.as_deref().unwrap_or_default(),
            session: session.as_mut(),
        };
        chain.on_frame(frame, callback);
        Ok(())
    }

    /// Forward an outbound frame into the chain, including the batch hint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before initialization; the callback is
    /// failed with the same error. Frame processing errors are reported
    /// through the callback only.
    pub fn send_frame(&self, frame: Frame, callback: Callback, batch: bool) -> Result<()> {
        let Some(endpoints) = self.active_endpoints() else {
            return Err(not_initialized(callback, "send"));
        };
        trace!(opcode = %frame.opcode, len = frame.payload_len(), batch, "extending out");
        let mut session = enter(&endpoints.outgoing);
        let mut chain = OutgoingChain {
            extensions: self.extensions.as_deref().unwrap_or_default(),
            session: session.as_mut(),
        };
        chain.send_frame(frame, callback, batch);
        Ok(())
    }

    fn active_endpoints(&self) -> Option<&SessionEndpoints> {
        self.endpoints
            .as_ref()
            .filter(|_| self.state().can_forward())
    }

    /// Head of the inbound chain: the last extension, or the session sink.
    #[must_use]
    pub fn next_incoming(&self) -> Option<ChainEndpoint<'_>> {
        match self.extensions.as_deref()?.last() {
            Some(extension) => Some(ChainEndpoint::of(extension.as_ref())),
            None => self.endpoints.as_ref().map(|e| ChainEndpoint::Session {
                handler: e.incoming_handler,
            }),
        }
    }

    /// Head of the outbound chain: the first extension, or the session sink.
    #[must_use]
    pub fn next_outgoing(&self) -> Option<ChainEndpoint<'_>> {
        match self.extensions.as_deref()?.first() {
            Some(extension) => Some(ChainEndpoint::of(extension.as_ref())),
            None => self.endpoints.as_ref().map(|e| ChainEndpoint::Session {
                handler: e.outgoing_handler,
            }),
        }
    }

    /// Extension names in the order an inbound frame visits them.
    #[must_use]
    pub fn incoming_order(&self) -> Vec<&str> {
        self.extensions
            .iter()
            .flatten()
            .rev()
            .map(|e| e.name())
            .collect()
    }

    /// Extension names in the order an outbound frame visits them.
    #[must_use]
    pub fn outgoing_order(&self) -> Vec<&str> {
        self.extensions.iter().flatten().map(|e| e.name()).collect()
    }

    /// Multi-line diagnostic rendering of the stack.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let size = self.extensions.as_ref().map_or(0, Vec::len);
        let _ = writeln!(
            out,
            "ExtensionStack[behavior={},state={},size={}]",
            self.behavior,
            self.state(),
            size
        );
        for extension in self.extensions.iter().flatten() {
            let _ = writeln!(
                out,
                " +- {} {} ({}) rsv={}",
                extension.name(),
                extension.config(),
                extension.handler_name(),
                extension.rsv_bits()
            );
        }
        let _ = writeln!(out, " incoming: {}", endpoint_name(self.next_incoming()));
        let _ = write!(out, " outgoing: {}", endpoint_name(self.next_outgoing()));
        out
    }
}

fn endpoint_name(endpoint: Option<ChainEndpoint<'_>>) -> &'static str {
    endpoint.map_or(NULL, |e| e.handler_name())
}

fn not_initialized(callback: Callback, action: &str) -> Error {
    let err = Error::InvalidState(format!(
        "cannot {} frames before the extension stack is initialized",
        action
    ));
    callback.failed(err.clone());
    err
}

impl fmt::Display for ExtensionStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExtensionStack[extensions=")?;
        match &self.extensions {
            None => f.write_str(NULL)?,
            Some(extensions) => {
                let names: Vec<&str> = extensions.iter().map(|e| e.name()).collect();
                write!(f, "[{}]", names.join(","))?;
            }
        }
        write!(
            f,
            ",incoming={},outgoing={}]",
            endpoint_name(self.next_incoming()),
            endpoint_name(self.next_outgoing())
        )
    }
}

impl fmt::Debug for ExtensionStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionStack")
            .field("behavior", &self.behavior)
            .field("state", &self.state())
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}
