//! Session-side endpoints for extension stacks under test.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use tokio::sync::mpsc;
use wspipe::extensions::ExtensionConfig;
use wspipe::session::SharedSession;
use wspipe::{
    Behavior, Callback, Error, Extension, ExtensionRegistry, ExtensionStack, Frame,
    IncomingFrames, OpCode, OutgoingFrames, RsvBits, SessionContext,
};

/// Frames that reached a session sink.
#[derive(Clone, Default)]
pub struct Delivered {
    frames: Arc<Mutex<Vec<Frame>>>,
}

impl Delivered {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, frame: Frame) {
        self.frames.lock().unwrap().push(frame);
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.frames.lock().unwrap().clone()
    }

    /// Drain delivered frames.
    pub fn take(&self) -> Vec<Frame> {
        std::mem::take(&mut *self.frames.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    /// Concatenated payloads of every delivered frame.
    pub fn payload(&self) -> Vec<u8> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .flat_map(|f| f.payload().to_vec())
            .collect()
    }
}

/// Inbound sink that collects frames and succeeds their callbacks.
pub struct CollectingIncoming {
    delivered: Delivered,
}

impl CollectingIncoming {
    pub fn new(delivered: Delivered) -> Self {
        Self { delivered }
    }
}

impl IncomingFrames for CollectingIncoming {
    fn on_frame(&mut self, frame: Frame, callback: Callback) {
        self.delivered.push(frame);
        callback.succeeded();
    }
}

/// Outbound sink that collects frames and succeeds their callbacks.
pub struct CollectingOutgoing {
    delivered: Delivered,
}

impl CollectingOutgoing {
    pub fn new(delivered: Delivered) -> Self {
        Self { delivered }
    }
}

impl OutgoingFrames for CollectingOutgoing {
    fn send_frame(&mut self, frame: Frame, callback: Callback, _batch: bool) {
        self.delivered.push(frame);
        callback.succeeded();
    }
}

/// Inbound sink that answers pings with pongs sent back through the stack.
///
/// Other frames are collected. The stack is attached after it is shared.
pub struct AnsweringIncoming {
    stack: Arc<OnceLock<Weak<ExtensionStack>>>,
    delivered: Delivered,
}

impl AnsweringIncoming {
    pub fn new(delivered: Delivered) -> (Self, Arc<OnceLock<Weak<ExtensionStack>>>) {
        let stack = Arc::new(OnceLock::new());
        let sink = Self {
            stack: Arc::clone(&stack),
            delivered,
        };
        (sink, stack)
    }
}

impl IncomingFrames for AnsweringIncoming {
    fn on_frame(&mut self, frame: Frame, callback: Callback) {
        if frame.opcode != OpCode::Ping {
            self.delivered.push(frame);
            callback.succeeded();
            return;
        }
        match self.stack.get().and_then(Weak::upgrade) {
            Some(stack) => {
                let pong = Frame::pong(frame.into_payload());
                if let Err(err) = stack.send_frame(pong, callback, false) {
                    panic!("pong rejected: {}", err);
                }
            }
            None => callback.failed(Error::Io("stack detached".into())),
        }
    }
}

/// Outbound sink handing frames to a writer task that completes them later.
pub struct ChannelOutgoing {
    tx: mpsc::UnboundedSender<(Frame, Callback)>,
}

impl ChannelOutgoing {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(Frame, Callback)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutgoingFrames for ChannelOutgoing {
    fn send_frame(&mut self, frame: Frame, callback: Callback, _batch: bool) {
        if let Err(mpsc::error::SendError((_, callback))) = self.tx.send((frame, callback)) {
            callback.failed(Error::Io("writer closed".into()));
        }
    }
}

/// Session context with a fixed behavior that remembers aborts.
pub struct StaticSession {
    behavior: Behavior,
    aborted: AtomicBool,
}

impl StaticSession {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            aborted: AtomicBool::new(false),
        })
    }

    pub fn shared(behavior: Behavior) -> SharedSession {
        Self::new(behavior)
    }

    pub fn was_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

impl SessionContext for StaticSession {
    fn behavior(&self) -> Behavior {
        self.behavior
    }

    fn abort(&self, _cause: &Error) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

/// Pass-through extension claiming a configurable set of reserved bits.
pub struct MarkerExtension {
    config: ExtensionConfig,
    rsv: RsvBits,
}

impl Extension for MarkerExtension {
    fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    fn rsv_bits(&self) -> RsvBits {
        self.rsv
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
        next.send_frame(frame, callback, batch);
    }
}

/// Registry of marker extensions, one per `(name, rsv)` entry.
pub fn marker_registry(entries: &[(String, RsvBits)]) -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();
    for (name, rsv) in entries {
        let rsv = *rsv;
        registry.register(name.clone(), move |_, config| {
            Ok(Box::new(MarkerExtension {
                config: config.clone(),
                rsv,
            }))
        });
    }
    registry
}
