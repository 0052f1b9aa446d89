//! Recording sinks and sessions shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::extensions::{Extension, ExtensionConfig, RsvBits};
use crate::protocol::Frame;
use crate::session::{
    Behavior, Callback, IncomingFrames, OutgoingFrames, SessionContext, SharedSession,
};

#[derive(Default)]
struct Record {
    entries: Vec<String>,
    frames: Vec<Frame>,
    batches: Vec<bool>,
    sessions: usize,
}

/// Shared log of everything that happened along a chain.
#[derive(Clone, Default)]
pub struct Journal {
    record: Arc<Mutex<Record>>,
}

impl Journal {
    fn with<T>(&self, f: impl FnOnce(&mut Record) -> T) -> T {
        f(&mut self.record.lock().unwrap())
    }

    pub fn log(&self, entry: String) {
        self.with(|r| r.entries.push(entry));
    }

    /// Visit log so far, clearing it.
    pub fn take(&self) -> Vec<String> {
        self.with(|r| std::mem::take(&mut r.entries))
    }

    pub fn entries(&self) -> Vec<String> {
        self.with(|r| r.entries.clone())
    }

    /// Frames that reached a session sink.
    pub fn frames(&self) -> Vec<Frame> {
        self.with(|r| r.frames.clone())
    }

    /// Batch hints seen by the outgoing sink.
    pub fn batches(&self) -> Vec<bool> {
        self.with(|r| r.batches.clone())
    }

    /// Number of `set_session` calls on traced extensions.
    pub fn sessions(&self) -> usize {
        self.with(|r| r.sessions)
    }

    /// Callback whose outcome can be inspected afterwards.
    pub fn callback(&self, label: &'static str) -> (Callback, Outcome) {
        let outcome = Outcome::default();
        let slot = outcome.clone();
        let callback = Callback::new(move |result| {
            tracing::trace!(label, ?result, "test callback completed");
            *slot.slot.lock().unwrap() = Some(result);
        });
        (callback, outcome)
    }
}

#[derive(Clone, Default)]
pub struct Outcome {
    slot: Arc<Mutex<Option<Result<()>>>>,
}

impl Outcome {
    pub fn take(&self) -> Option<Result<()>> {
        self.slot.lock().unwrap().take()
    }
}

/// Terminal inbound sink that records and succeeds every frame.
pub struct RecordingIncoming {
    journal: Journal,
}

impl RecordingIncoming {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl IncomingFrames for RecordingIncoming {
    fn on_frame(&mut self, frame: Frame, callback: Callback) {
        self.journal.with(|r| {
            r.entries.push("session:in".to_string());
            r.frames.push(frame);
        });
        callback.succeeded();
    }
}

/// Terminal outbound sink that records every frame.
pub struct RecordingOutgoing {
    journal: Journal,
    fail_at: Option<usize>,
    seen: usize,
}

impl RecordingOutgoing {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail_at: None,
            seen: 0,
        }
    }

    /// Sink that fails the callback of the frame at `index`.
    pub fn failing(journal: Journal, index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Self::new(journal)
        }
    }
}

impl OutgoingFrames for RecordingOutgoing {
    fn send_frame(&mut self, frame: Frame, callback: Callback, batch: bool) {
        let index = self.seen;
        self.seen += 1;
        self.journal.with(|r| {
            r.entries.push("session:out".to_string());
            r.frames.push(frame);
            r.batches.push(batch);
        });
        if self.fail_at == Some(index) {
            callback.failed(Error::Extension(format!("frame {} rejected", index)));
        } else {
            callback.succeeded();
        }
    }
}

/// Session context counting aborts.
pub struct TestSession {
    behavior: Behavior,
    aborts: AtomicUsize,
}

impl TestSession {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            aborts: AtomicUsize::new(0),
        })
    }

    pub fn shared(behavior: Behavior) -> SharedSession {
        Self::new(behavior)
    }

    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

impl SessionContext for TestSession {
    fn behavior(&self) -> Behavior {
        self.behavior
    }

    fn abort(&self, _cause: &Error) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Pass-through extension that logs `<name>:in` / `<name>:out` visits.
pub struct TracingExtension {
    config: ExtensionConfig,
    rsv: RsvBits,
    journal: Journal,
}

impl TracingExtension {
    pub fn new(config: ExtensionConfig, rsv: RsvBits, journal: Journal) -> Self {
        Self {
            config,
            rsv,
            journal,
        }
    }
}

impl Extension for TracingExtension {
    fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    fn rsv_bits(&self) -> RsvBits {
        self.rsv
    }

    fn set_session(&mut self, _session: SharedSession) {
        self.journal.with(|r| r.sessions += 1);
    }

    fn on_frame(&self, frame: Frame, callback: Callback, next: &mut dyn IncomingFrames) {
        self.journal.log(format!("{}:in", self.config.name));
        next.on_frame(frame, callback);
    }

    fn send_frame(
        &self,
        frame: Frame,
        callback: Callback,
        batch: bool,
        next: &mut dyn OutgoingFrames,
    ) {
        self.journal.log(format!("{}:out", self.config.name));
        next.send_frame(frame, callback, batch);
    }
}
