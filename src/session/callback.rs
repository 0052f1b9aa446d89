//! Exactly-once completion for frame handoffs.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};

type Completion = Box<dyn FnOnce(Result<()>) + Send>;

/// Completion handle passed along with every frame.
///
/// Whoever holds the callback must complete it exactly once. Completing
/// consumes the handle, and a callback dropped without completion fails with
/// [`Error::CallbackAbandoned`], so the upstream side is never left waiting.
pub struct Callback {
    completion: Option<Completion>,
}

impl Callback {
    /// Create a callback from a completion closure.
    pub fn new(f: impl FnOnce(Result<()>) + Send + 'static) -> Self {
        Self {
            completion: Some(Box::new(f)),
        }
    }

    /// A callback that ignores its outcome.
    #[must_use]
    pub fn noop() -> Self {
        Self { completion: None }
    }

    /// Create a callback whose outcome is delivered through a oneshot channel.
    #[cfg(feature = "async-tokio")]
    #[must_use]
    pub fn channel() -> (Self, tokio::sync::oneshot::Receiver<Result<()>>) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let callback = Self::new(move |result| {
            // Receiver gone means nobody is waiting anymore.
            let _ = tx.send(result);
        });
        (callback, rx)
    }

    /// Complete successfully.
    pub fn succeeded(self) {
        self.complete(Ok(()));
    }

    /// Complete with a failure.
    pub fn failed(self, err: Error) {
        self.complete(Err(err));
    }

    /// Complete with the given outcome.
    pub fn complete(mut self, result: Result<()>) {
        if let Some(completion) = self.completion.take() {
            completion(result);
        }
    }

    /// Split into `parts` callbacks that complete this one together.
    ///
    /// The original succeeds once every part succeeded, or fails with the
    /// first part failure. Later outcomes are ignored. Zero parts complete the
    /// original immediately.
    #[must_use]
    pub fn split(self, parts: usize) -> Vec<Callback> {
        if parts == 0 {
            self.succeeded();
            return Vec::new();
        }
        if parts == 1 {
            return vec![self];
        }

        let shared = Arc::new(SplitState {
            pending: AtomicUsize::new(parts),
            parent: Mutex::new(Some(self)),
        });

        (0..parts)
            .map(|_| {
                let shared = Arc::clone(&shared);
                Callback::new(move |result| shared.part_done(result))
            })
            .collect()
    }
}

struct SplitState {
    pending: AtomicUsize,
    parent: Mutex<Option<Callback>>,
}

impl SplitState {
    fn part_done(&self, result: Result<()>) {
        match result {
            Err(err) => {
                if let Some(parent) = self.take_parent() {
                    parent.failed(err);
                }
            }
            Ok(()) => {
                if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                    if let Some(parent) = self.take_parent() {
                        parent.succeeded();
                    }
                }
            }
        }
    }

    fn take_parent(&self) -> Option<Callback> {
        self.parent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for Callback {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            tracing::warn!("frame callback dropped without completion");
            completion(Err(Error::CallbackAbandoned));
        }
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("pending", &self.completion.is_some())
            .finish()
    }
}
