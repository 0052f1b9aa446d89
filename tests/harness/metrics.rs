//! Metrics collection for concurrency testing.
//!
//! Provides atomic counters for frame throughput and callback outcomes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct Counters {
    frames_sent: AtomicUsize,
    frames_received: AtomicUsize,
    bytes: AtomicUsize,
    completions: AtomicUsize,
    failures: AtomicUsize,
}

/// Cloneable handle to shared counters.
#[derive(Clone, Default)]
pub struct Metrics {
    counters: Arc<Counters>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame_sent(&self, bytes: usize) {
        self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_frame_received(&self, bytes: usize) {
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_completion(&self, ok: bool) {
        if ok {
            self.counters.completions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn frames_sent(&self) -> usize {
        self.counters.frames_sent.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> usize {
        self.counters.frames_received.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> usize {
        self.counters.bytes.load(Ordering::Relaxed)
    }

    pub fn completions(&self) -> usize {
        self.counters.completions.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> usize {
        self.counters.failures.load(Ordering::Relaxed)
    }
}
