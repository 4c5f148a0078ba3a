//! Process-wide evaluation counters.
//!
//! Incremented at the call site; [`Metrics::flush`] emits every value as
//! one `tracing::info!` event, typically once a run's fixtures finish.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    evaluations_started: AtomicU64,
    evaluations_done: AtomicU64,
    evaluations_errored: AtomicU64,
    attempts_failed: AtomicU64,
    cancellations: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub evaluations_started: u64,
    pub evaluations_done: u64,
    pub evaluations_errored: u64,
    pub attempts_failed: u64,
    pub cancellations: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations_started: AtomicU64::new(0),
            evaluations_done: AtomicU64::new(0),
            evaluations_errored: AtomicU64::new(0),
            attempts_failed: AtomicU64::new(0),
            cancellations: AtomicU64::new(0),
        }
    }

    pub fn inc_started(&self) {
        self.evaluations_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_started", "counter incremented");
    }

    pub fn inc_done(&self) {
        self.evaluations_done.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_done", "counter incremented");
    }

    pub fn inc_errored(&self) {
        self.evaluations_errored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_errored", "counter incremented");
    }

    /// One failed or timed-out service attempt, retried or not.
    pub fn inc_attempts_failed(&self) {
        self.attempts_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "attempts_failed", "counter incremented");
    }

    pub fn inc_cancellations(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cancellations", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            evaluations_started: self.evaluations_started.load(Ordering::Relaxed),
            evaluations_done: self.evaluations_done.load(Ordering::Relaxed),
            evaluations_errored: self.evaluations_errored.load(Ordering::Relaxed),
            attempts_failed: self.attempts_failed.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            evaluations_started = s.evaluations_started,
            evaluations_done = s.evaluations_done,
            evaluations_errored = s.evaluations_errored,
            attempts_failed = s.attempts_failed,
            cancellations = s.cancellations,
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.evaluations_started.store(0, Ordering::Relaxed);
        self.evaluations_done.store(0, Ordering::Relaxed);
        self.evaluations_errored.store(0, Ordering::Relaxed);
        self.attempts_failed.store(0, Ordering::Relaxed);
        self.cancellations.store(0, Ordering::Relaxed);
    }
}
