//! Engine-wide counters. Only atomics; never reset during a run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::types::CounterSnapshot;

#[derive(Debug, Default)]
pub struct EngineCounters {
    dispatched: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    errors_ignored: AtomicU64,
    skipped: AtomicU64,
    in_flight: AtomicU64,
    hard_timeouts: AtomicU64,
    latency_total_us: AtomicU64,
}

impl EngineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a worker call as started.
    pub(crate) fn call_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark a worker call as finished and account its outcome and latency.
    pub(crate) fn call_finished(&self, success: bool, latency: Duration) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.latency_total_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_hard_timeout(&self) {
        self.hard_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored_error(&self) {
        self.errors_ignored.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            errors_ignored: self.errors_ignored.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            hard_timeouts: self.hard_timeouts.load(Ordering::Relaxed),
            latency_total_us: self.latency_total_us.load(Ordering::Relaxed),
        }
    }
}
