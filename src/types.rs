//! Public and internal types for the blaster engine and pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::engine::fingerprint::Fingerprint;

/// Mapping of named values exchanged with a worker (request payload and response).
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// One input row: ordered field values with the column headers they belong to.
///
/// Headers are shared by every record of a run, so they sit behind an `Arc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub headers: Arc<[String]>,
    pub values: Vec<String>,
}

impl Record {
    pub fn new(headers: Arc<[String]>, values: Vec<String>) -> Self {
        Self { headers, values }
    }

    /// Value of the named field, if the record has that column.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .position(|h| h == name)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    /// Fields as `(header, value)` pairs in column order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.values)
    }
}

/// A record scheduled for execution. Moved from the dispatch loop to exactly one executor.
#[derive(Debug)]
pub struct WorkItem {
    /// Position among dispatched records (0-based; skipped records don't consume a number).
    pub seq: u64,
    pub fingerprint: Fingerprint,
    pub record: Record,
}

/// Result of executing one [`WorkItem`].
#[derive(Debug)]
pub enum Outcome {
    Success { item: WorkItem, response: Payload },
    Failure { item: WorkItem, error: anyhow::Error },
}

/// One row for the result log. Written atomically by the log writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub fields: Vec<String>,
}

/// A target-rate change: from `at` onwards the dispatcher aims for `rate` records/second.
#[derive(Clone, Copy, Debug)]
pub struct RateSegment {
    pub at: Instant,
    pub rate: f64,
}

/// Final report of a run.
#[derive(Debug)]
pub struct Summary {
    pub counters: CounterSnapshot,
    /// First failure of the run; `None` when the run completed or was interrupted cleanly.
    pub fatal_error: Option<anyhow::Error>,
    pub interrupted: bool,
    pub segments: Vec<RateSegment>,
    /// Elapsed-time-weighted mean of the target rate.
    pub average_rate: f64,
    pub elapsed: Duration,
}

/// Point-in-time copy of the engine counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub dispatched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub errors_ignored: u64,
    pub skipped: u64,
    pub in_flight: u64,
    pub hard_timeouts: u64,
    pub latency_total_us: u64,
}

impl CounterSnapshot {
    /// Mean worker call latency over completed calls.
    pub fn mean_latency(&self) -> Option<Duration> {
        let done = self.succeeded + self.failed;
        (done > 0).then(|| Duration::from_micros(self.latency_total_us / done))
    }
}

/// Merged run options (defaults → config file → environment → CLI).
///
/// Validated into an [`EngineConfig`](crate::utils::config::EngineConfig) before anything starts.
#[derive(Clone, Debug, serde::Serialize)]
pub struct Opts {
    /// CSV data file with a header row. Required.
    pub data: Option<PathBuf>,
    /// CSV result log. Also the resume source when `resume` is set.
    pub log: Option<PathBuf>,
    /// Skip records already present in `log`.
    pub resume: bool,
    /// Registered worker key.
    pub worker_type: Option<String>,
    /// Number of concurrent executors.
    pub workers: usize,
    /// Initial target rate, records/second.
    pub rate: f64,
    pub soft_timeout_ms: u64,
    pub hard_timeout_ms: u64,
    pub status_interval_ms: u64,
    /// Read live rate changes from stdin.
    pub rate_input: bool,
    pub verbose: bool,
    /// Worker payload template; string leaves may contain `{{field}}` placeholders.
    pub payload_template: Option<Payload>,
    /// Payload for the worker's start/stop hooks.
    pub worker_payload: Payload,
    /// Response fields appended to each log row.
    pub log_output: Vec<String>,
}

impl Default for Opts {
    fn default() -> Self {
        use crate::utils::config::Defaults;
        Self {
            data: None,
            log: None,
            resume: true,
            worker_type: None,
            workers: Defaults::WORKERS,
            rate: Defaults::RATE,
            soft_timeout_ms: Defaults::SOFT_TIMEOUT_MS,
            hard_timeout_ms: Defaults::HARD_TIMEOUT_MS,
            status_interval_ms: Defaults::STATUS_INTERVAL_MS,
            rate_input: true,
            verbose: false,
            payload_template: None,
            worker_payload: Payload::new(),
            log_output: Vec::new(),
        }
    }
}
