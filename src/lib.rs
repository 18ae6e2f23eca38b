//! Blaster: rate-controlled, resumable batch dispatcher.
//!
//! Records are read from a [`RecordSource`](data::RecordSource), skipped if a previous run
//! already logged them, paced by a live-tunable rate, executed by a pool of pluggable
//! [`Worker`](engine::registry::Worker)s and logged to a [`ResultSink`](data::ResultSink).
//! The first failure cancels the run; later ones are only counted.

pub mod data;
pub mod engine;
pub mod pipeline;
pub mod resume;
pub mod run;
pub mod types;
pub mod utils;
pub mod workers;

/// Re-export types for API
pub use types::*;

pub use engine::cancel::CancelToken;
pub use engine::registry::{CallContext, Worker, WorkerRegistry};
pub use pipeline::orchestrator::{Blaster, RunInputs};
pub use resume::SkipSet;
pub use utils::config::EngineConfig;

/// Result alias used by public blaster API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
