//! Engine primitives: cancellation, pacing, counters, error policy, worker registry.

pub mod arg_parser;
pub mod cancel;
pub mod cli;
pub mod counters;
pub mod escalator;
pub mod fingerprint;
pub mod rate;
pub mod registry;
pub mod status;
pub mod template;

// Re-export commonly used items
pub use arg_parser::Cli;
pub use cancel::CancelToken;
pub use cli::{handle_run, resolve_opts};
pub use counters::EngineCounters;
pub use escalator::{ErrorEscalator, ErrorReporter};
pub use fingerprint::Fingerprint;
pub use rate::{RateController, RateHistory, average_rate};
pub use registry::{CallContext, Worker, WorkerFactory, WorkerRegistry};
