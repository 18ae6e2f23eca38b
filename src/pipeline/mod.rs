//! Pipeline stages: dispatch loop, executors, log writer, and the coordinator that runs them.

pub mod context;
pub mod dispatch;
pub mod executor;
pub mod log_writer;
pub mod orchestrator;

pub use context::{PipelineChannels, Shared, create_pipeline_channels};
pub use dispatch::{DispatchContext, DispatchExit, run_dispatch_loop, spawn_dispatch_thread};
pub use executor::{ExecutorSettings, spawn_executors, start_workers};
pub use log_writer::{log_headers, log_record_for, run_log_loop, spawn_log_writer};
pub use orchestrator::{Blaster, RunInputs};
