//! File-backed run: open the CSV data file, replay the log for resume, open the log, run.

use anyhow::{Context, Result, anyhow};
use log::info;
use std::io::BufReader;

use crate::Opts;
use crate::data::{CsvSink, CsvSource, NullSink, RecordSource, ResultSink};
use crate::engine::cancel::CancelToken;
use crate::engine::registry::WorkerRegistry;
use crate::pipeline::log_writer::log_headers;
use crate::pipeline::orchestrator::{Blaster, RunInputs};
use crate::resume::SkipSet;
use crate::types::Summary;
use crate::utils::config::EngineConfig;
use crate::utils::output::SharedOutput;

/// Validate `opts`, open files and run the engine.
///
/// `on_cancel_token` receives the run's cancel token before anything starts (the CLI hooks
/// Ctrl+C there). Startup order: config → data file → resume set → log file → engine.
pub fn blast_files<F>(
    opts: &Opts,
    registry: WorkerRegistry,
    out: SharedOutput,
    on_cancel_token: F,
) -> Result<Summary>
where
    F: FnOnce(CancelToken) -> Result<()>,
{
    let config = EngineConfig::from_opts(opts)?;
    if !registry.has(&config.worker_type) {
        return Err(anyhow!(
            "Unknown worker type: '{}'. Registered types: {:?}",
            config.worker_type,
            registry.types()
        ));
    }
    let data_path = opts
        .data
        .as_deref()
        .ok_or_else(|| anyhow!("No data file specified. Use --data or set data in the config."))?;
    let source = CsvSource::open(data_path)?;
    let headers = source.headers().to_vec();

    let skip = match (&opts.log, opts.resume) {
        (Some(log), true) => SkipSet::load(log, &headers)?,
        _ => SkipSet::empty(),
    };
    let sink: Box<dyn ResultSink> = match &opts.log {
        Some(log) => {
            if !opts.resume && log.exists() {
                info!("Appending to existing log {} without resuming", log.display());
            }
            Box::new(CsvSink::append(log, &log_headers(&headers, &config.log_output))?)
        }
        None => Box::new(NullSink),
    };

    let blaster = Blaster::new(config).with_registry(registry).with_output(out);
    on_cancel_token(blaster.cancel_token()).context("install interrupt handler")?;
    let rate_input = opts
        .rate_input
        .then(|| Box::new(BufReader::new(std::io::stdin())) as Box<dyn std::io::BufRead + Send>);
    blaster.run(RunInputs {
        source: Box::new(source),
        sink,
        skip,
        rate_input,
    })
}
