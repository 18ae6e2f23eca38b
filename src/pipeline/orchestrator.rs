//! Lifecycle coordinator: start every stage, wait for the end of the run, shut down in order.

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, bounded, select};
use log::{debug, info, warn};
use std::io::BufRead;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use super::context::{Shared, create_pipeline_channels};
use super::dispatch::{DispatchContext, spawn_dispatch_thread};
use super::executor::{ExecutorSettings, spawn_executors, start_workers};
use super::log_writer::spawn_log_writer;
use crate::data::{RecordSource, ResultSink};
use crate::engine::cancel::CancelToken;
use crate::engine::counters::EngineCounters;
use crate::engine::escalator::ErrorEscalator;
use crate::engine::rate::RateController;
use crate::engine::registry::{Worker, WorkerRegistry};
use crate::engine::status::{print_summary, spawn_status_loop};
use crate::resume::SkipSet;
use crate::types::Summary;
use crate::utils::config::EngineConfig;
use crate::utils::output::SharedOutput;

/// The engine. Configure, register worker types, then [`Blaster::run`].
pub struct Blaster {
    config: EngineConfig,
    registry: WorkerRegistry,
    cancel: CancelToken,
    out: SharedOutput,
}

/// External collaborators for one run.
pub struct RunInputs {
    pub source: Box<dyn RecordSource>,
    pub sink: Box<dyn ResultSink>,
    pub skip: SkipSet,
    /// Line-oriented rate changes (e.g. stdin). `None` disables live rate input.
    pub rate_input: Option<Box<dyn BufRead + Send>>,
}

impl Blaster {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: WorkerRegistry::with_defaults(),
            cancel: CancelToken::new(),
            out: SharedOutput::stdout(),
        }
    }

    pub fn with_output(mut self, out: SharedOutput) -> Self {
        self.out = out;
        self
    }

    pub fn with_registry(mut self, registry: WorkerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn register_worker_type<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Worker> + Send + Sync + 'static,
    {
        self.registry.register(key, factory);
    }

    /// Token that interrupts the run when fired (hook it to Ctrl+C).
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run to completion, fatal error or interrupt. Startup problems return `Err` before any
    /// record is dispatched; everything after that ends in an `Ok(Summary)`.
    pub fn run(&self, inputs: RunInputs) -> Result<Summary> {
        let started_at = Instant::now();
        let cfg = &self.config;

        let workers: Vec<Arc<dyn Worker>> = (0..cfg.workers)
            .map(|_| self.registry.create(&cfg.worker_type).map(Arc::from))
            .collect::<Result<_>>()?;

        let counters = Arc::new(EngineCounters::new());
        let (escalator, errors) = ErrorEscalator::new(self.cancel.clone(), Arc::clone(&counters));
        let shared = Shared {
            counters: Arc::clone(&counters),
            cancel: self.cancel.clone(),
            errors,
        };
        start_workers(&workers, &cfg.worker_payload)?;

        let ch = create_pipeline_channels();
        let rate = RateController::new(cfg.rate);
        debug!(
            "starting: {} executors, worker '{}', rate {}/s",
            cfg.workers, cfg.worker_type, cfg.rate
        );

        let ticker = rate.spawn_ticker(self.cancel.clone(), ch.workers_finished_rx.clone());
        // Outlives the log writer so a failing final flush still reaches the escalator.
        let (errors_done_tx, errors_done_rx) = bounded::<()>(1);
        let escalator_handle = escalator.spawn(errors_done_rx);
        let settings = Arc::new(ExecutorSettings {
            soft_timeout: cfg.soft_timeout,
            hard_timeout: cfg.hard_timeout,
            payload_template: cfg.payload_template.clone(),
            worker_payload: cfg.worker_payload.clone(),
            log_output: cfg.log_output.clone(),
        });
        let executors = spawn_executors(workers, &ch.work_rx, &ch.log_tx, settings, &shared)?;
        drop(ch.work_rx);
        drop(ch.log_tx);
        let log_handle = spawn_log_writer(
            inputs.sink,
            ch.log_rx,
            ch.workers_finished_rx.clone(),
            shared.errors.clone(),
        )?;
        let dispatch_handle = spawn_dispatch_thread(
            DispatchContext {
                source: inputs.source,
                skip: Arc::new(inputs.skip),
                rate: rate.clone(),
                shared: shared.clone(),
            },
            ch.work_tx,
            ch.data_finished_tx,
        )?;
        let status = spawn_status_loop(
            self.out.clone(),
            Arc::clone(&counters),
            rate.clone(),
            cfg.status_interval,
            ch.workers_finished_rx.clone(),
        );
        if let Some(input) = inputs.rate_input {
            spawn_rate_input(
                input,
                rate.clone(),
                self.out.clone(),
                ch.workers_finished_rx.clone(),
            )?;
            self.out
                .line("Enter a new rate (records/second) at any time and press enter.");
        }

        // 1. Wait for an interrupt/fatal error or the end of the data.
        select! {
            recv(self.cancel.receiver()) -> _ => info!("Cancelled; shutting down"),
            recv(ch.data_finished_rx) -> _ => debug!("dispatch finished"),
        }

        // 2. Let in-flight calls finish; nothing new is handed out from here on.
        self.out.line("Waiting for workers to finish...");
        if dispatch_handle.join().is_err() {
            shared.errors.report(anyhow!("dispatch thread panicked"));
        }
        for (i, h) in executors.into_iter().enumerate() {
            if h.join().is_err() {
                shared.errors.report(anyhow!("executor {} panicked", i));
            }
        }
        self.out.line("All workers finished.");

        // 3. Tell downstream consumers no more input is coming and wait for them to drain.
        drop(ch.workers_finished_tx);
        self.out.line("Waiting for processes to finish...");
        let written = log_handle
            .join()
            .map_err(|_| anyhow!("log writer thread panicked"))?;
        drop(errors_done_tx);
        let fatal_error = escalator_handle
            .join()
            .map_err(|_| anyhow!("error escalator thread panicked"))?;
        let _ = ticker.join();
        let _ = status.join();
        self.out.line("All processes finished.");
        debug!("{} log records written", written);

        // 4. Final summary.
        let now = Instant::now();
        let summary = Summary {
            counters: counters.snapshot(),
            interrupted: fatal_error.is_none() && self.cancel.is_cancelled(),
            fatal_error,
            segments: rate.history().segments(),
            average_rate: rate.history().average_rate(now),
            elapsed: now.duration_since(started_at),
        };
        print_summary(&self.out, &summary);
        Ok(summary)
    }
}

/// Read rate changes line by line until the input ends or the run finishes.
///
/// Detached: a blocking read on stdin can't be interrupted, so the thread is never joined.
fn spawn_rate_input(
    input: Box<dyn BufRead + Send>,
    rate: RateController,
    out: SharedOutput,
    finished: Receiver<()>,
) -> Result<()> {
    thread::Builder::new()
        .name("rate-input".into())
        .spawn(move || {
            for line in input.lines() {
                let Ok(line) = line else { break };
                if !matches!(finished.try_recv(), Err(crossbeam_channel::TryRecvError::Empty)) {
                    break;
                }
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                match text.parse::<f64>().map_err(anyhow::Error::from) {
                    Ok(r) => match rate.set_rate(r) {
                        Ok(()) => out.line(&format!("Rate set to {}/s", r)),
                        Err(e) => {
                            warn!("Rejected rate {:?}: {}", text, e);
                            out.line(&format!("Invalid rate {:?}: {}", text, e));
                        }
                    },
                    Err(e) => {
                        warn!("Rejected rate {:?}: {}", text, e);
                        out.line(&format!("Invalid rate {:?}: {}", text, e));
                    }
                }
            }
        })
        .map(|_| ())
        .context("spawn rate input thread")
}
