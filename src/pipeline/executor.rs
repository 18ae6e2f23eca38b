//! Worker pool: a fixed set of executor threads, each owning one worker instance.

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, select_biased};
use log::{debug, warn};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::context::Shared;
use super::log_writer::log_record_for;
use crate::engine::registry::{CallContext, Worker};
use crate::engine::template::build_payload;
use crate::types::{LogRecord, Outcome, Payload, WorkItem};

/// Per-run settings every executor reads.
pub struct ExecutorSettings {
    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
    pub payload_template: Option<Payload>,
    pub worker_payload: Payload,
    pub log_output: Vec<String>,
}

struct Executor {
    id: usize,
    worker: Arc<dyn Worker>,
    settings: Arc<ExecutorSettings>,
    shared: Shared,
    log_tx: Sender<LogRecord>,
}

impl Executor {
    fn run(self, work_rx: Receiver<WorkItem>) {
        let cancel = self.shared.cancel.clone();
        loop {
            select_biased! {
                recv(cancel.receiver()) -> _ => break,
                recv(work_rx) -> msg => match msg {
                    Ok(item) => {
                        let outcome = self.execute(item);
                        self.route(outcome);
                    }
                    Err(_) => break,
                },
            }
        }
        let ctx = CallContext::background();
        if let Err(e) = self.worker.stop(&ctx, &self.settings.worker_payload) {
            self.shared
                .errors
                .report(e.context(format!("executor {}: worker stop failed", self.id)));
        }
        debug!("executor {}: exit", self.id);
    }

    fn execute(&self, item: WorkItem) -> Outcome {
        let counters = &self.shared.counters;
        counters.call_started();
        let started = Instant::now();
        let result = build_payload(self.settings.payload_template.as_ref(), &item.record)
            .and_then(|payload| self.call_with_timeouts(payload));
        counters.call_finished(result.is_ok(), started.elapsed());
        match result {
            Ok(response) => Outcome::Success { item, response },
            Err(error) => Outcome::Failure { item, error },
        }
    }

    /// Successes go to the log writer, failures to the escalator. Never both.
    fn route(&self, outcome: Outcome) {
        match outcome {
            Outcome::Success { item, response } => {
                let rec = log_record_for(&item, &response, &self.settings.log_output);
                if self.log_tx.send(rec).is_err() {
                    self.shared
                        .errors
                        .report(anyhow!("log writer gone; record {} not logged", item.seq));
                }
            }
            Outcome::Failure { item, error } => {
                self.shared.errors.report(error.context(format!(
                    "record {} ({}) failed",
                    item.seq, item.fingerprint
                )));
            }
        }
    }

    /// Run one worker call on its own thread. After the soft timeout the call's context is
    /// expired; after the hard timeout the call is abandoned and counted as failed.
    fn call_with_timeouts(&self, payload: Payload) -> Result<Payload> {
        let soft = self.settings.soft_timeout;
        let hard = self.settings.hard_timeout;
        let ctx = CallContext::new(Some(Instant::now() + soft));
        let (done_tx, done_rx) = bounded::<Result<Payload>>(1);
        let worker = Arc::clone(&self.worker);
        let call_ctx = ctx.clone();
        thread::Builder::new()
            .name(format!("executor-{}-call", self.id))
            .spawn(move || {
                let res = worker.send(&call_ctx, &payload);
                let _ = done_tx.send(res);
            })
            .context("spawn worker call")?;

        match done_rx.recv_timeout(soft) {
            Ok(res) => return res,
            Err(RecvTimeoutError::Disconnected) => bail!("worker call panicked"),
            Err(RecvTimeoutError::Timeout) => {
                warn!("executor {}: soft timeout ({:?}) reached", self.id, soft);
                ctx.expire();
            }
        }
        match done_rx.recv_timeout(hard.saturating_sub(soft)) {
            Ok(res) => res,
            Err(RecvTimeoutError::Disconnected) => bail!("worker call panicked"),
            Err(RecvTimeoutError::Timeout) => {
                self.shared.counters.record_hard_timeout();
                bail!("hard timeout ({:?}) reached", hard)
            }
        }
    }
}

/// Call each worker's start hook. On the first failure, already-started workers are stopped
/// and the error is returned.
pub fn start_workers(workers: &[Arc<dyn Worker>], worker_payload: &Payload) -> Result<()> {
    let ctx = CallContext::background();
    for (i, w) in workers.iter().enumerate() {
        if let Err(e) = w.start(&ctx, worker_payload) {
            for started in &workers[..i] {
                let _ = started.stop(&ctx, worker_payload);
            }
            return Err(e.context(format!("worker {} failed to start", i)));
        }
    }
    Ok(())
}

/// Spawn one executor per worker. Caller must drop its own `log_tx` after this so the log
/// writer sees the queue close once every executor has exited.
pub fn spawn_executors(
    workers: Vec<Arc<dyn Worker>>,
    work_rx: &Receiver<WorkItem>,
    log_tx: &Sender<LogRecord>,
    settings: Arc<ExecutorSettings>,
    shared: &Shared,
) -> Result<Vec<JoinHandle<()>>> {
    workers
        .into_iter()
        .enumerate()
        .map(|(id, worker)| {
            let exec = Executor {
                id,
                worker,
                settings: Arc::clone(&settings),
                shared: shared.clone(),
                log_tx: log_tx.clone(),
            };
            let work_rx = work_rx.clone();
            thread::Builder::new()
                .name(format!("executor-{id}"))
                .spawn(move || exec.run(work_rx))
                .context("spawn executor thread")
        })
        .collect()
}
