//! Pipeline channels and shared state passed into the dispatch, executor and log threads.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;

use crate::engine::cancel::CancelToken;
use crate::engine::counters::EngineCounters;
use crate::engine::escalator::ErrorReporter;
use crate::types::{LogRecord, WorkItem};
use crate::utils::config::LOG_CHANNEL_CAP;

/// State every pipeline thread may touch: counters (atomics), the cancel token and the error reporter.
#[derive(Clone)]
pub struct Shared {
    pub counters: Arc<EngineCounters>,
    pub cancel: CancelToken,
    pub errors: ErrorReporter,
}

/// Queues and completion signals of one run.
///
/// `work` is a rendezvous channel: the dispatch loop never holds more than the one item it is
/// trying to hand off. `data_finished` and `workers_finished` carry no messages; they signal by
/// disconnecting when their sender is dropped.
pub struct PipelineChannels {
    pub work_tx: Sender<WorkItem>,
    pub work_rx: Receiver<WorkItem>,
    pub log_tx: Sender<LogRecord>,
    pub log_rx: Receiver<LogRecord>,
    pub data_finished_tx: Sender<()>,
    pub data_finished_rx: Receiver<()>,
    pub workers_finished_tx: Sender<()>,
    pub workers_finished_rx: Receiver<()>,
}

pub fn create_pipeline_channels() -> PipelineChannels {
    let (work_tx, work_rx) = bounded::<WorkItem>(0);
    let (log_tx, log_rx) = bounded::<LogRecord>(LOG_CHANNEL_CAP);
    let (data_finished_tx, data_finished_rx) = bounded::<()>(1);
    let (workers_finished_tx, workers_finished_rx) = bounded::<()>(1);
    PipelineChannels {
        work_tx,
        work_rx,
        log_tx,
        log_rx,
        data_finished_tx,
        data_finished_rx,
        workers_finished_tx,
        workers_finished_rx,
    }
}
