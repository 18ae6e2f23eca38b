//! First-failure-wins error policy.
//!
//! Any thread may [`ErrorReporter::report`] a failure without blocking. A single consumer
//! thread owns the fatal-error slot: the first error it receives becomes "the" fatal error
//! and fires the cancel token, every later one only bumps `errors_ignored`.

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use log::{debug, error};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::cancel::CancelToken;
use super::counters::EngineCounters;

/// Sending half handed to the dispatch loop, executors and log writer.
#[derive(Clone, Debug)]
pub struct ErrorReporter {
    tx: Sender<anyhow::Error>,
}

impl ErrorReporter {
    /// Hand an error to the escalator. Never blocks; dropped silently once the escalator exited.
    pub fn report(&self, err: anyhow::Error) {
        let _ = self.tx.send(err);
    }
}

/// Consumer side. Built before the pipeline starts, consumed by [`ErrorEscalator::spawn`].
pub struct ErrorEscalator {
    rx: Receiver<anyhow::Error>,
    cancel: CancelToken,
    counters: Arc<EngineCounters>,
}

impl ErrorEscalator {
    pub fn new(cancel: CancelToken, counters: Arc<EngineCounters>) -> (Self, ErrorReporter) {
        let (tx, rx) = unbounded();
        (
            Self {
                rx,
                cancel,
                counters,
            },
            ErrorReporter { tx },
        )
    }

    fn handle(&self, fatal: &mut Option<anyhow::Error>, err: anyhow::Error) {
        if fatal.is_none() {
            error!("Fatal error, shutting down: {:#}", err);
            *fatal = Some(err);
            self.cancel.cancel();
        } else {
            debug!("Ignoring error after fatal: {:#}", err);
            self.counters.record_ignored_error();
        }
    }

    /// Run the consumer until `done` disconnects, then drain what is queued.
    /// The join handle yields the fatal error, if any.
    pub fn spawn(self, done: Receiver<()>) -> JoinHandle<Option<anyhow::Error>> {
        thread::spawn(move || {
            let mut fatal = None;
            loop {
                select! {
                    recv(self.rx) -> msg => match msg {
                        Ok(err) => self.handle(&mut fatal, err),
                        Err(_) => break,
                    },
                    recv(done) -> _ => {
                        while let Ok(err) = self.rx.try_recv() {
                            self.handle(&mut fatal, err);
                        }
                        break;
                    }
                }
            }
            debug!("error escalator: drained");
            fatal
        })
    }
}
