//! Log writer: the single consumer that serializes result rows to the sink.

use anyhow::Context;
use crossbeam_channel::{Receiver, select};
use log::debug;
use serde_json::Value;
use std::thread::{self, JoinHandle};

use crate::data::ResultSink;
use crate::engine::escalator::ErrorReporter;
use crate::types::{LogRecord, Payload, WorkItem};
use crate::utils::config::HASH_COLUMN;

/// Header row of the result log: `hash`, data columns, then the selected response fields.
pub fn log_headers(data_headers: &[String], log_output: &[String]) -> Vec<String> {
    std::iter::once(HASH_COLUMN.to_string())
        .chain(data_headers.iter().cloned())
        .chain(log_output.iter().cloned())
        .collect()
}

/// Project a successful call onto a log row (same column order as [`log_headers`]).
pub fn log_record_for(item: &WorkItem, response: &Payload, log_output: &[String]) -> LogRecord {
    let mut fields = Vec::with_capacity(1 + item.record.values.len() + log_output.len());
    fields.push(item.fingerprint.to_string());
    fields.extend(item.record.values.iter().cloned());
    for name in log_output {
        fields.push(match response.get(name) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        });
    }
    LogRecord { fields }
}

/// Write queued rows until `workers_finished` disconnects, drain what's left, then flush once.
///
/// A failing sink is reported to the escalator; later rows are still received (and dropped)
/// so executors never block on a dead writer. Returns the number of rows written.
pub fn run_log_loop(
    mut sink: Box<dyn ResultSink>,
    log_rx: Receiver<LogRecord>,
    workers_finished: Receiver<()>,
    errors: ErrorReporter,
) -> u64 {
    let mut written = 0_u64;
    let mut broken = false;
    let mut write = |rec: LogRecord, sink: &mut Box<dyn ResultSink>| {
        if broken {
            return;
        }
        match sink.write(&rec.fields) {
            Ok(()) => written += 1,
            Err(e) => {
                errors.report(e);
                broken = true;
            }
        }
    };
    loop {
        select! {
            recv(log_rx) -> msg => match msg {
                Ok(rec) => write(rec, &mut sink),
                Err(_) => break,
            },
            recv(workers_finished) -> _ => {
                while let Ok(rec) = log_rx.try_recv() {
                    write(rec, &mut sink);
                }
                break;
            }
        }
    }
    if !broken && let Err(e) = sink.flush() {
        errors.report(e);
    }
    debug!("log writer: {} records written", written);
    written
}

pub fn spawn_log_writer(
    sink: Box<dyn ResultSink>,
    log_rx: Receiver<LogRecord>,
    workers_finished: Receiver<()>,
    errors: ErrorReporter,
) -> anyhow::Result<JoinHandle<u64>> {
    thread::Builder::new()
        .name("log-writer".into())
        .spawn(move || run_log_loop(sink, log_rx, workers_finished, errors))
        .context("spawn log writer thread")
}
