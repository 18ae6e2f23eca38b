//! Dispatch loop: read → skip done → pace → hand off to an idle executor.

use anyhow::Context;
use crossbeam_channel::{Sender, select_biased};
use log::debug;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::context::Shared;
use crate::data::RecordSource;
use crate::engine::rate::RateController;
use crate::resume::SkipSet;
use crate::types::{Record, WorkItem};

/// Why the dispatch loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchExit {
    /// Source reported end of data.
    Exhausted,
    /// Cancel token fired while reading, pacing or handing off.
    Cancelled,
    /// Source failed; the error went to the escalator.
    ReadFailed,
}

pub struct DispatchContext {
    pub source: Box<dyn RecordSource>,
    pub skip: Arc<SkipSet>,
    pub rate: RateController,
    pub shared: Shared,
}

/// Run the loop until the source is exhausted, fails, or the run is cancelled.
/// Drops `work_tx` on return so idle executors see the channel close.
pub fn run_dispatch_loop(mut ctx: DispatchContext, work_tx: Sender<WorkItem>) -> DispatchExit {
    let headers = Arc::clone(ctx.source.headers());
    let cancel = ctx.shared.cancel.clone();
    let mut seq = 0_u64;
    let exit = loop {
        if cancel.is_cancelled() {
            break DispatchExit::Cancelled;
        }
        let values = match ctx.source.read() {
            Ok(Some(values)) => values,
            Ok(None) => break DispatchExit::Exhausted,
            Err(e) => {
                ctx.shared
                    .errors
                    .report(e.context("reading data failed"));
                break DispatchExit::ReadFailed;
            }
        };
        let record = Record::new(Arc::clone(&headers), values);
        let fingerprint = record.fingerprint();
        if ctx.skip.should_skip(&fingerprint) {
            ctx.shared.counters.record_skipped();
            continue;
        }
        if !ctx.rate.pace(&cancel) {
            break DispatchExit::Cancelled;
        }
        let item = WorkItem {
            seq,
            fingerprint,
            record,
        };
        // Cancel is listed first so a fired token always wins over a ready executor.
        select_biased! {
            recv(cancel.receiver()) -> _ => break DispatchExit::Cancelled,
            send(work_tx, item) -> res => {
                if res.is_err() {
                    // Every executor is gone; nothing left to hand work to.
                    break DispatchExit::Cancelled;
                }
                ctx.shared.counters.record_dispatched();
                seq += 1;
            }
        }
    };
    drop(work_tx);
    debug!("dispatch: {:?} after {} records", exit, seq);
    exit
}

/// Spawn the dispatch thread. `data_finished` is dropped when the loop returns, for any reason.
pub fn spawn_dispatch_thread(
    ctx: DispatchContext,
    work_tx: Sender<WorkItem>,
    data_finished: Sender<()>,
) -> anyhow::Result<JoinHandle<DispatchExit>> {
    thread::Builder::new()
        .name("dispatch".into())
        .spawn(move || {
            let exit = run_dispatch_loop(ctx, work_tx);
            if exit == DispatchExit::Exhausted {
                let _ = data_finished.try_send(());
            }
            drop(data_finished);
            exit
        })
        .context("spawn dispatch thread")
}
