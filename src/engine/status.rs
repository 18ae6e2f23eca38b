//! Periodic status lines and the final summary.

use colored::Colorize;
use crossbeam_channel::{Receiver, select, tick};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::counters::EngineCounters;
use super::rate::RateController;
use crate::types::{CounterSnapshot, Summary};
use crate::utils::output::SharedOutput;

/// One status line from a counter snapshot and the current target rate.
pub fn format_status(c: &CounterSnapshot, rate: f64) -> String {
    let latency = c
        .mean_latency()
        .map(|d| format!("{}ms", d.as_millis()))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "rate {}/s | dispatched {} | success {} | failed {} | in-flight {} | skipped {} | latency {}",
        format_rate(rate),
        c.dispatched,
        c.succeeded.to_string().green(),
        c.failed.to_string().red(),
        c.in_flight,
        c.skipped,
        latency
    )
}

fn format_rate(rate: f64) -> String {
    if rate.is_infinite() {
        "max".to_string()
    } else {
        format!("{:.2}", rate)
    }
}

/// Spawn the status ticker. Prints every `interval` until `stop` disconnects.
/// Lines are dropped rather than waited for if the output is busy.
pub fn spawn_status_loop(
    out: SharedOutput,
    counters: Arc<EngineCounters>,
    rate: RateController,
    interval: Duration,
    stop: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let ticker = tick(interval);
        loop {
            select! {
                recv(ticker) -> _ => {
                    let line = format_status(&counters.snapshot(), rate.current_rate());
                    if !out.try_line(&line) {
                        log::debug!("status line dropped: output busy");
                    }
                }
                recv(stop) -> _ => break,
            }
        }
    })
}

/// Render the end-of-run summary.
pub fn print_summary(out: &SharedOutput, summary: &Summary) {
    let c = &summary.counters;
    out.line("");
    if let Some(err) = &summary.fatal_error {
        if c.errors_ignored > 0 {
            out.line(&format!(
                "{} errors were ignored because we were already exiting with an error.",
                c.errors_ignored
            ));
        }
        out.line(&format!("{} {:#}", "Fatal error:".red().bold(), err));
        return;
    }
    if summary.interrupted {
        out.line(&"Interrupted; partial results:".yellow().to_string());
    }
    out.line(&format!(
        "Finished in {:.1}s | dispatched {} | success {} | failed {} | skipped {} | hard timeouts {}",
        summary.elapsed.as_secs_f64(),
        c.dispatched,
        c.succeeded,
        c.failed,
        c.skipped,
        c.hard_timeouts
    ));
    out.line(&format!(
        "Average target rate {}/s over {} rate segment(s)",
        format_rate(summary.average_rate),
        summary.segments.len()
    ));
}
