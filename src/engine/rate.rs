//! Rate controller: live-tunable pacing for the dispatch loop.
//!
//! A ticker thread owns the pacing state and emits one tick per due dispatch on a
//! zero-capacity channel. Rate changes go through a capacity-1 slot where the latest request
//! overwrites a pending one, so the ticker never replays stale rates.

use anyhow::{Result, bail};
use crossbeam_channel::{Receiver, Sender, after, bounded, never, select};
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::cancel::CancelToken;
use crate::types::RateSegment;

/// Reject rates that can't be paced: negative or NaN. `inf` means "as fast as possible".
pub fn validate_rate(rate: f64) -> Result<f64> {
    if rate.is_nan() || rate < 0.0 {
        bail!("rate must be a number >= 0, got {}", rate);
    }
    Ok(rate)
}

/// Time between dispatches for `rate`, or `None` when paused (rate 0).
pub fn interval_for(rate: f64) -> Option<Duration> {
    if rate <= 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(1.0 / rate).unwrap_or(Duration::MAX))
}

/// Append-only log of target-rate changes.
#[derive(Debug, Default)]
pub struct RateHistory {
    segments: Mutex<Vec<RateSegment>>,
}

impl RateHistory {
    pub fn push(&self, rate: f64) {
        if let Ok(mut segs) = self.segments.lock() {
            segs.push(RateSegment {
                at: Instant::now(),
                rate,
            });
        }
    }

    pub fn segments(&self) -> Vec<RateSegment> {
        self.segments.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// `Σ(rate × duration) / total` over all segments up to `until`.
    pub fn average_rate(&self, until: Instant) -> f64 {
        average_rate(&self.segments(), until)
    }
}

/// Elapsed-time-weighted mean target rate; each segment lasts until the next one (or `until`).
pub fn average_rate(segments: &[RateSegment], until: Instant) -> f64 {
    let Some(first) = segments.first() else {
        return 0.0;
    };
    let total = until.saturating_duration_since(first.at).as_secs_f64();
    if total <= 0.0 {
        return segments.last().map(|s| s.rate).unwrap_or(0.0);
    }
    let mut weighted = 0.0;
    for (i, seg) in segments.iter().enumerate() {
        let end = segments.get(i + 1).map(|n| n.at).unwrap_or(until);
        let secs = end.saturating_duration_since(seg.at).as_secs_f64();
        if secs > 0.0 && seg.rate.is_finite() {
            weighted += seg.rate * secs;
        }
    }
    weighted / total
}

/// Shared handle: set the rate from anywhere, pace from the dispatch loop.
#[derive(Clone)]
pub struct RateController {
    change_tx: Sender<f64>,
    change_rx: Receiver<f64>,
    tick_tx: Sender<()>,
    tick_rx: Receiver<()>,
    current: Arc<AtomicU64>,
    history: Arc<RateHistory>,
}

impl RateController {
    pub fn new(initial: f64) -> Self {
        let (change_tx, change_rx) = bounded(1);
        let (tick_tx, tick_rx) = bounded(0);
        let history = Arc::new(RateHistory::default());
        history.push(initial);
        Self {
            change_tx,
            change_rx,
            tick_tx,
            tick_rx,
            current: Arc::new(AtomicU64::new(initial.to_bits())),
            history,
        }
    }

    /// Request a new target rate. Overwrites any change the ticker hasn't picked up yet.
    pub fn set_rate(&self, rate: f64) -> Result<()> {
        let rate = validate_rate(rate)?;
        loop {
            match self.change_tx.try_send(rate) {
                Ok(()) => return Ok(()),
                Err(crossbeam_channel::TrySendError::Full(_)) => {
                    let _ = self.change_rx.try_recv();
                }
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                    bail!("rate controller is gone")
                }
            }
        }
    }

    /// Rate the ticker is currently pacing at.
    pub fn current_rate(&self) -> f64 {
        f64::from_bits(self.current.load(Ordering::Relaxed))
    }

    pub fn history(&self) -> &Arc<RateHistory> {
        &self.history
    }

    /// Block until the next dispatch is due. Returns false if `cancel` fired first.
    pub fn pace(&self, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        select! {
            recv(self.tick_rx) -> tick => tick.is_ok(),
            recv(cancel.receiver()) -> _ => false,
        }
    }

    fn apply(&self, rate: f64) {
        self.current.store(rate.to_bits(), Ordering::Relaxed);
        self.history.push(rate);
        info!("Rate changed to {}/s", rate);
    }

    /// Start the ticker. It runs until `cancel` fires or `stop` disconnects.
    pub fn spawn_ticker(&self, cancel: CancelToken, stop: Receiver<()>) -> JoinHandle<()> {
        let rc = self.clone();
        thread::spawn(move || rc.ticker_loop(&cancel, &stop))
    }

    fn ticker_loop(&self, cancel: &CancelToken, stop: &Receiver<()>) {
        let mut interval = interval_for(self.current_rate());
        // First dispatch is due immediately.
        let mut last: Option<Instant> = None;
        loop {
            let timer = match (interval, last) {
                (None, _) => never(),
                (Some(_), None) => after(Duration::ZERO),
                (Some(iv), Some(t)) => {
                    after((t + iv).saturating_duration_since(Instant::now()))
                }
            };
            select! {
                recv(self.change_rx) -> msg => {
                    if let Ok(rate) = msg {
                        self.apply(rate);
                        interval = interval_for(rate);
                    }
                }
                recv(timer) -> _ => {
                    // Due: wait for the dispatcher to take the tick, but keep listening for
                    // rate changes so a lowered rate applies to this very tick.
                    select! {
                        send(self.tick_tx, ()) -> _ => last = Some(Instant::now()),
                        recv(self.change_rx) -> msg => {
                            if let Ok(rate) = msg {
                                self.apply(rate);
                                interval = interval_for(rate);
                            }
                        }
                        recv(cancel.receiver()) -> _ => break,
                        recv(stop) -> _ => break,
                    }
                }
                recv(cancel.receiver()) -> _ => break,
                recv(stop) -> _ => break,
            }
        }
        debug!("rate ticker: exit");
    }
}
