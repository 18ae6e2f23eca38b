//! Built-in worker types.

use anyhow::{Result, bail};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::engine::registry::{CallContext, Worker, WorkerRegistry};
use crate::types::Payload;

pub const DUMMY: &str = "dummy";
pub const FAIL: &str = "fail";

pub fn register_builtin(registry: &mut WorkerRegistry) {
    registry.register(DUMMY, || Box::new(DummyWorker::default()));
    registry.register(FAIL, || Box::new(FailWorker));
}

/// Echoes the payload back, optionally after `delay_ms` (from the worker payload).
/// Gives up early if the call's soft timeout expires during the delay.
#[derive(Default)]
pub struct DummyWorker {
    delay_ms: AtomicU64,
}

impl Worker for DummyWorker {
    fn start(&self, _ctx: &CallContext, payload: &Payload) -> Result<()> {
        match payload.get("delay_ms") {
            None => {}
            Some(Value::Number(n)) if n.as_u64().is_some() => {
                self.delay_ms.store(n.as_u64().unwrap_or(0), Ordering::Relaxed);
            }
            Some(other) => bail!("delay_ms must be a non-negative integer, got {}", other),
        }
        Ok(())
    }

    fn send(&self, ctx: &CallContext, payload: &Payload) -> Result<Payload> {
        let delay = Duration::from_millis(self.delay_ms.load(Ordering::Relaxed));
        let until = Instant::now() + delay;
        while Instant::now() < until {
            if ctx.is_cancelled() {
                bail!("gave up: soft timeout expired");
            }
            std::thread::sleep(Duration::from_millis(5).min(delay));
        }
        Ok(payload.clone())
    }
}

/// Fails every call. Exercises the error path without touching anything external.
pub struct FailWorker;

impl Worker for FailWorker {
    fn send(&self, _ctx: &CallContext, _payload: &Payload) -> Result<Payload> {
        bail!("fail worker: always fails")
    }
}
