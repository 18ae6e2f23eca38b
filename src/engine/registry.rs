//! Pluggable workers: the capability trait and the name → factory registry.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::types::Payload;

/// Per-call context handed to a worker.
///
/// Reports cancelled once this call's soft timeout expired. An interrupt of the run does not
/// cancel calls already in flight; they are allowed to complete.
/// Workers doing long or blocking work should check it and give up early.
#[derive(Clone, Debug)]
pub struct CallContext {
    expired: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new(deadline: Option<Instant>) -> Self {
        Self {
            expired: Arc::new(AtomicBool::new(false)),
            deadline,
        }
    }

    /// Context for start/stop hooks: no deadline.
    pub fn background() -> Self {
        Self::new(None)
    }

    pub fn is_cancelled(&self) -> bool {
        self.expired.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Mark the call as past its soft timeout.
    pub(crate) fn expire(&self) {
        self.expired.store(true, Ordering::Relaxed);
    }
}

/// A unit of work applied to each record.
///
/// `start` and `stop` are optional: they run once per executor around the run, with the
/// configured worker payload.
pub trait Worker: Send + Sync {
    fn send(&self, ctx: &CallContext, payload: &Payload) -> Result<Payload>;

    fn start(&self, _ctx: &CallContext, _payload: &Payload) -> Result<()> {
        Ok(())
    }

    fn stop(&self, _ctx: &CallContext, _payload: &Payload) -> Result<()> {
        Ok(())
    }
}

/// Factory producing a fresh worker instance (one per executor).
pub type WorkerFactory = Box<dyn Fn() -> Box<dyn Worker> + Send + Sync>;

/// Maps worker type keys to factories.
pub struct WorkerRegistry {
    factories: HashMap<String, WorkerFactory>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in workers (`dummy`, `fail`).
    pub fn with_defaults() -> Self {
        let mut r = Self::new();
        crate::workers::register_builtin(&mut r);
        r
    }

    /// Register (or replace) the factory for `key`.
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Worker> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Box::new(factory));
    }

    pub fn create(&self, key: &str) -> Result<Box<dyn Worker>> {
        let factory = self.factories.get(key).ok_or_else(|| {
            anyhow!(
                "Unknown worker type: '{}'. Registered types: {:?}",
                key,
                self.types()
            )
        })?;
        Ok(factory())
    }

    pub fn has(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("worker_types", &self.types())
            .finish()
    }
}
