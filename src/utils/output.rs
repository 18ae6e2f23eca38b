//! Operator-facing output stream shared by the coordinator, rate prompt and status reporter.

use std::io::Write;
use std::sync::{Arc, Mutex};

/// Mutex-serialized writer. Stdout isn't guaranteed to keep lines whole under concurrent writers.
#[derive(Clone)]
pub struct SharedOutput {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SharedOutput {
    pub fn new<W: Write + Send + 'static>(w: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(w))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Write one line, waiting for the lock.
    pub fn line(&self, s: &str) {
        if let Ok(mut w) = self.inner.lock() {
            let _ = writeln!(w, "{s}");
            let _ = w.flush();
        }
    }

    /// Write one line only if nobody else holds the stream. Returns false if the line was dropped.
    pub fn try_line(&self, s: &str) -> bool {
        match self.inner.try_lock() {
            Ok(mut w) => {
                let _ = writeln!(w, "{s}");
                let _ = w.flush();
                true
            }
            Err(_) => false,
        }
    }
}
