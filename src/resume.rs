//! Resume filter: fingerprints of records completed by a previous run.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::engine::fingerprint::Fingerprint;

/// Read-only after load; safe to share across threads by reference.
#[derive(Debug, Default)]
pub struct SkipSet {
    done: HashSet<Fingerprint>,
}

impl SkipSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn should_skip(&self, fp: &Fingerprint) -> bool {
        self.done.contains(fp)
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// Replay a result log at `path`. A missing or empty file yields an empty set.
    pub fn load(path: &Path, data_headers: &[String]) -> Result<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no previous log at {}; nothing to resume", path.display());
                return Ok(Self::empty());
            }
            Err(e) => return Err(e).with_context(|| format!("open log {}", path.display())),
        };
        if file.metadata().map(|m| m.len() == 0).unwrap_or(false) {
            return Ok(Self::empty());
        }
        let set = Self::from_reader(file, data_headers)
            .with_context(|| format!("replay log {}", path.display()))?;
        if !set.is_empty() {
            info!("Resuming: {} records already done", set.len());
        }
        Ok(set)
    }

    /// Replay a result log: each row's data columns (in `data_headers` order) are re-fingerprinted.
    pub fn from_reader<R: Read>(r: R, data_headers: &[String]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(r);
        let log_headers = reader.headers()?.clone();
        let mut columns = Vec::with_capacity(data_headers.len());
        for h in data_headers {
            match log_headers.iter().position(|l| l == h) {
                Some(i) => columns.push(i),
                None => bail!("log is missing data column '{}'", h),
            }
        }
        let mut done = HashSet::new();
        for row in reader.records() {
            let row = row?;
            let values: Vec<&str> = columns
                .iter()
                .map(|&i| row.get(i).unwrap_or_default())
                .collect();
            done.insert(Fingerprint::of(&values));
        }
        Ok(Self { done })
    }
}

impl FromIterator<Fingerprint> for SkipSet {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        Self {
            done: iter.into_iter().collect(),
        }
    }
}
