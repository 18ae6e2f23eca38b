//! Application configuration constants and the validated engine config.
//! Tuning and defaults in one place.

use anyhow::{Result, bail};
use std::sync::OnceLock;
use std::time::Duration;

use crate::Opts;
use crate::engine::rate::validate_rate;
use crate::types::Payload;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    env_prefix: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!("{pkg}.toml"),
                env_prefix: format!("{}_", pkg.to_uppercase()),
            }
        })
    }

    /// Crate name; also the log target and the tag on log lines.
    pub fn pkg_name(&self) -> &'static str {
        self.pkg_name
    }

    /// Config file looked up in the working directory when `--config` isn't given.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Prefix for environment overrides, e.g. `BLASTER_RATE`.
    pub fn env_prefix(&self) -> &str {
        &self.env_prefix
    }
}

// ---- Defaults ----

pub struct Defaults;

impl Defaults {
    pub const WORKERS: usize = 10;
    /// Records per second.
    pub const RATE: f64 = 1.0;
    pub const SOFT_TIMEOUT_MS: u64 = 1_000;
    pub const HARD_TIMEOUT_MS: u64 = 10_000;
    pub const STATUS_INTERVAL_MS: u64 = 10_000;
}

// ---- Channels ----

/// Capacity of the executor → log writer queue.
pub const LOG_CHANNEL_CAP: usize = 1_000;

/// Column holding the hex fingerprint in the result log.
pub const HASH_COLUMN: &str = "hash";

// ---- Engine config ----

/// Validated settings the engine runs with. Built from [`Opts`] by [`EngineConfig::from_opts`].
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub worker_type: String,
    pub workers: usize,
    pub rate: f64,
    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
    pub status_interval: Duration,
    pub payload_template: Option<Payload>,
    pub worker_payload: Payload,
    pub log_output: Vec<String>,
}

impl EngineConfig {
    /// Check required fields and ranges. Every failure here is a startup error.
    pub fn from_opts(opts: &Opts) -> Result<Self> {
        let Some(worker_type) = opts.worker_type.clone().filter(|s| !s.trim().is_empty()) else {
            bail!("No worker type specified. Set worker_type in the config or use --worker.");
        };
        if opts.workers == 0 {
            bail!("workers must be at least 1");
        }
        let rate = validate_rate(opts.rate)?;
        if opts.soft_timeout_ms == 0 || opts.hard_timeout_ms == 0 {
            bail!("timeouts must be greater than zero");
        }
        if opts.hard_timeout_ms < opts.soft_timeout_ms {
            bail!(
                "hard timeout ({}ms) is shorter than soft timeout ({}ms)",
                opts.hard_timeout_ms,
                opts.soft_timeout_ms
            );
        }
        if opts.status_interval_ms == 0 {
            bail!("status interval must be greater than zero");
        }
        Ok(Self {
            worker_type,
            workers: opts.workers,
            rate,
            soft_timeout: Duration::from_millis(opts.soft_timeout_ms),
            hard_timeout: Duration::from_millis(opts.hard_timeout_ms),
            status_interval: Duration::from_millis(opts.status_interval_ms),
            payload_template: opts.payload_template.clone(),
            worker_payload: opts.worker_payload.clone(),
            log_output: opts.log_output.clone(),
        })
    }
}
