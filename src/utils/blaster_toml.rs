//! Load `blaster.toml` and `BLASTER_*` environment overrides (CLI only).
//! Lib callers build [`Opts`]/[`EngineConfig`](crate::utils::config::EngineConfig) themselves.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::Opts;
use crate::types::Payload;
use crate::utils::config::PackagePaths;

#[derive(Debug, Deserialize)]
pub struct BlasterToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsSection {
    data: Option<String>,
    log: Option<String>,
    resume: Option<bool>,
    worker_type: Option<String>,
    workers: Option<usize>,
    rate: Option<f64>,
    soft_timeout_ms: Option<u64>,
    hard_timeout_ms: Option<u64>,
    status_interval_ms: Option<u64>,
    rate_input: Option<bool>,
    verbose: Option<bool>,
    payload_template: Option<Payload>,
    worker_payload: Option<Payload>,
    log_output: Option<Vec<String>>,
}

/// Load the config file. An explicit path must exist; the default one is optional.
pub fn load_blaster_toml(explicit: Option<&Path>) -> Result<Option<BlasterToml>> {
    let (path, required) = match explicit {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(PackagePaths::get().config_filename()), false),
    };
    let s = match std::fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read config {}", path.display())),
    };
    let parsed = parse_blaster_toml(&s).with_context(|| format!("parse {}", path.display()))?;
    log::debug!("loaded config from {}", path.display());
    Ok(Some(parsed))
}

pub fn parse_blaster_toml(s: &str) -> Result<BlasterToml> {
    toml::from_str(s).map_err(|e| anyhow!("{}", e))
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $field:ident) => {
        if let Some(v) = $sec.$field.clone() {
            $opts.$field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before env and CLI.
pub fn apply_file_to_opts(file: &BlasterToml, opts: &mut Opts) {
    let sec = &file.settings;
    if let Some(ref p) = sec.data {
        opts.data = Some(PathBuf::from(p));
    }
    if let Some(ref p) = sec.log {
        opts.log = Some(PathBuf::from(p));
    }
    if let Some(ref w) = sec.worker_type {
        opts.worker_type = Some(w.clone());
    }
    if let Some(ref t) = sec.payload_template {
        opts.payload_template = Some(t.clone());
    }
    apply_file_opt!(sec, opts, resume);
    apply_file_opt!(sec, opts, workers);
    apply_file_opt!(sec, opts, rate);
    apply_file_opt!(sec, opts, soft_timeout_ms);
    apply_file_opt!(sec, opts, hard_timeout_ms);
    apply_file_opt!(sec, opts, status_interval_ms);
    apply_file_opt!(sec, opts, rate_input);
    apply_file_opt!(sec, opts, verbose);
    apply_file_opt!(sec, opts, worker_payload);
    apply_file_opt!(sec, opts, log_output);
}

/// Parse one `BLASTER_*` value, naming the variable in the error.
fn parse_env<T>(prefix: &str, key: &str, v: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    v.trim()
        .parse()
        .with_context(|| format!("{prefix}{key}={v}"))
}

/// Booleans also accept `1`/`0` and `yes`/`no`.
fn parse_env_bool(prefix: &str, key: &str, v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(anyhow!("{prefix}{key}={v}: expected true or false")),
    }
}

/// Apply `BLASTER_*` overrides through `lookup` (normally `std::env::var`). Bad values are errors.
pub fn apply_env_to_opts<F>(opts: &mut Opts, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = PackagePaths::get().env_prefix();
    let get = |key: &str| lookup(&format!("{prefix}{key}")).filter(|v| !v.trim().is_empty());
    if let Some(v) = get("DATA") {
        opts.data = Some(PathBuf::from(v));
    }
    if let Some(v) = get("LOG") {
        opts.log = Some(PathBuf::from(v));
    }
    if let Some(v) = get("WORKER_TYPE") {
        opts.worker_type = Some(v);
    }
    if let Some(v) = get("WORKERS") {
        opts.workers = parse_env(prefix, "WORKERS", &v)?;
    }
    if let Some(v) = get("RATE") {
        opts.rate = parse_env(prefix, "RATE", &v)?;
    }
    if let Some(v) = get("SOFT_TIMEOUT_MS") {
        opts.soft_timeout_ms = parse_env(prefix, "SOFT_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = get("HARD_TIMEOUT_MS") {
        opts.hard_timeout_ms = parse_env(prefix, "HARD_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = get("STATUS_INTERVAL_MS") {
        opts.status_interval_ms = parse_env(prefix, "STATUS_INTERVAL_MS", &v)?;
    }
    if let Some(v) = get("RESUME") {
        opts.resume = parse_env_bool(prefix, "RESUME", &v)?;
    }
    if let Some(v) = get("RATE_INPUT") {
        opts.rate_input = parse_env_bool(prefix, "RATE_INPUT", &v)?;
    }
    Ok(())
}
