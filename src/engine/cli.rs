//! CLI command handler: merge config layers, hook Ctrl+C, run, report.

use anyhow::{Context, Result};
use log::debug;
use std::process::ExitCode;

use crate::Opts;
use crate::engine::arg_parser::Cli;
use crate::engine::registry::WorkerRegistry;
use crate::run::blast_files;
use crate::utils::blaster_toml::{apply_env_to_opts, apply_file_to_opts, load_blaster_toml};
use crate::utils::output::SharedOutput;
use crate::utils::setup_logging;

/// Apply CLI flags on top of `opts` (highest precedence).
pub fn apply_cli_to_opts(cli: &Cli, opts: &mut Opts) {
    if let Some(ref d) = cli.data {
        opts.data = Some(d.clone());
    }
    if let Some(ref l) = cli.log {
        opts.log = Some(l.clone());
    }
    if let Some(ref w) = cli.worker {
        opts.worker_type = Some(w.clone());
    }
    if let Some(n) = cli.workers {
        opts.workers = n;
    }
    if let Some(r) = cli.rate {
        opts.rate = r;
    }
    if let Some(ms) = cli.soft_timeout {
        opts.soft_timeout_ms = ms;
    }
    if let Some(ms) = cli.hard_timeout {
        opts.hard_timeout_ms = ms;
    }
    if let Some(ms) = cli.status_interval {
        opts.status_interval_ms = ms;
    }
    if cli.no_resume {
        opts.resume = false;
    }
    if cli.no_rate_input {
        opts.rate_input = false;
    }
    if let Some(v) = cli.verbose {
        opts.verbose = v;
    }
}

/// Defaults → config file → environment → CLI.
pub fn resolve_opts(cli: &Cli) -> Result<Opts> {
    let mut opts = Opts::default();
    if let Some(file) = load_blaster_toml(cli.config.as_deref())? {
        apply_file_to_opts(&file, &mut opts);
    }
    apply_env_to_opts(&mut opts, |k| std::env::var(k).ok())?;
    apply_cli_to_opts(cli, &mut opts);
    Ok(opts)
}

/// Run the CLI. Exit code 1 when the run ended with a fatal error.
pub fn handle_run(cli: &Cli) -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let opts = resolve_opts(cli)?;
    setup_logging(opts.verbose);
    let registry = WorkerRegistry::with_defaults();

    if cli.list_workers {
        for t in registry.types() {
            println!("{t}");
        }
        return Ok(ExitCode::SUCCESS);
    }
    if cli.print_config {
        print!("{}", toml::to_string(&opts).context("render config")?);
        return Ok(ExitCode::SUCCESS);
    }
    debug!("{:#?}", opts);

    let summary = blast_files(&opts, registry, SharedOutput::stdout(), |cancel| {
        ctrlc::set_handler(move || {
            cancel.cancel();
        })
        .context("set Ctrl+C handler")
    })?;
    Ok(if summary.fatal_error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
