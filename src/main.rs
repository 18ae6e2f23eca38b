//! Blaster CLI: dispatch a CSV file to a worker at a controllable rate.

use anyhow::Result;
use blaster::engine::arg_parser::Cli;
use blaster::engine::handle_run;
use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> Result<ExitCode> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    let code = handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(code)
}
