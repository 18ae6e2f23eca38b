use clap::Parser;
use std::path::PathBuf;

/// Rate-controlled, resumable batch dispatcher.
#[derive(Clone, Debug, Default, Parser)]
#[command(name = "blaster")]
#[command(
    about = "Send every record of a CSV file to a worker at a controllable rate; resume from the result log."
)]
pub struct Cli {
    /// Config file. Default: `blaster.toml` in the working directory, if present.
    #[arg(long, short = 'C')]
    pub config: Option<PathBuf>,

    /// CSV data file (first row is the header).
    #[arg(long, short)]
    pub data: Option<PathBuf>,

    /// CSV result log; also read on start to skip records that are already done.
    #[arg(long, short)]
    pub log: Option<PathBuf>,

    /// Worker type to use (see --list-workers).
    #[arg(long, short)]
    pub worker: Option<String>,

    /// Number of concurrent workers.
    #[arg(long, short = 'n')]
    pub workers: Option<usize>,

    /// Initial rate in records per second (0 pauses; type a new rate on stdin while running).
    #[arg(long, short)]
    pub rate: Option<f64>,

    /// Soft timeout per worker call, in milliseconds.
    #[arg(long)]
    pub soft_timeout: Option<u64>,

    /// Hard timeout per worker call, in milliseconds. Must be >= soft timeout.
    #[arg(long)]
    pub hard_timeout: Option<u64>,

    /// Milliseconds between status lines.
    #[arg(long)]
    pub status_interval: Option<u64>,

    /// Don't skip records found in the log; dispatch everything again.
    #[arg(long)]
    pub no_resume: bool,

    /// Don't read rate changes from stdin.
    #[arg(long)]
    pub no_rate_input: bool,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Print the merged config as TOML and exit.
    #[arg(long)]
    pub print_config: bool,

    /// List registered worker types and exit.
    #[arg(long)]
    pub list_workers: bool,
}
