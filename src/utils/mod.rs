pub mod blaster_toml;
pub mod config;
pub mod logger;
pub mod output;

pub use config::*;
pub use logger::setup_logging;
pub use output::SharedOutput;
