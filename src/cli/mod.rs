//! Command-line interface.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

pub mod commands;
pub mod output;

pub use commands::Commands;
pub use output::OutputMode;

#[derive(Parser, Debug)]
#[command(
    name = "crowdgate",
    version,
    about = "Adaptive gating and POMDP worker-quality control for crowd work"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    pub robot: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to CROWDGATE_CONFIG, then the global and local files)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    #[must_use]
    pub const fn output_mode(&self) -> OutputMode {
        if self.robot {
            OutputMode::Robot
        } else {
            OutputMode::Human
        }
    }
}
