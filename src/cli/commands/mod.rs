//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - run() function to execute the command

use std::io::Read;
use std::path::Path;

use clap::Subcommand;

pub mod advise;
pub mod estimate;
pub mod export;
pub mod names;
pub mod next;

use crate::app::AppContext;
use crate::error::Result;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Next gating decision for a worker history
    Next(next::NextArgs),

    /// Write the worker POMDP in a solver input format
    Export(export::ExportArgs),

    /// List state, action and observation names
    Names(names::NamesArgs),

    /// Estimate model parameters from worker histories
    Estimate(estimate::EstimateArgs),

    /// Work decision from a solved POMDP policy
    Advise(advise::AdviseArgs),
}

/// Dispatch a command to its handler
pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Next(args) => next::run(ctx, args),
        Commands::Export(args) => export::run(ctx, args),
        Commands::Names(args) => names::run(ctx, args),
        Commands::Estimate(args) => estimate::run(ctx, args),
        Commands::Advise(args) => advise::run(ctx, args),
    }
}

/// Read a file, or stdin for `-`.
pub(crate) fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        return Ok(raw);
    }
    Ok(std::fs::read_to_string(path)?)
}
