//! crowdgate export - Write the worker POMDP for a solver

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use tracing::info;

use crate::app::AppContext;
use crate::cli::output::{emit_robot, robot_ok};
use crate::error::Result;
use crate::model::PomdpModel;
use crate::model::export::{write_pomdp, write_txt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Cassandra `.pomdp` (APPL, ZMDP)
    Pomdp,
    /// AI-Toolbox dense text
    Txt,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    #[arg(long, value_enum, default_value = "pomdp")]
    pub format: ExportFormat,

    /// Discount factor (defaults to the solver config)
    #[arg(long)]
    pub discount: Option<f64>,

    /// Output file (stdout otherwise)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub fn run(ctx: &AppContext, args: &ExportArgs) -> Result<()> {
    let model = PomdpModel::from_config(&ctx.config.model)?;
    let discount = args.discount.unwrap_or(ctx.config.solver.discount);
    let rendered = match args.format {
        ExportFormat::Pomdp => write_pomdp(&model, discount)?,
        ExportFormat::Txt => write_txt(&model)?,
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)?;
            info!(path = %path.display(), format = ?args.format, "exported model");
            if ctx.robot_mode() {
                emit_robot(&robot_ok(serde_json::json!({
                    "path": path,
                    "states": model.n_states(),
                    "actions": model.n_actions(),
                    "observations": model.n_observations(),
                })))?;
            }
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
