//! crowdgate next - Next gating decision for a worker

use std::path::PathBuf;

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::error::Result;
use crate::gating::{Gate, GateDecision, GateHistory};

use super::read_input;

#[derive(Args, Debug)]
pub struct NextArgs {
    /// Gating history JSON (`-` for stdin)
    pub history: PathBuf,

    /// Seed for the batch shuffle; overrides the configured seed
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run(ctx: &AppContext, args: &NextArgs) -> Result<()> {
    let history = GateHistory::from_json(&read_input(&args.history)?)?;
    let gate = Gate::new(ctx.config.gating.clone())?;
    let decision = gate.next(&history, args.seed)?;

    if ctx.robot_mode() {
        return emit_robot(&robot_ok(decision));
    }
    let mut layout = HumanLayout::new();
    layout.kv("decision", &describe(decision));
    emit_human(layout);
    Ok(())
}

pub(crate) fn describe(decision: Option<GateDecision>) -> String {
    match decision {
        Some(GateDecision::Tutorial(i)) => format!("tutorial {i}"),
        Some(GateDecision::Screening(i)) => format!("screening {i}"),
        Some(GateDecision::Test(true)) => "test".to_string(),
        Some(GateDecision::Test(false)) => "work".to_string(),
        None => "dismiss".to_string(),
    }
}
