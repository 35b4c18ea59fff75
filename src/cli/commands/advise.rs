//! crowdgate advise - Work decision from a solved POMDP policy

use std::path::PathBuf;

use clap::Args;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::config::ModelConfig;
use crate::error::{GateError, Result};
use crate::gating::{Gate, GateHistory};
use crate::model::PomdpModel;
use crate::policy::{AlphaPolicy, PolicyAdvisor, PolicyFormat, solver};

use super::next::describe;
use super::read_input;

#[derive(Args, Debug)]
pub struct AdviseArgs {
    /// Gating history JSON (`-` for stdin)
    pub history: PathBuf,

    /// Solve the model with the configured solver before deciding
    #[arg(long, conflicts_with = "policy")]
    pub resolve: bool,

    /// Previously solved policy, in the configured solver's format
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// Seed for tie-breaking and the batch shuffle
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run(ctx: &AppContext, args: &AdviseArgs) -> Result<()> {
    let history = GateHistory::from_json(&read_input(&args.history)?)?;
    let accuracy = ctx.config.gating.desired_accuracy;

    let advisor = if args.resolve {
        PolicyAdvisor::resolving(solver::from_config(&ctx.config.solver)?)
    } else {
        let path = args.policy.as_ref().ok_or_else(|| {
            GateError::Config("advise needs --policy or --resolve".to_string())
        })?;
        let model = PomdpModel::from_config(&ModelConfig::for_accuracy(accuracy))?;
        let format = PolicyFormat::for_solver(ctx.config.solver.kind);
        PolicyAdvisor::with_policy(AlphaPolicy::load(path, format, model.n_states())?)
    };

    let gate = Gate::new(ctx.config.gating.clone())?
        .with_advisor(Box::new(advisor.with_seed(args.seed)));
    let decision = gate.next(&history, args.seed)?;

    if ctx.robot_mode() {
        return emit_robot(&robot_ok(decision));
    }
    let mut layout = HumanLayout::new();
    layout.kv("decision", &describe(decision));
    emit_human(layout);
    Ok(())
}
