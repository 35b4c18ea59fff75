//! crowdgate estimate - Baum-Welch parameter estimation

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_robot, robot_ok};
use crate::error::Result;
use crate::inference::{Estimator, History, TyingCandidate, select_tying};
use crate::model::PomdpModel;

use super::read_input;

#[derive(Args, Debug)]
pub struct EstimateArgs {
    /// Worker histories JSON: workers of `[action, observation]` pairs (`-` for stdin)
    pub histories: PathBuf,

    /// Random restarts drawn from the prior
    #[arg(long)]
    pub restarts: Option<usize>,

    /// Prior variant name
    #[arg(long)]
    pub prior: Option<String>,

    /// Base seed for restarts
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run restarts one after another
    #[arg(long)]
    pub sequential: bool,

    /// Replace the estimate with a posterior sample
    #[arg(long)]
    pub thompson: bool,

    /// Fit every shared/per-class tying of the worker parameters and rank by BIC
    #[arg(long)]
    pub select_tying: bool,
}

#[derive(Serialize)]
struct EstimateReport {
    params: BTreeMap<String, Vec<f64>>,
    log_likelihood: f64,
    bic: f64,
    iterations: usize,
    restart: usize,
}

pub fn run(ctx: &AppContext, args: &EstimateArgs) -> Result<()> {
    let model = PomdpModel::from_config(&ctx.config.model)?;
    let history = History::from_json(&read_input(&args.histories)?)?;

    let mut config = ctx.config.estimator.clone();
    if let Some(restarts) = args.restarts {
        config.restarts = restarts;
    }
    if let Some(prior) = &args.prior {
        config.prior.clone_from(prior);
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.sequential {
        config.parallel = false;
    }
    if args.thompson {
        config.thompson = true;
    }
    config.validate()?;

    if args.select_tying {
        let candidates = select_tying(&model.params, &history, &config)?;
        return report_tying(ctx, candidates);
    }

    let estimator = Estimator::from_config(&model, &config)?;
    let estimate = estimator.estimate(&history)?;

    let mut params = model.params.clone();
    params.values.clone_from(&estimate.values);
    let report = EstimateReport {
        params: params.to_config(),
        log_likelihood: estimate.log_likelihood,
        bic: estimate.bic_score(&params, &history),
        iterations: estimate.trace.len().saturating_sub(1),
        restart: estimate.restart,
    };

    if ctx.robot_mode() {
        return emit_robot(&robot_ok(report));
    }
    let mut layout = HumanLayout::new();
    layout
        .title("Estimate")
        .kv("log-likelihood", &format!("{:.4}", report.log_likelihood))
        .kv("bic", &format!("{:.4}", report.bic))
        .kv("iterations", &report.iterations.to_string())
        .kv("restart", &report.restart.to_string());
    layout.section("Parameters");
    for (name, values) in &report.params {
        let rendered: Vec<String> = values.iter().map(|v| format!("{v:.4}")).collect();
        layout.kv(name, &rendered.join(" "));
    }
    emit_human(layout);
    Ok(())
}

fn report_tying(ctx: &AppContext, candidates: Vec<TyingCandidate>) -> Result<()> {
    if ctx.robot_mode() {
        return emit_robot(&robot_ok(candidates));
    }
    let mut layout = HumanLayout::new();
    layout.title("Tying selection");
    for (rank, candidate) in candidates.iter().enumerate() {
        layout.push_line(format!(
            "{:>2}. {:<48} ll {:>12.4}  bic {:>12.4}",
            rank + 1,
            candidate.name,
            candidate.log_likelihood,
            candidate.bic_score
        ));
    }
    if let Some(best) = candidates.first() {
        layout.section("Best parameters");
        for (name, values) in &best.params {
            let rendered: Vec<String> = values.iter().map(|v| format!("{v:.4}")).collect();
            layout.kv(name, &rendered.join(" "));
        }
    }
    emit_human(layout);
    Ok(())
}
