//! Model selection over parameter tying.
//!
//! Every tieable family is either shared across worker classes or held per
//! class. Each combination is estimated on the same history and ranked by
//! BIC score.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::config::EstimatorConfig;
use crate::error::Result;
use crate::model::{ParamName, Params, PomdpModel};

use super::estimate::Estimator;
use super::history::History;

/// One tying layout and its fit.
#[derive(Debug, Clone, Serialize)]
pub struct TyingCandidate {
    pub name: String,
    /// Families tied across classes; every other varied family is per class.
    pub shared: Vec<ParamName>,
    pub log_likelihood: f64,
    pub bic_penalty: f64,
    pub bic_score: f64,
    /// Estimated parameters in flat list form.
    pub params: BTreeMap<String, Vec<f64>>,
}

/// Families whose tying is varied for `params`.
#[must_use]
pub fn varied_families(params: &Params) -> Vec<ParamName> {
    let mut families = vec![
        ParamName::PS,
        ParamName::PLose,
        ParamName::PSlip,
        ParamName::PGuess,
    ];
    if params.dims.explain {
        families.push(ParamName::PLearnExp);
    }
    if params.dims.tell {
        families.push(ParamName::PLearnTell);
    }
    families
}

/// `base` with each family in `families` tied when its bit in `mask` is set.
#[must_use]
pub fn with_tying(base: &Params, families: &[ParamName], mask: usize) -> (Params, Vec<ParamName>) {
    let mut params = base.clone();
    let mut shared = Vec::new();
    for (bit, &name) in families.iter().enumerate() {
        if mask & (1 << bit) != 0 {
            params.set_shared(name);
            shared.push(name);
        } else {
            params.set_not_shared(name);
        }
    }
    (params, shared)
}

fn candidate_name(n_classes: usize, shared: &[ParamName]) -> String {
    let mut name = format!("{n_classes}_classes");
    for family in shared {
        name.push_str(&format!("-{family}_shared"));
    }
    name
}

fn fit(
    params: Params,
    shared: Vec<ParamName>,
    history: &History,
    config: &EstimatorConfig,
) -> Result<TyingCandidate> {
    let model = PomdpModel::new(params);
    let estimate = Estimator::from_config(&model, config)?.estimate(history)?;
    let bic_penalty = model
        .params
        .bic_penalty(history.n_workers(), history.total_steps());

    let mut fitted = model.params.clone();
    fitted.values = estimate.values;
    let name = candidate_name(fitted.dims.n_worker_classes, &shared);
    info!(
        candidate = %name,
        log_likelihood = estimate.log_likelihood,
        bic_penalty,
        "tying candidate estimated"
    );
    Ok(TyingCandidate {
        name,
        shared,
        log_likelihood: estimate.log_likelihood,
        bic_penalty,
        bic_score: estimate.log_likelihood - bic_penalty,
        params: fitted.to_config(),
    })
}

/// Estimate every shared/per-class combination of the varied families and
/// return the candidates best BIC score first.
pub fn select_tying(
    base: &Params,
    history: &History,
    config: &EstimatorConfig,
) -> Result<Vec<TyingCandidate>> {
    config.validate()?;
    let families = varied_families(base);
    let layouts: Vec<(Params, Vec<ParamName>)> = (0..1usize << families.len())
        .map(|mask| with_tying(base, &families, mask))
        .collect();

    let fits: Vec<Result<TyingCandidate>> = if config.parallel {
        layouts
            .into_par_iter()
            .map(|(params, shared)| fit(params, shared, history, config))
            .collect()
    } else {
        layouts
            .into_iter()
            .map(|(params, shared)| fit(params, shared, history, config))
            .collect()
    };
    let mut candidates = fits.into_iter().collect::<Result<Vec<_>>>()?;
    candidates.sort_by(|a, b| b.bic_score.total_cmp(&a.bic_score));
    Ok(candidates)
}
