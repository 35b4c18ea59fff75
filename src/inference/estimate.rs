//! Baum-Welch parameter estimation with Dirichlet priors.
//!
//! Each E-step runs forward-backward in log space over every worker history
//! and scatters the normalized marginals into expected sufficient
//! statistics. The M-step adds those counts to the prior pseudo-counts
//! through the model's exponent decomposition and takes the Dirichlet mode.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::EstimatorConfig;
use crate::error::{GateError, Result};
use crate::model::math::{dirichlet_ln_pdf, dirichlet_mode, log_sum_exp, sample_dirichlet};
use crate::model::pomdp::{Factors, ModelTables};
use crate::model::prior::{self, PriorVariant};
use crate::model::{ParamValues, Params, PomdpModel};

use super::history::History;

/// Log-likelihood may dip by rounding alone.
const LL_TOLERANCE: f64 = 1e-9;

/// Expected sufficient statistics from one E-step.
#[derive(Debug, Clone)]
pub struct Statistics {
    /// `[s][a][s1]`
    pub transition: Vec<f64>,
    /// `[s][a][o]`, `s` being the state reached.
    pub observation: Vec<f64>,
    pub initial: Vec<f64>,
    /// Data log-likelihood plus log prior density of the parameters.
    pub log_likelihood: f64,
}

/// Result of one EM run, or the best of several.
#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    pub values: ParamValues,
    /// Posterior Dirichlet counts behind `values`.
    pub counts: ParamValues,
    /// Log-likelihood of `values`, which are a posterior sample rather than
    /// the MAP estimate when Thompson sampling is on.
    pub log_likelihood: f64,
    /// Log-likelihood after every accepted iteration, starting with the
    /// initial parameters.
    pub trace: Vec<f64>,
    pub restart: usize,
}

impl Estimate {
    /// Log-likelihood minus the BIC penalty of `params`' tying.
    #[must_use]
    pub fn bic_score(&self, params: &Params, history: &History) -> f64 {
        self.log_likelihood - params.bic_penalty(history.n_workers(), history.total_steps())
    }
}

/// Symbolic model structure, fixed for a given set of spaces and tying.
struct Structure {
    start: Vec<Factors>,
    transition: Vec<Factors>,
    observation: Vec<Factors>,
}

pub struct Estimator<'a> {
    model: &'a PomdpModel,
    hyper: ParamValues,
    config: EstimatorConfig,
    structure: Structure,
}

impl<'a> Estimator<'a> {
    pub fn new(model: &'a PomdpModel, variant: &PriorVariant, config: EstimatorConfig) -> Result<Self> {
        let (n_s, n_a, n_o) = (model.n_states(), model.n_actions(), model.n_observations());
        let mut structure = Structure {
            start: Vec::with_capacity(n_s),
            transition: Vec::with_capacity(n_s * n_a * n_s),
            observation: Vec::with_capacity(n_s * n_a * n_o),
        };
        for s in 0..n_s {
            structure.start.push(model.start_factors(s)?);
            for a in 0..n_a {
                for s1 in 0..n_s {
                    structure.transition.push(model.transition_factors(s, a, s1)?);
                }
                for o in 0..n_o {
                    structure.observation.push(model.observation_factors(s, a, o)?);
                }
            }
        }
        Ok(Self {
            model,
            hyper: variant.hyperparams(&model.params),
            config,
            structure,
        })
    }

    /// Estimator with the prior variant named in `config`.
    pub fn from_config(model: &'a PomdpModel, config: &EstimatorConfig) -> Result<Self> {
        let variant = prior::variant(&config.prior)?;
        Self::new(model, variant, config.clone())
    }

    #[must_use]
    pub const fn hyperparams(&self) -> &ParamValues {
        &self.hyper
    }

    fn tables(&self, values: &ParamValues) -> Result<ModelTables> {
        let eval = |factors: &[Factors]| -> Result<Vec<f64>> {
            factors.iter().map(|f| f.evaluate(values)).collect()
        };
        Ok(ModelTables {
            n_states: self.model.n_states(),
            n_actions: self.model.n_actions(),
            n_observations: self.model.n_observations(),
            transition: eval(&self.structure.transition)?,
            observation: eval(&self.structure.observation)?,
            start: eval(&self.structure.start)?,
            reward: Vec::new(),
        })
    }

    /// Forward-backward over every worker and the resulting statistics.
    pub fn e_step(&self, history: &History, values: &ParamValues) -> Result<Statistics> {
        history.validate(self.model)?;
        let tables = self.tables(values)?;
        let (n_s, n_a, n_o) = (tables.n_states, tables.n_actions, tables.n_observations);
        let ln_t: Vec<f64> = tables.transition.iter().map(|p| p.ln()).collect();
        let ln_o: Vec<f64> = tables.observation.iter().map(|p| p.ln()).collect();
        let ln_t_at = |s: usize, a: usize, s1: usize| ln_t[(s * n_a + a) * n_s + s1];
        let ln_o_at = |s1: usize, a: usize, o: usize| ln_o[(s1 * n_a + a) * n_o + o];

        let mut stats = Statistics {
            transition: vec![0.0; n_s * n_a * n_s],
            observation: vec![0.0; n_s * n_a * n_o],
            initial: vec![0.0; n_s],
            log_likelihood: 0.0,
        };

        for (worker, records) in history.workers().iter().enumerate() {
            let steps = records.len();
            if steps == 0 {
                continue;
            }

            let mut alpha = vec![vec![f64::NEG_INFINITY; n_s]; steps + 1];
            let mut beta = vec![vec![0.0; n_s]; steps + 1];
            for (s, p) in tables.start.iter().enumerate() {
                alpha[0][s] = p.ln();
            }

            for (t, record) in records.iter().enumerate() {
                let (a, o) = (record.action, record.observation);
                for s1 in 0..n_s {
                    let emit = ln_o_at(s1, a, o);
                    alpha[t + 1][s1] = if emit == f64::NEG_INFINITY {
                        f64::NEG_INFINITY
                    } else {
                        log_sum_exp((0..n_s).map(|s| alpha[t][s] + ln_t_at(s, a, s1))) + emit
                    };
                }
            }

            for (t, record) in records.iter().enumerate().rev() {
                let (a, o) = (record.action, record.observation);
                for s in 0..n_s {
                    beta[t][s] = log_sum_exp(
                        (0..n_s).map(|s1| beta[t + 1][s1] + ln_t_at(s, a, s1) + ln_o_at(s1, a, o)),
                    );
                }
            }

            let worker_ll = log_sum_exp(alpha[steps].iter().copied());
            if worker_ll == f64::NEG_INFINITY || worker_ll.is_nan() {
                return Err(GateError::DegenerateHistory { worker });
            }
            stats.log_likelihood += worker_ll;

            for t in 0..=steps {
                let joint: Vec<f64> = (0..n_s).map(|s| alpha[t][s] + beta[t][s]).collect();
                let norm = log_sum_exp(joint.iter().copied());
                for (s, ln_m) in joint.iter().enumerate() {
                    let m = (ln_m - norm).exp();
                    if m == 0.0 {
                        continue;
                    }
                    if t == 0 {
                        stats.initial[s] += m;
                    } else {
                        let record = records[t - 1];
                        stats.observation[(s * n_a + record.action) * n_o + record.observation] += m;
                    }
                }
            }

            let mut pair = vec![f64::NEG_INFINITY; n_s * n_s];
            for (t, record) in records.iter().enumerate() {
                let (a, o) = (record.action, record.observation);
                for s in 0..n_s {
                    for s1 in 0..n_s {
                        pair[s * n_s + s1] =
                            alpha[t][s] + ln_t_at(s, a, s1) + ln_o_at(s1, a, o) + beta[t + 1][s1];
                    }
                }
                let norm = log_sum_exp(pair.iter().copied());
                for s in 0..n_s {
                    for s1 in 0..n_s {
                        let m = (pair[s * n_s + s1] - norm).exp();
                        if m > 0.0 {
                            stats.transition[(s * n_a + a) * n_s + s1] += m;
                        }
                    }
                }
            }
        }

        for (key, value) in values {
            if let Some(alpha) = self.hyper.get(key) {
                stats.log_likelihood += dirichlet_ln_pdf(value, alpha);
            }
        }
        Ok(stats)
    }

    /// Posterior counts from `stats`, and their Dirichlet modes.
    #[must_use]
    pub fn m_step(&self, stats: &Statistics) -> (ParamValues, ParamValues) {
        let mut counts = self.hyper.clone();
        let mut scatter = |factors: &Factors, weight: f64| {
            if weight == 0.0 {
                return;
            }
            if let Factors::Product(factors) = factors {
                for factor in factors {
                    if let Some(slot) = counts
                        .get_mut(&factor.key)
                        .and_then(|c| c.get_mut(factor.component))
                    {
                        *slot += weight;
                    }
                }
            }
        };
        for (factors, weight) in self.structure.start.iter().zip(&stats.initial) {
            scatter(factors, *weight);
        }
        for (factors, weight) in self.structure.transition.iter().zip(&stats.transition) {
            scatter(factors, *weight);
        }
        for (factors, weight) in self.structure.observation.iter().zip(&stats.observation) {
            scatter(factors, *weight);
        }

        let modes = counts
            .iter()
            .map(|(key, alpha)| (*key, dirichlet_mode(alpha)))
            .collect();
        (modes, counts)
    }

    /// EM from `init` until the relative improvement falls below the
    /// threshold, the likelihood stops improving, or the iteration cap.
    pub fn run_once(&self, history: &History, init: ParamValues, restart: usize) -> Result<Estimate> {
        let mut values = init;
        let mut stats = self.e_step(history, &values)?;
        let mut counts: Option<ParamValues> = None;
        let mut trace = vec![stats.log_likelihood];

        for iteration in 1..=self.config.max_iterations {
            let (next_values, next_counts) = self.m_step(&stats);
            let next_stats = self.e_step(history, &next_values)?;
            let previous = stats.log_likelihood;
            let current = next_stats.log_likelihood;

            if current < previous - LL_TOLERANCE {
                warn!(restart, iteration, previous, current, "EM step decreased log-likelihood");
                break;
            }

            let improvement = if previous == 0.0 {
                (current - previous).abs()
            } else {
                ((current - previous) / previous).abs()
            };
            debug!(restart, iteration, log_likelihood = current, improvement, "EM iteration");

            values = next_values;
            counts = Some(next_counts);
            stats = next_stats;
            trace.push(current);

            if improvement <= self.config.min_improvement {
                break;
            }
        }

        let counts = match counts {
            Some(counts) => counts,
            None => self.m_step(&stats).1,
        };
        Ok(Estimate {
            values,
            counts,
            log_likelihood: stats.log_likelihood,
            trace,
            restart,
        })
    }

    /// Best of the configured restarts: one from the model's current values
    /// (when enabled) and the rest from prior samples, each with its own
    /// seed. Runs restarts in parallel when enabled.
    pub fn estimate(&self, history: &History) -> Result<Estimate> {
        history.validate(self.model)?;
        let base_seed = self.config.seed.unwrap_or_else(rand::random);

        let mut starts: Vec<Option<u64>> = Vec::new();
        if self.config.last_params {
            starts.push(None);
        }
        starts.extend((0..self.config.restarts as u64).map(|i| Some(base_seed.wrapping_add(i))));

        let run = |(restart, seed): (usize, Option<u64>)| -> Result<Estimate> {
            let init = match seed {
                None => self.model.params.values.clone(),
                Some(seed) => self.sample_prior(&mut StdRng::seed_from_u64(seed))?,
            };
            let estimate = self.run_once(history, init, restart)?;
            info!(
                restart,
                seed,
                log_likelihood = estimate.log_likelihood,
                iterations = estimate.trace.len() - 1,
                "EM restart finished"
            );
            Ok(estimate)
        };

        let results: Vec<Result<Estimate>> = if self.config.parallel {
            starts.into_par_iter().enumerate().map(run).collect()
        } else {
            starts.into_iter().enumerate().map(run).collect()
        };

        let mut best: Option<Estimate> = None;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(estimate) => {
                    if best
                        .as_ref()
                        .is_none_or(|b| estimate.log_likelihood > b.log_likelihood)
                    {
                        best = Some(estimate);
                    }
                }
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        let mut best = match (best, first_error) {
            (Some(best), _) => best,
            (None, Some(err)) => return Err(err),
            (None, None) => {
                return Err(GateError::Estimation("no restarts configured".to_string()));
            }
        };

        if self.config.thompson {
            let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(self.config.restarts as u64));
            best.values = thompson_sample(&best.counts, &mut rng)?;
            best.log_likelihood = self.e_step(history, &best.values)?.log_likelihood;
            debug!(log_likelihood = best.log_likelihood, "posterior sample drawn");
        }
        info!(
            restart = best.restart,
            log_likelihood = best.log_likelihood,
            "selected estimate"
        );
        Ok(best)
    }

    /// Initial parameters drawn from the prior.
    pub fn sample_prior(&self, rng: &mut StdRng) -> Result<ParamValues> {
        thompson_sample(&self.hyper, rng)
    }
}

/// Draw every parameter from its Dirichlet counts.
pub fn thompson_sample(counts: &ParamValues, rng: &mut StdRng) -> Result<ParamValues> {
    counts
        .iter()
        .map(|(key, alpha)| Ok((*key, sample_dirichlet(alpha, rng)?)))
        .collect()
}
