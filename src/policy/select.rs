//! Choosing an action from a solver's value table.

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::debug;

use crate::error::{GateError, Result};
use crate::model::PomdpModel;

use super::explore::{ExplorationSchedule, ExploreContext};

/// Values within this distance of the maximum count as ties.
pub const TIE_TOLERANCE: f64 = 1e-12;

/// Best valid action in `values`, ties broken uniformly with `rng`.
///
/// Fails when no valid action has a value, and when some invalid action
/// beats every valid one, which means the policy and model disagree.
pub fn select_action<R: Rng + ?Sized>(
    values: &BTreeMap<usize, f64>,
    valid: &[usize],
    rng: &mut R,
) -> Result<usize> {
    let candidates: Vec<(usize, f64)> = valid
        .iter()
        .filter_map(|a| values.get(a).map(|v| (*a, *v)))
        .collect();
    let Some(&(best_valid, best_valid_value)) = candidates
        .iter()
        .max_by(|x, y| x.1.total_cmp(&y.1))
    else {
        return Err(GateError::NoValidAction);
    };
    if let Some((&best, &best_value)) = values.iter().max_by(|x, y| x.1.total_cmp(y.1)) {
        if best_value > best_valid_value + TIE_TOLERANCE {
            return Err(GateError::PolicyDesync {
                best,
                best_value,
                best_valid,
                best_valid_value,
            });
        }
    }

    let ties: Vec<usize> = candidates
        .iter()
        .filter(|(_, v)| (best_valid_value - v).abs() <= TIE_TOLERANCE)
        .map(|(a, _)| *a)
        .collect();
    Ok(ties.choose(rng).copied().unwrap_or(best_valid))
}

/// Action selection against a model, with optional exploration.
#[derive(Debug, Clone)]
pub struct ActionSelector<'a> {
    model: &'a PomdpModel,
    exploration: ExplorationSchedule,
    explore_actions: Option<Vec<usize>>,
}

impl<'a> ActionSelector<'a> {
    #[must_use]
    pub const fn new(model: &'a PomdpModel) -> Self {
        Self {
            model,
            exploration: ExplorationSchedule::Never,
            explore_actions: None,
        }
    }

    #[must_use]
    pub fn with_exploration(mut self, schedule: ExplorationSchedule) -> Self {
        self.exploration = schedule;
        self
    }

    /// Restrict exploratory picks to these actions; defaults to every valid one.
    #[must_use]
    pub fn with_explore_actions(mut self, actions: Vec<usize>) -> Self {
        self.explore_actions = Some(actions);
        self
    }

    /// Pick the next action after `last` from a value table.
    pub fn select<R: Rng + ?Sized>(
        &self,
        values: &BTreeMap<usize, f64>,
        last: Option<usize>,
        ctx: ExploreContext,
        rng: &mut R,
    ) -> Result<usize> {
        let valid = self.model.valid_actions(last);
        let p = self.exploration.probability(ctx);
        if p > 0.0 && rng.random_bool(p) {
            let pool: Vec<usize> = match &self.explore_actions {
                Some(allowed) => valid.iter().copied().filter(|a| allowed.contains(a)).collect(),
                None => valid.clone(),
            };
            if let Some(a) = pool.choose(rng) {
                debug!(action = *a, p, "exploratory action");
                return Ok(*a);
            }
        }
        select_action(values, &valid, rng)
    }
}
