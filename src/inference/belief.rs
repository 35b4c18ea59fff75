//! Bayesian belief updates.

use crate::error::{GateError, Result};
use crate::model::PomdpModel;

use super::history::Record;

/// `b'(s1) ∝ O(o | s1, a) · Σ_s T(s1 | s, a) · b(s)`.
///
/// Zero total mass means the observation is impossible under the model and
/// is reported as an error.
pub fn update_belief(model: &PomdpModel, belief: &[f64], a: usize, o: usize) -> Result<Vec<f64>> {
    let n_states = model.n_states();
    let mut next = Vec::with_capacity(n_states);
    for s1 in 0..n_states {
        let p_o = model.observation(s1, a, o)?;
        if p_o == 0.0 {
            next.push(0.0);
            continue;
        }
        let mut reach = 0.0;
        for (s, b) in belief.iter().enumerate() {
            if *b > 0.0 {
                reach += model.transition(s, a, s1)? * b;
            }
        }
        next.push(p_o * reach);
    }

    let total: f64 = next.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Err(GateError::DegenerateBelief {
            action: model.spaces.action(a)?.to_string(),
            observation: model.spaces.observation(o)?.to_string(),
        });
    }
    for b in &mut next {
        *b /= total;
    }
    Ok(next)
}

/// Belief over the current worker's latent state.
#[derive(Debug, Clone)]
pub struct BeliefTracker<'a> {
    model: &'a PomdpModel,
    belief: Vec<f64>,
    last_action: Option<usize>,
}

impl<'a> BeliefTracker<'a> {
    /// Start a new worker from the model's start belief.
    pub fn new(model: &'a PomdpModel) -> Result<Self> {
        Ok(Self {
            model,
            belief: model.start_belief()?,
            last_action: None,
        })
    }

    /// Replay a worker's full history from the start belief.
    pub fn from_records(model: &'a PomdpModel, records: &[Record]) -> Result<Self> {
        let mut tracker = Self::new(model)?;
        for record in records {
            tracker.update(record.action, record.observation)?;
        }
        Ok(tracker)
    }

    pub fn update(&mut self, a: usize, o: usize) -> Result<()> {
        self.belief = update_belief(self.model, &self.belief, a, o)?;
        self.last_action = Some(a);
        Ok(())
    }

    #[must_use]
    pub fn belief(&self) -> &[f64] {
        &self.belief
    }

    #[must_use]
    pub const fn last_action(&self) -> Option<usize> {
        self.last_action
    }

    /// Probability mass on the given worker class.
    #[must_use]
    pub fn class_probability(&self, class: usize) -> f64 {
        self.model
            .spaces
            .states
            .iter()
            .zip(&self.belief)
            .filter(|(st, _)| !st.term && st.worker_class == class)
            .map(|(_, b)| b)
            .sum()
    }
}
