//! Work-phase decisions from a POMDP policy.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::{GateError, Result};
use crate::gating::{GateDecision, WorkAdvisor};
use crate::inference::{BeliefTracker, History};
use crate::model::{Action, Observation, PomdpModel};

use super::alpha::AlphaPolicy;
use super::select::select_action;
use super::solver::Solver;

/// Translate a gating work history into model actions and observations.
///
/// Ungraded items are ordinary work with a null observation; graded items
/// are quizzes answered right or wrong.
pub fn work_history(model: &PomdpModel, work: &[Option<bool>]) -> Result<History> {
    let index = |action: &Action| {
        model
            .spaces
            .action_index(action)
            .ok_or_else(|| GateError::Config(format!("model has no action {action}")))
    };
    let observe = |observation: &Observation| {
        model
            .spaces
            .observation_index(observation)
            .ok_or_else(|| GateError::Config(format!("model has no observation {observation}")))
    };
    let ask = index(&Action::Ask(0))?;
    let quiz = index(&Action::Quiz(0))?;
    let null = observe(&Observation::Null)?;
    let right = observe(&Observation::Answers(vec![true]))?;
    let wrong = observe(&Observation::Answers(vec![false]))?;

    let mut history = History::new();
    history.new_worker();
    for item in work {
        match item {
            None => history.record(ask, null),
            Some(false) => history.record(quiz, wrong),
            Some(true) => history.record(quiz, right),
        }
    }
    Ok(history)
}

/// Map a chosen model action onto a gating decision.
pub fn decision_for(action: &Action) -> Result<Option<GateDecision>> {
    match action {
        Action::Quiz(_) => Ok(Some(GateDecision::Test(true))),
        Action::Ask(_) => Ok(Some(GateDecision::Test(false))),
        Action::Boot => Ok(None),
        Action::Teach { .. } => Err(GateError::Config(format!(
            "advisor cannot schedule teaching action {action}"
        ))),
    }
}

/// Advises test/work/dismiss from a solved policy for the accuracy-derived
/// default model.
pub struct PolicyAdvisor {
    policy: Option<AlphaPolicy>,
    solver: Option<Box<dyn Solver>>,
    seed: Option<u64>,
}

impl PolicyAdvisor {
    /// Use a policy solved ahead of time.
    #[must_use]
    pub const fn with_policy(policy: AlphaPolicy) -> Self {
        Self {
            policy: Some(policy),
            solver: None,
            seed: None,
        }
    }

    /// Solve the model on every call.
    #[must_use]
    pub fn resolving(solver: Box<dyn Solver>) -> Self {
        Self {
            policy: None,
            solver: Some(solver),
            seed: None,
        }
    }

    /// Seed tie-breaking between equally valued actions.
    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn policy_for(&self, model: &PomdpModel) -> Result<AlphaPolicy> {
        if let Some(solver) = &self.solver {
            debug!(solver = solver.name(), "resolving advisor policy");
            return solver.solve(model);
        }
        self.policy.clone().ok_or_else(|| {
            GateError::Config("advisor has neither a policy nor a solver".to_string())
        })
    }

    /// Model action chosen for `work` at `desired_accuracy`.
    pub fn choose(&self, work: &[Option<bool>], desired_accuracy: f64) -> Result<Action> {
        let model = PomdpModel::from_config(&ModelConfig::for_accuracy(desired_accuracy))?;
        let history = work_history(&model, work)?;
        let tracker = BeliefTracker::from_records(&model, history.current())?;
        let policy = self.policy_for(&model)?;
        let values = policy.action_values(tracker.belief())?;
        let valid = model.valid_actions(tracker.last_action());

        let chosen = match self.seed {
            Some(seed) => select_action(&values, &valid, &mut StdRng::seed_from_u64(seed))?,
            None => select_action(&values, &valid, &mut rand::rng())?,
        };
        let action = *model.spaces.action(chosen)?;
        debug!(%action, steps = work.len(), "advisor chose action");
        Ok(action)
    }
}

impl WorkAdvisor for PolicyAdvisor {
    fn advise(&self, work: &[Option<bool>], desired_accuracy: f64) -> Result<Option<GateDecision>> {
        decision_for(&self.choose(work, desired_accuracy)?)
    }
}
