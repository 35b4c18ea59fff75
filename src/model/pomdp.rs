//! Transition, observation and reward functions over the fixed spaces.
//!
//! Every probability is a product of parameter components. Each function
//! first builds that product symbolically as [`Factors`]; evaluating the
//! factors against a parameter set gives the probability, and counting them
//! gives the exponent decomposition used by the estimator.

use std::collections::BTreeMap;

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use serde::Serialize;

use crate::config::ModelConfig;
use crate::error::{GateError, Result};

use super::params::{ParamKey, ParamName, ParamValues, Params, lookup};
use super::reward::AnswerSample;
use super::space::{Action, Observation, Spaces, State, TeachMode};

/// Cost of an action that is not allowed in a state.
pub const INVALID_ACTION_COST: f64 = -1_000_000.0;

/// One component of one parameter distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Factor {
    pub key: ParamKey,
    pub component: usize,
}

/// Symbolic probability: impossible, or a product of factors (empty = 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Factors {
    Impossible,
    Product(Vec<Factor>),
}

impl Factors {
    const fn certain() -> Self {
        Self::Product(Vec::new())
    }

    pub fn evaluate(&self, values: &ParamValues) -> Result<f64> {
        match self {
            Self::Impossible => Ok(0.0),
            Self::Product(factors) => {
                let mut p = 1.0;
                for factor in factors {
                    let dist = lookup(values, &factor.key)?;
                    p *= dist.get(factor.component).copied().ok_or_else(|| {
                        GateError::MissingParameter(format!("{}[{}]", factor.key, factor.component))
                    })?;
                }
                Ok(p)
            }
        }
    }
}

/// Exponent counts per parameter, in the layout of the parameter itself.
pub type Exponents = BTreeMap<ParamKey, Vec<f64>>;

/// Dense model tables, indexed `[s][a][s1]`, `[s][a][o]` and `[s]`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelTables {
    pub n_states: usize,
    pub n_actions: usize,
    pub n_observations: usize,
    pub transition: Vec<f64>,
    pub observation: Vec<f64>,
    pub start: Vec<f64>,
    /// Empty unless rewards were requested.
    pub reward: Vec<f64>,
}

impl ModelTables {
    #[must_use]
    pub fn t(&self, s: usize, a: usize, s1: usize) -> f64 {
        self.transition[(s * self.n_actions + a) * self.n_states + s1]
    }

    #[must_use]
    pub fn o(&self, s: usize, a: usize, o: usize) -> f64 {
        self.observation[(s * self.n_actions + a) * self.n_observations + o]
    }

    #[must_use]
    pub fn r(&self, s: usize, a: usize, s1: usize) -> f64 {
        self.reward[(s * self.n_actions + a) * self.n_states + s1]
    }
}

/// Outcome of one simulated step.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub next_state: usize,
    pub observation: usize,
    pub cost: f64,
    pub reward: f64,
    pub answer: Option<AnswerSample>,
}

#[derive(Debug, Clone)]
pub struct PomdpModel {
    pub spaces: Spaces,
    pub params: Params,
}

impl PomdpModel {
    #[must_use]
    pub fn new(params: Params) -> Self {
        Self {
            spaces: Spaces::build(params.dims),
            params,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Ok(Self::new(Params::from_config(config)?))
    }

    #[must_use]
    pub fn n_states(&self) -> usize {
        self.spaces.n_states()
    }

    #[must_use]
    pub fn n_actions(&self) -> usize {
        self.spaces.n_actions()
    }

    #[must_use]
    pub fn n_observations(&self) -> usize {
        self.spaces.n_observations()
    }

    /// Actions allowed right after `last` (or at the start of a worker).
    #[must_use]
    pub fn valid_actions(&self, last: Option<usize>) -> Vec<usize> {
        let last = last.and_then(|a| self.spaces.actions.get(a));
        self.spaces
            .actions
            .iter()
            .enumerate()
            .filter(|(_, action)| action.valid_after(last))
            .map(|(i, _)| i)
            .collect()
    }

    // --- start ---

    pub fn start_factors(&self, s: usize) -> Result<Factors> {
        let st = self.spaces.state(s)?;
        Ok(self.start_factors_for(st))
    }

    fn start_factors_for(&self, st: &State) -> Factors {
        if st.term || st.is_quiz() {
            return Factors::Impossible;
        }
        let mut factors = vec![Factor {
            key: ParamKey::shared(ParamName::PWorker, None),
            component: st.worker_class,
        }];
        for (skill, &has) in st.skills.iter().enumerate() {
            factors.push(Factor {
                key: self.params.resolve(ParamName::PS, Some(skill), st),
                component: usize::from(!has),
            });
        }
        Factors::Product(factors)
    }

    pub fn start_probability(&self, s: usize) -> Result<f64> {
        self.start_factors(s)?.evaluate(&self.params.values)
    }

    pub fn start_belief(&self) -> Result<Vec<f64>> {
        self.start_belief_with(&self.params.values)
    }

    pub fn start_belief_with(&self, values: &ParamValues) -> Result<Vec<f64>> {
        (0..self.n_states())
            .map(|s| self.start_factors(s)?.evaluate(values))
            .collect()
    }

    pub fn start_exponents(&self, s: usize) -> Result<Exponents> {
        Ok(self.exponents(&self.start_factors(s)?))
    }

    // --- transition ---

    pub fn transition_factors(&self, s: usize, a: usize, s1: usize) -> Result<Factors> {
        let st = self.spaces.state(s)?;
        let act = self.spaces.action(a)?;
        let st1 = self.spaces.state(s1)?;

        if st.term {
            return Ok(if st1.term {
                Factors::certain()
            } else {
                Factors::Impossible
            });
        }

        let leave = self.params.resolve(ParamName::PLeave, None, st);
        let left = Factors::Product(vec![Factor {
            key: leave,
            component: 0,
        }]);

        let factors = match *act {
            Action::Boot => self.start_factors_for(st1),
            _ if !st1.term && st.worker_class != st1.worker_class => Factors::Impossible,
            Action::Ask(_) | Action::Quiz(_) => {
                if st1.term {
                    return Ok(left);
                }
                if st1.quiz != act.quiz_skill() || st.n_skills_learned(st1) > 0 {
                    return Ok(Factors::Impossible);
                }
                let mut factors = vec![Factor {
                    key: leave,
                    component: 1,
                }];
                for skill in (0..st.skills.len()).filter(|&k| st.has_skill(k)) {
                    factors.push(Factor {
                        key: self.params.resolve(ParamName::PLose, Some(skill), st),
                        component: usize::from(st1.has_skill(skill)),
                    });
                }
                Factors::Product(factors)
            }
            Action::Teach { skill, mode } if mode == TeachMode::Told || st.is_quiz() => {
                if st1.term {
                    return Ok(left);
                }
                let n_skills = st.skills.len();
                let taught: Vec<usize> = if self.params.dims.n_question_types > 1 {
                    (0..n_skills).collect()
                } else {
                    vec![skill]
                };
                let lost_taught = taught
                    .iter()
                    .any(|&k| st.has_skill(k) && !st1.has_skill(k));
                let learned_untaught = st
                    .skills_learned(st1)
                    .iter()
                    .any(|k| !taught.contains(k));
                if st1.is_quiz() || lost_taught || learned_untaught {
                    return Ok(Factors::Impossible);
                }

                let learn = match mode {
                    TeachMode::Explained => ParamName::PLearnExp,
                    TeachMode::Told => ParamName::PLearnTell,
                };
                let mut factors = vec![Factor {
                    key: leave,
                    component: 1,
                }];
                for k in 0..n_skills {
                    if taught.contains(&k) {
                        if !st.has_skill(k) {
                            factors.push(Factor {
                                key: self.params.resolve(learn, Some(k), st),
                                component: usize::from(!st1.has_skill(k)),
                            });
                        }
                    } else if st.has_skill(k) {
                        factors.push(Factor {
                            key: self.params.resolve(ParamName::PLose, Some(k), st),
                            component: usize::from(st1.has_skill(k)),
                        });
                    }
                }
                Factors::Product(factors)
            }
            Action::Teach { .. } => {
                if s == s1 {
                    Factors::certain()
                } else {
                    Factors::Impossible
                }
            }
        };
        Ok(factors)
    }

    pub fn transition(&self, s: usize, a: usize, s1: usize) -> Result<f64> {
        self.transition_with(&self.params.values, s, a, s1)
    }

    pub fn transition_with(
        &self,
        values: &ParamValues,
        s: usize,
        a: usize,
        s1: usize,
    ) -> Result<f64> {
        self.transition_factors(s, a, s1)?.evaluate(values)
    }

    pub fn transition_exponents(&self, s: usize, a: usize, s1: usize) -> Result<Exponents> {
        Ok(self.exponents(&self.transition_factors(s, a, s1)?))
    }

    // --- observation ---

    /// `s` is the state the action led to.
    pub fn observation_factors(&self, s: usize, a: usize, o: usize) -> Result<Factors> {
        let st = self.spaces.state(s)?;
        let act = self.spaces.action(a)?;
        let obs = self.spaces.observation(o)?;

        if st.term || *act == Action::Boot {
            return Ok(if *obs == Observation::Term {
                Factors::certain()
            } else {
                Factors::Impossible
            });
        }

        if !act.is_quiz() {
            return Ok(if *obs == Observation::Null {
                Factors::certain()
            } else {
                Factors::Impossible
            });
        }

        let Observation::Answers(answers) = obs else {
            return Ok(Factors::Impossible);
        };

        let dims = &self.params.dims;
        let single_rule_per_answer = dims.n_question_types == 1 || dims.n_skills == 1;
        let mut factors = Vec::with_capacity(answers.len());
        for (question_type, &right) in answers.iter().enumerate() {
            // Gold questions need exactly one skill.
            let has_skill = if single_rule_per_answer {
                st.quiz.is_some_and(|k| st.has_skill(k))
            } else {
                st.has_skill(question_type)
            };
            let factor = if has_skill {
                Factor {
                    key: self.params.resolve(ParamName::PSlip, Some(question_type), st),
                    component: usize::from(right),
                }
            } else {
                Factor {
                    key: self.params.resolve(ParamName::PGuess, Some(question_type), st),
                    component: usize::from(!right),
                }
            };
            factors.push(factor);
        }
        Ok(Factors::Product(factors))
    }

    pub fn observation(&self, s: usize, a: usize, o: usize) -> Result<f64> {
        self.observation_with(&self.params.values, s, a, o)
    }

    pub fn observation_with(
        &self,
        values: &ParamValues,
        s: usize,
        a: usize,
        o: usize,
    ) -> Result<f64> {
        self.observation_factors(s, a, o)?.evaluate(values)
    }

    pub fn observation_exponents(&self, s: usize, a: usize, o: usize) -> Result<Exponents> {
        Ok(self.exponents(&self.observation_factors(s, a, o)?))
    }

    // --- reward ---

    /// `(cost, expected reward)` of taking `a` in `s` and landing in `s1`.
    pub fn reward(&self, s: usize, a: usize, s1: usize) -> Result<(f64, f64)> {
        self.reward_with(&self.params.values, s, a, s1)
    }

    pub fn reward_with(
        &self,
        values: &ParamValues,
        s: usize,
        a: usize,
        s1: usize,
    ) -> Result<(f64, f64)> {
        match self.reward_parts(values, s, a, s1)? {
            RewardParts::Fixed(cost) => Ok((cost, 0.0)),
            RewardParts::Ask {
                cost,
                p_correct,
                question_type,
            } => {
                let p_label = self.params.fixed.p_1[question_type];
                Ok((cost, self.params.fixed.utility.expected(p_correct, p_label)))
            }
        }
    }

    /// Reward with the label and answer drawn instead of averaged.
    pub fn reward_sample<R: Rng + ?Sized>(
        &self,
        s: usize,
        a: usize,
        s1: usize,
        rng: &mut R,
    ) -> Result<((f64, f64), Option<AnswerSample>)> {
        match self.reward_parts(&self.params.values, s, a, s1)? {
            RewardParts::Fixed(cost) => Ok(((cost, 0.0), None)),
            RewardParts::Ask {
                cost,
                p_correct,
                question_type,
            } => {
                let p_label = self.params.fixed.p_1[question_type];
                let (reward, sample) = self.params.fixed.utility.sample(p_correct, p_label, rng);
                Ok(((cost, reward), Some(sample)))
            }
        }
    }

    fn reward_parts(
        &self,
        values: &ParamValues,
        s: usize,
        a: usize,
        s1: usize,
    ) -> Result<RewardParts> {
        let st = self.spaces.state(s)?;
        let act = self.spaces.action(a)?;
        let st1 = self.spaces.state(s1)?;
        let fixed = &self.params.fixed;

        if !st.is_valid_action(act) {
            return Ok(RewardParts::Fixed(INVALID_ACTION_COST));
        }
        if st.term || st1.term {
            return Ok(RewardParts::Fixed(0.0));
        }
        let question_type = match *act {
            Action::Teach {
                mode: TeachMode::Explained,
                ..
            } => return Ok(RewardParts::Fixed(fixed.cost_exp)),
            Action::Teach {
                mode: TeachMode::Told,
                ..
            } => return Ok(RewardParts::Fixed(fixed.cost_tell)),
            Action::Quiz(_) => return Ok(RewardParts::Fixed(fixed.cost)),
            Action::Boot => return Ok(RewardParts::Fixed(0.0)),
            Action::Ask(question_type) => question_type,
        };

        let slip = lookup(
            values,
            &self.params.resolve(ParamName::PSlip, Some(question_type), st1),
        )?[0];
        let guess = lookup(
            values,
            &self.params.resolve(ParamName::PGuess, Some(question_type), st1),
        )?[0];
        let dims = &self.params.dims;
        let p_know = if dims.n_question_types > 1 && dims.n_skills == dims.n_question_types {
            if st1.has_skill(question_type) { 1.0 } else { 0.0 }
        } else {
            st1.p_has_skills(&fixed.p_r)
        };
        let p_correct = p_know.mul_add(1.0 - slip, (1.0 - p_know) * guess);
        Ok(RewardParts::Ask {
            cost: fixed.cost,
            p_correct,
            question_type,
        })
    }

    // --- tables and simulation ---

    /// Dense tables for `values`, including rewards.
    pub fn make_tables(&self, values: &ParamValues) -> Result<ModelTables> {
        let mut tables = self.probability_tables(values)?;
        let (n_s, n_a) = (self.n_states(), self.n_actions());
        let mut reward = Vec::with_capacity(n_s * n_a * n_s);
        for s in 0..n_s {
            for a in 0..n_a {
                for s1 in 0..n_s {
                    let (cost, r) = self.reward_with(values, s, a, s1)?;
                    reward.push(cost + r);
                }
            }
        }
        tables.reward = reward;
        Ok(tables)
    }

    /// Transition, observation and start tables only.
    pub fn probability_tables(&self, values: &ParamValues) -> Result<ModelTables> {
        let (n_s, n_a, n_o) = (self.n_states(), self.n_actions(), self.n_observations());
        let mut transition = Vec::with_capacity(n_s * n_a * n_s);
        let mut observation = Vec::with_capacity(n_s * n_a * n_o);
        for s in 0..n_s {
            for a in 0..n_a {
                for s1 in 0..n_s {
                    transition.push(self.transition_with(values, s, a, s1)?);
                }
                for o in 0..n_o {
                    observation.push(self.observation_with(values, s, a, o)?);
                }
            }
        }
        Ok(ModelTables {
            n_states: n_s,
            n_actions: n_a,
            n_observations: n_o,
            transition,
            observation,
            start: self.start_belief_with(values)?,
            reward: Vec::new(),
        })
    }

    /// Sample the next state, its observation and a sampled reward.
    pub fn sample_step<R: Rng + ?Sized>(&self, s: usize, a: usize, rng: &mut R) -> Result<Step> {
        let next_probs: Vec<f64> = (0..self.n_states())
            .map(|s1| self.transition(s, a, s1))
            .collect::<Result<_>>()?;
        let next_state = sample_index(&next_probs, rng)?;
        let obs_probs: Vec<f64> = (0..self.n_observations())
            .map(|o| self.observation(next_state, a, o))
            .collect::<Result<_>>()?;
        let observation = sample_index(&obs_probs, rng)?;
        let ((cost, reward), answer) = self.reward_sample(s, a, next_state, rng)?;
        Ok(Step {
            next_state,
            observation,
            cost,
            reward,
            answer,
        })
    }

    fn exponents(&self, factors: &Factors) -> Exponents {
        let mut exponents = Exponents::new();
        if let Factors::Product(factors) = factors {
            for factor in factors {
                let len = self
                    .params
                    .values
                    .get(&factor.key)
                    .map_or(factor.component + 1, Vec::len);
                let entry = exponents
                    .entry(factor.key)
                    .or_insert_with(|| vec![0.0; len]);
                if let Some(slot) = entry.get_mut(factor.component) {
                    *slot += 1.0;
                }
            }
        }
        exponents
    }
}

enum RewardParts {
    Fixed(f64),
    Ask {
        cost: f64,
        p_correct: f64,
        question_type: usize,
    },
}

fn sample_index<R: Rng + ?Sized>(probs: &[f64], rng: &mut R) -> Result<usize> {
    let dist = WeightedIndex::new(probs).map_err(|err| GateError::Sampling(err.to_string()))?;
    Ok(dist.sample(rng))
}
