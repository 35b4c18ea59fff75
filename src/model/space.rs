//! State, action and observation spaces.
//!
//! Spaces are enumerated once from the model dimensions and never change
//! afterwards. Every other component refers to states, actions and
//! observations by their position in these sequences.

use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// Sizes that determine the enumerated spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub n_worker_classes: usize,
    pub n_skills: usize,
    pub n_question_types: usize,
    /// Explain-after-quiz teaching actions exist.
    pub explain: bool,
    /// Tell-a-rule teaching actions exist.
    pub tell: bool,
}

/// Latent worker state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    pub worker_class: usize,
    pub skills: Vec<bool>,
    /// Skill quizzed by the action that led here, if any.
    pub quiz: Option<usize>,
    pub term: bool,
}

impl State {
    #[must_use]
    pub const fn terminal() -> Self {
        Self {
            worker_class: 0,
            skills: Vec::new(),
            quiz: None,
            term: true,
        }
    }

    #[must_use]
    pub fn has_skill(&self, skill: usize) -> bool {
        self.skills.get(skill).copied().unwrap_or(false)
    }

    #[must_use]
    pub const fn is_quiz(&self) -> bool {
        self.quiz.is_some()
    }

    /// Skills present in `next` but absent here.
    #[must_use]
    pub fn skills_learned(&self, next: &Self) -> Vec<usize> {
        (0..next.skills.len())
            .filter(|&i| next.has_skill(i) && !self.has_skill(i))
            .collect()
    }

    #[must_use]
    pub fn n_skills_learned(&self, next: &Self) -> usize {
        self.skills_learned(next).len()
    }

    /// Probability the worker holds the skill a question needs, when the
    /// question's rule is drawn from `rule_probs`.
    #[must_use]
    pub fn p_has_skills(&self, rule_probs: &[f64]) -> f64 {
        rule_probs
            .iter()
            .enumerate()
            .filter(|(i, _)| self.has_skill(*i))
            .map(|(_, p)| p)
            .sum()
    }

    /// Explaining a quiz answer only makes sense right after that quiz.
    #[must_use]
    pub fn is_valid_action(&self, action: &Action) -> bool {
        match action {
            Action::Teach {
                skill,
                mode: TeachMode::Explained,
            } => self.term || self.quiz == Some(*skill),
            _ => true,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.term {
            return write!(f, "term");
        }
        let skills: String = self
            .skills
            .iter()
            .map(|&has| if has { '1' } else { '0' })
            .collect();
        match self.quiz {
            Some(q) => write!(f, "w{}_s{}_q{}", self.worker_class, skills, q),
            None => write!(f, "w{}_s{}_qn", self.worker_class, skills),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeachMode {
    /// Rule stated outright.
    Told,
    /// Answer to the preceding quiz explained.
    Explained,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Ordinary work on a question of the given type.
    Ask(usize),
    /// Gold question testing one skill.
    Quiz(usize),
    Teach { skill: usize, mode: TeachMode },
    Boot,
}

impl Action {
    #[must_use]
    pub const fn is_quiz(&self) -> bool {
        matches!(self, Self::Quiz(_))
    }

    #[must_use]
    pub const fn uses_gold(&self) -> bool {
        self.is_quiz()
    }

    /// Skill the action quizzes, if any.
    #[must_use]
    pub const fn quiz_skill(&self) -> Option<usize> {
        match self {
            Self::Quiz(skill) => Some(*skill),
            _ => None,
        }
    }

    #[must_use]
    pub fn valid_after(&self, last: Option<&Self>) -> bool {
        match self {
            Self::Teach {
                skill,
                mode: TeachMode::Explained,
            } => last == Some(&Self::Quiz(*skill)),
            _ => true,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ask(question_type) => write!(f, "ask{question_type}"),
            Self::Quiz(skill) => write!(f, "quiz{skill}"),
            Self::Teach {
                skill,
                mode: TeachMode::Told,
            } => write!(f, "tell{skill}"),
            Self::Teach {
                skill,
                mode: TeachMode::Explained,
            } => write!(f, "exp{skill}"),
            Self::Boot => write!(f, "boot"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Observation {
    /// Correctness per question type (`true` = right).
    Answers(Vec<bool>),
    Null,
    Term,
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Answers(answers) => {
                let s: String = answers
                    .iter()
                    .map(|&right| if right { 'r' } else { 'w' })
                    .collect();
                write!(f, "{s}")
            }
            Self::Null => write!(f, "null"),
            Self::Term => write!(f, "term"),
        }
    }
}

/// Row of the names table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameRow {
    pub i: usize,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub s: String,
    pub uses_gold: Option<bool>,
}

/// The immutable, indexed spaces of one model.
#[derive(Debug, Clone, Serialize)]
pub struct Spaces {
    pub dims: Dimensions,
    pub states: Vec<State>,
    pub actions: Vec<Action>,
    pub observations: Vec<Observation>,
}

impl Spaces {
    #[must_use]
    pub fn build(dims: Dimensions) -> Self {
        Self {
            dims,
            states: states_all(&dims),
            actions: actions_all(&dims),
            observations: observations_all(dims.n_question_types),
        }
    }

    #[must_use]
    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn n_actions(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn n_observations(&self) -> usize {
        self.observations.len()
    }

    pub fn state(&self, s: usize) -> Result<&State> {
        self.states.get(s).ok_or(GateError::OutOfRange {
            space: "state",
            index: s,
            len: self.states.len(),
        })
    }

    pub fn action(&self, a: usize) -> Result<&Action> {
        self.actions.get(a).ok_or(GateError::OutOfRange {
            space: "action",
            index: a,
            len: self.actions.len(),
        })
    }

    pub fn observation(&self, o: usize) -> Result<&Observation> {
        self.observations.get(o).ok_or(GateError::OutOfRange {
            space: "observation",
            index: o,
            len: self.observations.len(),
        })
    }

    #[must_use]
    pub fn action_index(&self, action: &Action) -> Option<usize> {
        self.actions.iter().position(|a| a == action)
    }

    #[must_use]
    pub fn observation_index(&self, observation: &Observation) -> Option<usize> {
        self.observations.iter().position(|o| o == observation)
    }

    #[must_use]
    pub fn state_index(&self, state: &State) -> Option<usize> {
        self.states.iter().position(|s| s == state)
    }

    #[must_use]
    pub fn names(&self) -> Vec<NameRow> {
        let actions = self.actions.iter().enumerate().map(|(i, a)| NameRow {
            i,
            kind: "action",
            s: a.to_string(),
            uses_gold: Some(a.uses_gold()),
        });
        let states = self.states.iter().enumerate().map(|(i, s)| NameRow {
            i,
            kind: "state",
            s: s.to_string(),
            uses_gold: None,
        });
        let observations = self.observations.iter().enumerate().map(|(i, o)| NameRow {
            i,
            kind: "observation",
            s: o.to_string(),
            uses_gold: None,
        });
        actions.chain(states).chain(observations).collect()
    }
}

fn skill_combinations(n_skills: usize) -> Vec<Vec<bool>> {
    if n_skills == 0 {
        return vec![Vec::new()];
    }
    (0..n_skills)
        .map(|_| [false, true])
        .multi_cartesian_product()
        .collect()
}

fn states_all(dims: &Dimensions) -> Vec<State> {
    let mut states = Vec::new();
    for worker_class in 0..dims.n_worker_classes {
        for skills in skill_combinations(dims.n_skills) {
            let quiz_markers = std::iter::once(None).chain((0..dims.n_skills).map(Some));
            for quiz in quiz_markers {
                states.push(State {
                    worker_class,
                    skills: skills.clone(),
                    quiz,
                    term: false,
                });
            }
        }
    }
    states.push(State::terminal());
    states
}

fn actions_all(dims: &Dimensions) -> Vec<Action> {
    let mut actions: Vec<Action> = (0..dims.n_question_types).map(Action::Ask).collect();
    actions.extend((0..dims.n_skills).map(Action::Quiz));
    if dims.explain {
        actions.extend((0..dims.n_skills).map(|skill| Action::Teach {
            skill,
            mode: TeachMode::Explained,
        }));
    }
    if dims.tell {
        actions.extend((0..dims.n_skills).map(|skill| Action::Teach {
            skill,
            mode: TeachMode::Told,
        }));
    }
    actions.push(Action::Boot);
    actions
}

fn observations_all(n_question_types: usize) -> Vec<Observation> {
    let mut observations: Vec<Observation> = (0..n_question_types)
        .map(|_| [true, false])
        .multi_cartesian_product()
        .map(Observation::Answers)
        .collect();
    observations.push(Observation::Null);
    observations.push(Observation::Term);
    observations
}
