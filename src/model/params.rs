//! Canonical parameter store.
//!
//! Raw configuration lists are split into one distribution per
//! [`ParamKey`]. Bernoulli parameters are stored as `[p, 1 - p]`; the worker
//! class distribution is stored as given. A parameter is either shared across
//! worker classes or held once per class, never both.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, UtilityKind};
use crate::error::{GateError, Result};

use super::math::get_penalty;
use super::reward::Utility;
use super::space::{Dimensions, State};

/// Estimable parameter families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamName {
    PWorker,
    PS,
    PSlip,
    PGuess,
    PLose,
    PLeave,
    PLearnExp,
    PLearnTell,
}

impl ParamName {
    pub const ALL: [Self; 8] = [
        Self::PWorker,
        Self::PS,
        Self::PSlip,
        Self::PGuess,
        Self::PLose,
        Self::PLeave,
        Self::PLearnExp,
        Self::PLearnTell,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PWorker => "p_worker",
            Self::PS => "p_s",
            Self::PSlip => "p_slip",
            Self::PGuess => "p_guess",
            Self::PLose => "p_lose",
            Self::PLeave => "p_leave",
            Self::PLearnExp => "p_learn_exp",
            Self::PLearnTell => "p_learn_tell",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == value)
            .ok_or_else(|| GateError::Config(format!("unknown parameter {value}")))
    }

    /// Families that may be tied across worker classes.
    #[must_use]
    pub const fn is_tieable(self) -> bool {
        !matches!(self, Self::PWorker)
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Shared,
    PerClass(usize),
}

impl Scope {
    #[must_use]
    pub const fn class(self) -> Option<usize> {
        match self {
            Self::Shared => None,
            Self::PerClass(c) => Some(c),
        }
    }
}

/// Concrete parameter: family, optional rule / question-type index, scope.
///
/// Serializes as its display name (`p_s2_w1`), so parameter maps stay plain
/// JSON objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamKey {
    pub name: ParamName,
    pub index: Option<usize>,
    pub scope: Scope,
}

impl ParamKey {
    #[must_use]
    pub const fn shared(name: ParamName, index: Option<usize>) -> Self {
        Self {
            name,
            index,
            scope: Scope::Shared,
        }
    }

    #[must_use]
    pub const fn per_class(name: ParamName, index: Option<usize>, class: usize) -> Self {
        Self {
            name,
            index,
            scope: Scope::PerClass(class),
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(index) = self.index {
            write!(f, "{index}")?;
        }
        if let Scope::PerClass(class) = self.scope {
            write!(f, "_w{class}")?;
        }
        Ok(())
    }
}

impl FromStr for ParamKey {
    type Err = GateError;

    fn from_str(value: &str) -> Result<Self> {
        let invalid = || GateError::Config(format!("invalid parameter key {value}"));
        let (body, scope) = match value.rsplit_once("_w") {
            Some((body, class)) if !class.is_empty() && class.bytes().all(|b| b.is_ascii_digit()) => {
                (body, Scope::PerClass(class.parse().map_err(|_| invalid())?))
            }
            _ => (value, Scope::Shared),
        };
        let digits = body.len() - body.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        let (name, index) = body.split_at(body.len() - digits);
        let index = if index.is_empty() {
            None
        } else {
            Some(index.parse().map_err(|_| invalid())?)
        };
        let name = ParamName::parse(name).map_err(|_| invalid())?;
        Ok(Self { name, index, scope })
    }
}

impl Serialize for ParamKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ParamKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

pub type ParamValues = BTreeMap<ParamKey, Vec<f64>>;

/// Parameters that are never estimated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedParams {
    /// Rule distribution of ordinary questions.
    pub p_r: Vec<f64>,
    /// Prior probability the true label is 1, per question type.
    pub p_1: Vec<f64>,
    pub cost: f64,
    pub cost_exp: f64,
    pub cost_tell: f64,
    pub utility: Utility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub dims: Dimensions,
    pub values: ParamValues,
    pub fixed: FixedParams,
}

impl Params {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let n_classes = config.p_worker.len();
        let n_rules = config.p_r.len();
        let n_types = config.p_1.len();

        if n_classes == 0 || n_rules == 0 || n_types == 0 {
            return Err(GateError::Config(
                "p_worker, p_r and p_1 must be non-empty".to_string(),
            ));
        }
        if n_types > 1 && n_types != n_rules && n_rules != 1 {
            return Err(GateError::Config(format!(
                "{n_types} question types need one rule or one rule per type (got {n_rules})"
            )));
        }
        check_distribution("p_worker", &config.p_worker)?;
        check_distribution("p_r", &config.p_r)?;
        check_probabilities("p_1", &config.p_1)?;

        let mut values = ParamValues::new();
        values.insert(
            ParamKey::shared(ParamName::PWorker, None),
            config.p_worker.clone(),
        );

        let mut per_rule = vec![
            (ParamName::PS, &config.p_s),
            (ParamName::PLose, &config.p_lose),
        ];
        if config.explain {
            per_rule.push((ParamName::PLearnExp, &config.p_learn_exp));
        }
        if config.tell {
            per_rule.push((ParamName::PLearnTell, &config.p_learn_tell));
        }
        for (name, raw) in per_rule {
            split_indexed(&mut values, name, raw, n_rules, n_classes)?;
        }
        for (name, raw) in [
            (ParamName::PSlip, &config.p_slip),
            (ParamName::PGuess, &config.p_guess),
        ] {
            split_indexed(&mut values, name, raw, n_types, n_classes)?;
        }

        check_probabilities("p_leave", &config.p_leave)?;
        match config.p_leave.as_slice() {
            [p] => {
                values.insert(ParamKey::shared(ParamName::PLeave, None), bernoulli(*p));
            }
            raw if raw.len() == n_classes => {
                for (class, p) in raw.iter().enumerate() {
                    values.insert(
                        ParamKey::per_class(ParamName::PLeave, None, class),
                        bernoulli(*p),
                    );
                }
            }
            raw => {
                return Err(GateError::Config(format!(
                    "p_leave has {} values; expected 1 or {n_classes}",
                    raw.len()
                )));
            }
        }

        let break_even = match config.utility.kind {
            UtilityKind::Acc => true,
            UtilityKind::Pen => {
                config.utility.penalty_fp.is_none() || config.utility.penalty_fn.is_none()
            }
        };
        if break_even && !(0.0..1.0).contains(&config.utility.desired_accuracy) {
            return Err(GateError::Config(format!(
                "desired_accuracy {} has no break-even penalty; it must be in [0, 1)",
                config.utility.desired_accuracy
            )));
        }

        let utility = match config.utility.kind {
            UtilityKind::Acc => Utility::Accuracy {
                desired_accuracy: config.utility.desired_accuracy,
            },
            UtilityKind::Pen => {
                let default_penalty = get_penalty(config.utility.desired_accuracy, 1.0);
                Utility::Penalty {
                    penalty_fp: config.utility.penalty_fp.unwrap_or(default_penalty),
                    penalty_fn: config.utility.penalty_fn.unwrap_or(default_penalty),
                    reward_tp: config.utility.reward_tp,
                    reward_tn: config.utility.reward_tn,
                }
            }
        };

        Ok(Self {
            dims: Dimensions {
                n_worker_classes: n_classes,
                n_skills: n_rules,
                n_question_types: n_types,
                explain: config.explain,
                tell: config.tell,
            },
            values,
            fixed: FixedParams {
                p_r: config.p_r.clone(),
                p_1: config.p_1.clone(),
                cost: config.cost,
                cost_exp: config.cost_exp,
                cost_tell: config.cost_tell,
                utility,
            },
        })
    }

    /// Key to use for `name[index]` in `state`: the shared key when one
    /// exists, otherwise the state's class. The terminal state uses class 0.
    #[must_use]
    pub fn resolve(&self, name: ParamName, index: Option<usize>, state: &State) -> ParamKey {
        let shared = ParamKey::shared(name, index);
        if self.values.contains_key(&shared) {
            return shared;
        }
        let class = if state.term { 0 } else { state.worker_class };
        ParamKey::per_class(name, index, class)
    }

    pub fn get(&self, key: &ParamKey) -> Result<&[f64]> {
        lookup(&self.values, key)
    }

    /// Families present in this store.
    #[must_use]
    pub fn names(&self) -> Vec<ParamName> {
        let mut names: Vec<ParamName> = self.values.keys().map(|k| k.name).collect();
        names.dedup();
        names
    }

    /// Tie every parameter of `name` across worker classes, keeping the
    /// first class's value.
    pub fn set_shared(&mut self, name: ParamName) {
        let keys: Vec<ParamKey> = self
            .values
            .keys()
            .filter(|k| k.name == name && k.scope != Scope::Shared)
            .copied()
            .collect();
        for key in keys {
            if let Some(value) = self.values.remove(&key) {
                self.values
                    .entry(ParamKey::shared(name, key.index))
                    .or_insert(value);
            }
        }
    }

    /// Untie every parameter of `name`, copying the shared value to each class.
    pub fn set_not_shared(&mut self, name: ParamName) {
        if !name.is_tieable() {
            return;
        }
        let shared: Vec<ParamKey> = self
            .values
            .keys()
            .filter(|k| k.name == name && k.scope == Scope::Shared)
            .copied()
            .collect();
        for key in shared {
            if let Some(value) = self.values.remove(&key) {
                for class in 0..self.dims.n_worker_classes {
                    self.values
                        .insert(ParamKey::per_class(name, key.index, class), value.clone());
                }
            }
        }
    }

    /// Free parameters of the initial-state model.
    #[must_use]
    pub fn complexity_start(&self) -> usize {
        self.count_keys(&[ParamName::PWorker, ParamName::PS])
    }

    /// Free parameters of the transition and emission model.
    #[must_use]
    pub fn complexity_transition(&self) -> usize {
        self.count_keys(&[
            ParamName::PGuess,
            ParamName::PSlip,
            ParamName::PLose,
            ParamName::PLearnExp,
            ParamName::PLearnTell,
            ParamName::PLeave,
            ParamName::PS,
        ])
    }

    /// BIC penalty for `n_sequences` histories totalling `n_transitions` steps.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bic_penalty(&self, n_sequences: usize, n_transitions: usize) -> f64 {
        0.5 * (self.complexity_start() as f64).mul_add(
            (n_sequences as f64).ln(),
            (n_transitions as f64).ln() * self.complexity_transition() as f64,
        )
    }

    fn count_keys(&self, names: &[ParamName]) -> usize {
        self.values.keys().filter(|k| names.contains(&k.name)).count()
    }

    /// Estimated parameters in flat list form: class-major, positive
    /// probability only for Bernoulli families.
    #[must_use]
    pub fn to_config(&self) -> BTreeMap<String, Vec<f64>> {
        let mut out: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for name in self.names() {
            let mut keys: Vec<&ParamKey> = self.values.keys().filter(|k| k.name == name).collect();
            keys.sort_by_key(|k| (k.scope.class(), k.index));
            let list = out.entry(name.to_string()).or_default();
            for key in keys {
                let Some(value) = self.values.get(key) else {
                    continue;
                };
                if name == ParamName::PWorker {
                    list.extend(value);
                } else if let Some(p) = value.first() {
                    list.push(*p);
                }
            }
        }
        out
    }

    /// Overwrite values from a flat list map such as [`Params::to_config`]
    /// produces. Layout must match the current tying.
    pub fn apply_config(&mut self, flat: &BTreeMap<String, Vec<f64>>) -> Result<()> {
        for (raw_name, list) in flat {
            let name = ParamName::parse(raw_name)?;
            let mut keys: Vec<ParamKey> = self
                .values
                .keys()
                .filter(|k| k.name == name)
                .copied()
                .collect();
            keys.sort_by_key(|k| (k.scope.class(), k.index));
            if name == ParamName::PWorker {
                check_distribution("p_worker", list)?;
                self.values
                    .insert(ParamKey::shared(name, None), list.clone());
                continue;
            }
            if keys.len() != list.len() {
                return Err(GateError::Config(format!(
                    "{name} has {} values; expected {}",
                    list.len(),
                    keys.len()
                )));
            }
            check_probabilities(name.as_str(), list)?;
            for (key, p) in keys.into_iter().zip(list) {
                self.values.insert(key, bernoulli(*p));
            }
        }
        Ok(())
    }
}

pub fn lookup<'a>(values: &'a ParamValues, key: &ParamKey) -> Result<&'a [f64]> {
    values
        .get(key)
        .map(Vec::as_slice)
        .ok_or_else(|| GateError::MissingParameter(key.to_string()))
}

fn bernoulli(p: f64) -> Vec<f64> {
    vec![p, 1.0 - p]
}

/// Split a per-index list (one value per index, optionally repeated for
/// every class, class-major) into keyed Bernoulli distributions.
fn split_indexed(
    values: &mut ParamValues,
    name: ParamName,
    raw: &[f64],
    n_index: usize,
    n_classes: usize,
) -> Result<()> {
    if raw.len() != n_index && raw.len() != n_index * n_classes {
        return Err(GateError::Config(format!(
            "{name} has {} values; expected {n_index} or {}",
            raw.len(),
            n_index * n_classes
        )));
    }
    check_probabilities(name.as_str(), raw)?;
    let shared = raw.len() == n_index;
    for (i, p) in raw.iter().enumerate() {
        let index = i % n_index;
        let key = if shared {
            ParamKey::shared(name, Some(index))
        } else {
            ParamKey::per_class(name, Some(index), i / n_index)
        };
        values.insert(key, bernoulli(*p));
    }
    Ok(())
}

fn check_probabilities(name: &str, values: &[f64]) -> Result<()> {
    if let Some(bad) = values.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(GateError::Config(format!(
            "{name} value {bad} is not a probability"
        )));
    }
    Ok(())
}

fn check_distribution(name: &str, values: &[f64]) -> Result<()> {
    check_probabilities(name, values)?;
    let total: f64 = values.iter().sum();
    if (total - 1.0).abs() > 1e-6 {
        return Err(GateError::Config(format!("{name} sums to {total}, not 1")));
    }
    Ok(())
}
