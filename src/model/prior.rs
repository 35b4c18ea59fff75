//! Named Dirichlet prior variants for estimation.
//!
//! A variant picks a family (how unknown parameters are seeded) and the set
//! of parameter families treated as known. Known families get a prior sharply
//! peaked at their current value.

use serde::Serialize;

use crate::error::{GateError, Result};

use super::math::beta_fit;
use super::params::{ParamName, ParamValues, Params, Scope};

const PEAKEDNESS: f64 = 1000.0;
const UNINFORMED: f64 = 1.000_01;
const WEAK_PRIOR_MAG: f64 = 3.5;
const WEAK_BETA_MAG: f64 = WEAK_PRIOR_MAG * 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorFamily {
    /// Weak priors: slips and skill loss are unlikely, everything else flat.
    Plain,
    /// Slip modes spread evenly over `[0, 0.5]` by worker class.
    Spaced,
    /// Spaced, with a stronger prior on the worker class ratio.
    SpacedStronger,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PriorVariant {
    pub name: &'static str,
    pub family: PriorFamily,
    pub known: &'static [ParamName],
}

use ParamName::{PGuess, PLearnExp, PLearnTell, PLeave, PLose, PS, PSlip};

const KNOWN_ALL: &[ParamName] = &[PGuess, PSlip, PLose, PLearnExp, PLearnTell, PLeave, PS];
const KNOWN_NO_LEAVE: &[ParamName] = &[PGuess, PSlip, PLose, PLearnExp, PLearnTell, PS];
const KNOWN_NO_SLIP_LEAVE: &[ParamName] = &[PGuess, PLose, PLearnExp, PLearnTell, PS];
const KNOWN_NO_SLIP_LEAVE_LOSE: &[ParamName] = &[PGuess, PLearnExp, PLearnTell, PS];
const KNOWN_NO_LEAVE_LOSE: &[ParamName] = &[PGuess, PSlip, PLearnExp, PLearnTell, PS];

pub const VARIANTS: &[PriorVariant] = &[
    PriorVariant {
        name: "default",
        family: PriorFamily::Plain,
        known: &[],
    },
    PriorVariant {
        name: "unknown_ratio",
        family: PriorFamily::Plain,
        known: KNOWN_ALL,
    },
    PriorVariant {
        name: "unknown_ratio_leave",
        family: PriorFamily::Plain,
        known: KNOWN_NO_LEAVE,
    },
    PriorVariant {
        name: "unknown_ratio_slip_leave",
        family: PriorFamily::Plain,
        known: KNOWN_NO_SLIP_LEAVE,
    },
    PriorVariant {
        name: "unknown_ratio_slip_leave_lose",
        family: PriorFamily::Plain,
        known: KNOWN_NO_SLIP_LEAVE_LOSE,
    },
    PriorVariant {
        name: "unknown_ratio_slip_leave_lose_learn_exp",
        family: PriorFamily::Plain,
        known: &[PLearnTell],
    },
    PriorVariant {
        name: "unknown_ratio_slip_leave_lose_learn",
        family: PriorFamily::Plain,
        known: &[],
    },
    PriorVariant {
        name: "unknown_ratio_leave_lose",
        family: PriorFamily::Plain,
        known: KNOWN_NO_LEAVE_LOSE,
    },
    PriorVariant {
        name: "spaced",
        family: PriorFamily::Spaced,
        known: &[],
    },
    PriorVariant {
        name: "spaced_unknown_ratio",
        family: PriorFamily::Spaced,
        known: KNOWN_ALL,
    },
    PriorVariant {
        name: "spaced_unknown_ratio_slip_leave",
        family: PriorFamily::Spaced,
        known: KNOWN_NO_SLIP_LEAVE,
    },
    PriorVariant {
        name: "spaced_unknown_ratio_slip_leave_lose",
        family: PriorFamily::Spaced,
        known: KNOWN_NO_SLIP_LEAVE_LOSE,
    },
    PriorVariant {
        name: "spaced_unknown_ratio_leave_lose",
        family: PriorFamily::Spaced,
        known: KNOWN_NO_LEAVE_LOSE,
    },
    PriorVariant {
        name: "spaced_stronger",
        family: PriorFamily::SpacedStronger,
        known: &[],
    },
    PriorVariant {
        name: "spaced_stronger_unknown_ratio",
        family: PriorFamily::SpacedStronger,
        known: KNOWN_ALL,
    },
    PriorVariant {
        name: "spaced_stronger_unknown_ratio_slip_leave",
        family: PriorFamily::SpacedStronger,
        known: KNOWN_NO_SLIP_LEAVE,
    },
    PriorVariant {
        name: "spaced_stronger_unknown_ratio_slip_leave_lose",
        family: PriorFamily::SpacedStronger,
        known: KNOWN_NO_SLIP_LEAVE_LOSE,
    },
    PriorVariant {
        name: "spaced_stronger_unknown_ratio_leave_lose",
        family: PriorFamily::SpacedStronger,
        known: KNOWN_NO_LEAVE_LOSE,
    },
];

pub fn variant(name: &str) -> Result<&'static PriorVariant> {
    VARIANTS
        .iter()
        .find(|v| v.name == name)
        .ok_or_else(|| GateError::UnknownPriorVariant(name.to_string()))
}

impl PriorVariant {
    /// Dirichlet pseudo-counts for every key in `params`.
    #[must_use]
    pub fn hyperparams(&self, params: &Params) -> ParamValues {
        let n_classes = params.dims.n_worker_classes;
        params
            .values
            .iter()
            .map(|(key, value)| {
                let counts = if self.known.contains(&key.name) {
                    value.iter().map(|v| PEAKEDNESS.mul_add(*v, UNINFORMED)).collect()
                } else {
                    self.uninformed(key.name, key.scope, n_classes)
                };
                (*key, counts)
            })
            .collect()
    }

    fn uninformed(&self, name: ParamName, scope: Scope, n_classes: usize) -> Vec<f64> {
        match name {
            ParamName::PWorker => {
                let weight = if self.family == PriorFamily::SpacedStronger {
                    WEAK_PRIOR_MAG
                } else {
                    UNINFORMED
                };
                vec![weight; n_classes]
            }
            ParamName::PSlip if self.family == PriorFamily::Plain => vec![2.0, 5.0],
            ParamName::PSlip => {
                #[allow(clippy::cast_precision_loss)]
                let mode = match scope {
                    Scope::Shared => 0.25,
                    Scope::PerClass(c) => 0.5 * (c + 1) as f64 / (n_classes + 1) as f64,
                };
                beta_fit(mode, WEAK_BETA_MAG).to_vec()
            }
            ParamName::PLose => vec![2.0, 20.0],
            _ => vec![UNINFORMED, UNINFORMED],
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ModelConfig;
    use crate::model::params::ParamKey;

    use super::*;

    fn params() -> Params {
        Params::from_config(&ModelConfig::default()).unwrap()
    }

    #[test]
    fn unknown_variant_is_an_error() {
        assert!(matches!(
            variant("bogus"),
            Err(GateError::UnknownPriorVariant(_))
        ));
    }

    #[test]
    fn variant_names_are_unique() {
        let mut names: Vec<&str> = VARIANTS.iter().map(|v| v.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), VARIANTS.len());
    }

    #[test]
    fn default_prior_is_weak() {
        let hyper = variant("default").unwrap().hyperparams(&params());
        assert_eq!(
            hyper[&ParamKey::shared(ParamName::PWorker, None)],
            vec![UNINFORMED, UNINFORMED]
        );
        assert_eq!(
            hyper[&ParamKey::per_class(ParamName::PSlip, Some(0), 1)],
            vec![2.0, 5.0]
        );
        assert_eq!(
            hyper[&ParamKey::per_class(ParamName::PLose, Some(0), 0)],
            vec![2.0, 20.0]
        );
    }

    #[test]
    fn known_families_are_peaked_at_current_values() {
        let hyper = variant("unknown_ratio").unwrap().hyperparams(&params());
        let guess = &hyper[&ParamKey::shared(ParamName::PGuess, Some(0))];
        assert!((guess[0] - PEAKEDNESS.mul_add(0.5, UNINFORMED)).abs() < 1e-9);
        // Worker ratio stays unknown.
        assert_eq!(
            hyper[&ParamKey::shared(ParamName::PWorker, None)],
            vec![UNINFORMED, UNINFORMED]
        );
    }

    #[test]
    fn spaced_slip_modes_increase_with_class() {
        let hyper = variant("spaced_stronger").unwrap().hyperparams(&params());
        let mode = |c: usize| {
            let counts = &hyper[&ParamKey::per_class(ParamName::PSlip, Some(0), c)];
            (counts[0] - 1.0) / (counts[0] + counts[1] - 2.0)
        };
        assert!((mode(0) - 0.5 / 3.0).abs() < 1e-9);
        assert!((mode(1) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(
            hyper[&ParamKey::shared(ParamName::PWorker, None)],
            vec![WEAK_PRIOR_MAG, WEAK_PRIOR_MAG]
        );
    }
}
