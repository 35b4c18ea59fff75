//! Utility of ordinary work answers.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::math::get_penalty;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Utility {
    /// +1 for a right answer, and the break-even penalty for
    /// `desired_accuracy` for a wrong one.
    Accuracy { desired_accuracy: f64 },
    /// Separate rewards and penalties per true label.
    Penalty {
        penalty_fp: f64,
        penalty_fn: f64,
        reward_tp: f64,
        reward_tn: f64,
    },
}

/// Label and answer drawn when a reward is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSample {
    pub label: bool,
    pub answer: bool,
}

impl Utility {
    /// Reward for answering `answer` when the truth is `label`.
    #[must_use]
    pub fn outcome(&self, label: bool, answer: bool) -> f64 {
        match *self {
            Self::Accuracy { desired_accuracy } => {
                if label == answer {
                    1.0
                } else {
                    get_penalty(desired_accuracy, 1.0)
                }
            }
            Self::Penalty {
                penalty_fp,
                penalty_fn,
                reward_tp,
                reward_tn,
            } => match (label, answer) {
                (true, true) => reward_tp,
                (true, false) => penalty_fn,
                (false, false) => reward_tn,
                (false, true) => penalty_fp,
            },
        }
    }

    /// Expected reward of one answer, given the probability it is correct
    /// and the prior probability the label is 1.
    #[must_use]
    pub fn expected(&self, p_correct: f64, p_label: f64) -> f64 {
        let given = |label: bool| {
            p_correct.mul_add(
                self.outcome(label, label),
                (1.0 - p_correct) * self.outcome(label, !label),
            )
        };
        p_label.mul_add(given(true), (1.0 - p_label) * given(false))
    }

    /// Draw a label and an answer, returning the realized reward.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        p_correct: f64,
        p_label: f64,
        rng: &mut R,
    ) -> (f64, AnswerSample) {
        let label = rng.random_bool(p_label.clamp(0.0, 1.0));
        let correct = rng.random_bool(p_correct.clamp(0.0, 1.0));
        let answer = if correct { label } else { !label };
        (self.outcome(label, answer), AnswerSample { label, answer })
    }
}
