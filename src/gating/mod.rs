//! Adaptive tutorial/screening/test scheduler.
//!
//! The scheduler is a pure function of the worker's gating history and the
//! configured thresholds. It never consults the POMDP model; the optional
//! [`WorkAdvisor`] on [`Gate`] is the only place a policy can take over.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::config::GatingConfig;
use crate::error::Result;

/// What the worker should see next.
///
/// Serializes as `{"tutorial": i}`, `{"screening": i}` or `{"test": bool}`;
/// a dismissed worker is `None` at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Tutorial(usize),
    Screening(usize),
    Test(bool),
}

impl GateDecision {
    #[must_use]
    pub const fn is_phase_question(&self) -> bool {
        matches!(self, Self::Tutorial(_) | Self::Screening(_))
    }
}

/// Graded answers collected so far for one worker.
///
/// Entries are `true`/`false` or `1`/`0`. Missing or `null` lists are empty.
/// Work entries are `null` when the item had no gold answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateHistory {
    #[serde(default, deserialize_with = "flag_list")]
    pub tutorial: Vec<bool>,
    #[serde(default, deserialize_with = "flag_list")]
    pub screening: Vec<bool>,
    #[serde(default, deserialize_with = "optional_flag_list")]
    pub work: Vec<Option<bool>>,
}

impl GateHistory {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn into_bool<E: serde::de::Error>(self) -> std::result::Result<bool, E> {
        match self {
            Self::Bool(b) => Ok(b),
            Self::Int(0) => Ok(false),
            Self::Int(1) => Ok(true),
            Self::Int(other) => Err(E::custom(format!(
                "expected a boolean or 0/1, found {other}"
            ))),
        }
    }
}

fn flag_list<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<bool>, D::Error> {
    let raw: Option<Vec<Flag>> = Option::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(Flag::into_bool)
        .collect()
}

fn optional_flag_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<Option<bool>>, D::Error> {
    let raw: Option<Vec<Option<Flag>>> = Option::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|entry| entry.map(Flag::into_bool::<D::Error>).transpose())
        .collect()
}

/// Tutorial index to present, or `None` once the tutorial is complete.
///
/// A wrong last answer repeats that tutorial item.
#[must_use]
pub fn next_tutorial_action(tutorial: &[bool], n_tutorial: usize) -> Option<usize> {
    match tutorial.last() {
        Some(false) => Some(tutorial.len() - 1),
        _ if tutorial.len() < n_tutorial => Some(tutorial.len()),
        _ => None,
    }
}

#[must_use]
pub fn next_screening_action(screening: &[bool], n_screening: usize) -> Option<usize> {
    (screening.len() < n_screening).then_some(screening.len())
}

/// Screening passes when its mean reaches `accuracy`; empty screening passes.
#[must_use]
pub fn passes_screening(screening: &[bool], accuracy: f64) -> bool {
    if screening.is_empty() {
        return true;
    }
    let correct = screening.iter().filter(|b| **b).count();
    #[allow(clippy::cast_precision_loss)]
    let mean = correct as f64 / screening.len() as f64;
    mean >= accuracy
}

/// Sliding gold check over the last `n` graded work items.
///
/// Fewer than `n` graded items pass by default.
#[must_use]
pub fn passes_gold(work: &[Option<bool>], accuracy: f64, n: usize) -> bool {
    let graded: Vec<bool> = work.iter().rev().filter_map(|w| *w).take(n).collect();
    if graded.len() < n {
        return true;
    }
    let correct = graded.iter().filter(|b| **b).count();
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let needed = (accuracy * n as f64).ceil() as usize;
    correct >= needed
}

/// Whether batch `batch_index` may contain gold items.
#[must_use]
pub const fn is_test_batch(batch_index: usize, exponential_backoff: bool) -> bool {
    !exponential_backoff || (batch_index + 1).is_power_of_two()
}

/// Layout of gold slots for one batch: `gold_per_batch` trues, shuffled.
pub fn batch_layout<R: Rng + ?Sized>(batch_size: usize, gold_per_batch: usize, rng: &mut R) -> Vec<bool> {
    let mut slots: Vec<bool> = (0..batch_size).map(|i| i < gold_per_batch).collect();
    slots.shuffle(rng);
    slots
}

/// Decide whether the next work item is a gold test.
///
/// With a seed the batch layout comes from `seed + batch_index` and `rng` is
/// untouched; without one, `rng` supplies the shuffle.
pub fn should_test<R: Rng + ?Sized>(
    n_work: usize,
    config: &GatingConfig,
    seed: Option<u64>,
    rng: &mut R,
) -> bool {
    // Without batches there is nowhere to place gold.
    let Some(batch_index) = n_work.checked_div(config.batch_size) else {
        return false;
    };
    if !is_test_batch(batch_index, config.exponential_backoff) {
        return false;
    }
    let slot = n_work % config.batch_size;
    let layout = match seed {
        Some(seed) => {
            let mut seeded = ChaCha8Rng::seed_from_u64(seed.wrapping_add(batch_index as u64));
            batch_layout(config.batch_size, config.gold_per_batch, &mut seeded)
        }
        None => batch_layout(config.batch_size, config.gold_per_batch, rng),
    };
    layout[slot]
}

/// The scheduler's decision for `history`, or `None` to dismiss the worker.
pub fn next_action<R: Rng + ?Sized>(
    history: &GateHistory,
    config: &GatingConfig,
    seed: Option<u64>,
    rng: &mut R,
) -> Option<GateDecision> {
    if let Some(i) = next_tutorial_action(&history.tutorial, config.n_tutorial) {
        return Some(GateDecision::Tutorial(i));
    }
    if let Some(i) = next_screening_action(&history.screening, config.n_screening) {
        return Some(GateDecision::Screening(i));
    }
    if !passes_screening(&history.screening, config.desired_accuracy) {
        debug!(screening = history.screening.len(), "worker failed screening");
        return None;
    }
    if !passes_gold(&history.work, config.desired_accuracy, config.n_gold_sliding) {
        debug!(work = history.work.len(), "worker failed sliding gold check");
        return None;
    }
    Some(GateDecision::Test(should_test(
        history.work.len(),
        config,
        seed,
        rng,
    )))
}

/// Takes over work-phase decisions once screening has passed.
pub trait WorkAdvisor: Send + Sync {
    fn advise(&self, work: &[Option<bool>], desired_accuracy: f64) -> Result<Option<GateDecision>>;
}

/// Scheduler bound to a configuration, with an optional work advisor.
pub struct Gate {
    config: GatingConfig,
    advisor: Option<Box<dyn WorkAdvisor>>,
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("config", &self.config)
            .field("advisor", &self.advisor.is_some())
            .finish()
    }
}

impl Gate {
    pub fn new(config: GatingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            advisor: None,
        })
    }

    #[must_use]
    pub fn with_advisor(mut self, advisor: Box<dyn WorkAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &GatingConfig {
        &self.config
    }

    /// Decide for `history`; an explicit `seed` overrides the configured one.
    ///
    /// Unseeded calls shuffle with the thread-local generator.
    pub fn next(&self, history: &GateHistory, seed: Option<u64>) -> Result<Option<GateDecision>> {
        self.next_with_rng(history, seed, &mut rand::rng())
    }

    pub fn next_with_rng<R: Rng + ?Sized>(
        &self,
        history: &GateHistory,
        seed: Option<u64>,
        rng: &mut R,
    ) -> Result<Option<GateDecision>> {
        let seed = seed.or(self.config.seed);
        let decision = next_action(history, &self.config, seed, rng);

        let Some(advisor) = &self.advisor else {
            return Ok(decision);
        };
        if decision.is_some_and(|d| d.is_phase_question())
            || !passes_screening(&history.screening, self.config.desired_accuracy)
        {
            return Ok(decision);
        }
        let advised = advisor.advise(&history.work, self.config.desired_accuracy)?;
        debug!(?decision, ?advised, "work decision from advisor");
        Ok(advised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestCase, run_table_tests};
    use rand::rngs::StdRng;

    fn config(n_tutorial: usize, n_screening: usize) -> GatingConfig {
        GatingConfig {
            n_tutorial,
            n_screening,
            seed: Some(0),
            ..GatingConfig::default()
        }
    }

    fn history(tutorial: &[u8], screening: &[u8]) -> GateHistory {
        GateHistory {
            tutorial: tutorial.iter().map(|b| *b == 1).collect(),
            screening: screening.iter().map(|b| *b == 1).collect(),
            work: Vec::new(),
        }
    }

    #[test]
    fn tutorial_phase() {
        let cases = vec![
            TestCase {
                name: "empty starts at zero",
                input: vec![],
                expected: Some(0),
                should_panic: false,
            },
            TestCase {
                name: "wrong answer repeats",
                input: vec![1, 1, 0],
                expected: Some(2),
                should_panic: false,
            },
            TestCase {
                name: "wrong final answer repeats",
                input: vec![1, 1, 1, 1, 0],
                expected: Some(4),
                should_panic: false,
            },
            TestCase {
                name: "advances after right answer",
                input: vec![1, 0, 1],
                expected: Some(3),
                should_panic: false,
            },
            TestCase {
                name: "complete",
                input: vec![1, 1, 1, 1, 1],
                expected: None,
                should_panic: false,
            },
        ];
        run_table_tests(cases, |input: Vec<u8>| {
            let flags: Vec<bool> = input.iter().map(|b| *b == 1).collect();
            next_tutorial_action(&flags, 5)
        })
        .unwrap();
    }

    #[test]
    fn screening_phase() {
        let cfg = config(5, 10);
        let mut rng = StdRng::seed_from_u64(1);
        let done = [1, 1, 1, 1, 1];

        assert_eq!(
            next_action(&history(&done, &[0, 1]), &cfg, Some(0), &mut rng),
            Some(GateDecision::Screening(2))
        );
        let pass = [0, 1, 1, 1, 1, 0, 1, 1, 1, 1];
        assert!(matches!(
            next_action(&history(&done, &pass), &cfg, Some(0), &mut rng),
            Some(GateDecision::Test(_))
        ));
        let fail = [0, 1, 1, 1, 1, 0, 1, 1, 0, 1];
        assert_eq!(
            next_action(&history(&done, &fail), &cfg, Some(0), &mut rng),
            None
        );
    }

    #[test]
    fn gold_window() {
        let mut work = vec![Some(true); 8];
        work.extend([Some(false), None, Some(false)]);
        assert!(!passes_gold(&work, 0.9, 10));
        assert!(passes_gold(&work, 0.8, 10));
        assert!(passes_gold(&[Some(false); 9], 0.8, 10));
    }

    #[test]
    fn backoff_batches() {
        let eligible: Vec<usize> = (0..16).filter(|i| is_test_batch(*i, true)).collect();
        assert_eq!(eligible, vec![0, 1, 3, 7, 15]);
        assert!(is_test_batch(2, false));
    }

    #[test]
    fn seeded_batches_reproduce() {
        let cfg = config(0, 0);
        let mut expected = vec![false; 20];
        for flag in expected.iter_mut().take(5) {
            *flag = true;
        }
        expected.shuffle(&mut ChaCha8Rng::seed_from_u64(0));

        let mut rng = StdRng::seed_from_u64(99);
        let mut work = Vec::new();
        for want in expected {
            let h = GateHistory {
                work: work.clone(),
                ..GateHistory::default()
            };
            assert_eq!(
                next_action(&h, &cfg, Some(0), &mut rng),
                Some(GateDecision::Test(want))
            );
            work.push(None);
        }
    }

    #[test]
    fn zero_batch_size_never_tests() {
        let cfg = GatingConfig {
            batch_size: 0,
            ..config(0, 0)
        };
        let mut rng = StdRng::seed_from_u64(3);
        for n_work in [0, 1, 20] {
            let h = GateHistory {
                work: vec![None; n_work],
                ..GateHistory::default()
            };
            assert_eq!(
                next_action(&h, &cfg, Some(0), &mut rng),
                Some(GateDecision::Test(false))
            );
            assert!(!should_test(n_work, &cfg, None, &mut rng));
        }
    }

    #[test]
    fn batch_layout_has_exact_gold_count() {
        let mut rng = StdRng::seed_from_u64(5);
        let layout = batch_layout(20, 5, &mut rng);
        assert_eq!(layout.len(), 20);
        assert_eq!(layout.iter().filter(|b| **b).count(), 5);
    }

    #[test]
    fn history_accepts_ints_and_nulls() {
        let h = GateHistory::from_json(
            r#"{"tutorial": [1, true, 0], "screening": null, "work": [1, null, false]}"#,
        )
        .unwrap();
        assert_eq!(h.tutorial, vec![true, true, false]);
        assert!(h.screening.is_empty());
        assert_eq!(h.work, vec![Some(true), None, Some(false)]);

        assert!(GateHistory::from_json(r#"{"tutorial": [2]}"#).is_err());
        assert_eq!(GateHistory::from_json("{}").unwrap(), GateHistory::default());
    }

    #[test]
    fn decisions_serialize_as_single_key_objects() {
        assert_eq!(
            serde_json::to_string(&GateDecision::Tutorial(2)).unwrap(),
            r#"{"tutorial":2}"#
        );
        assert_eq!(
            serde_json::to_string(&GateDecision::Test(false)).unwrap(),
            r#"{"test":false}"#
        );
    }

    struct AlwaysTest;

    impl WorkAdvisor for AlwaysTest {
        fn advise(&self, _work: &[Option<bool>], _acc: f64) -> Result<Option<GateDecision>> {
            Ok(Some(GateDecision::Test(true)))
        }
    }

    #[test]
    fn advisor_only_decides_work() {
        let gate = Gate::new(config(2, 0)).unwrap().with_advisor(Box::new(AlwaysTest));
        assert_eq!(
            gate.next(&history(&[1], &[]), None).unwrap(),
            Some(GateDecision::Tutorial(1))
        );
        let mut h = history(&[1, 1], &[]);
        h.work = vec![Some(false); 10];
        assert_eq!(gate.next(&h, None).unwrap(), Some(GateDecision::Test(true)));
    }

    #[test]
    fn explicit_seed_overrides_config() {
        let gate = Gate::new(config(0, 0)).unwrap();
        let h = GateHistory::default();
        let a = gate.next(&h, Some(7)).unwrap();
        let b = gate.next(&h, Some(7)).unwrap();
        assert_eq!(a, b);
        assert!(Gate::new(GatingConfig {
            batch_size: 0,
            ..GatingConfig::default()
        })
        .is_err());
    }
}
