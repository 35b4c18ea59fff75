//! Helpers shared by the integration and property suites.

#![allow(dead_code)]

use crowdgate::config::{GatingConfig, ModelConfig};
use crowdgate::gating::GateHistory;
use crowdgate::inference::History;
use crowdgate::model::{Action, PomdpModel};
use rand::SeedableRng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;

pub const TUTORIAL_COMPLETE: [u8; 5] = [1, 1, 1, 1, 1];
pub const SCREENING_COMPLETE_PASS: [u8; 10] = [0, 1, 1, 1, 1, 0, 1, 1, 1, 1];
pub const SCREENING_COMPLETE_FAIL: [u8; 10] = [0, 1, 1, 1, 1, 0, 1, 1, 0, 1];

pub fn gating_config() -> GatingConfig {
    GatingConfig {
        n_tutorial: 5,
        n_screening: 10,
        desired_accuracy: 0.8,
        n_gold_sliding: 10,
        batch_size: 20,
        gold_per_batch: 5,
        exponential_backoff: true,
        seed: None,
    }
}

pub fn flags(values: &[u8]) -> Vec<bool> {
    values.iter().map(|v| *v == 1).collect()
}

pub fn gate_history(tutorial: &[u8], screening: &[u8], work: Vec<Option<bool>>) -> GateHistory {
    GateHistory {
        tutorial: flags(tutorial),
        screening: flags(screening),
        work,
    }
}

pub fn default_model() -> PomdpModel {
    PomdpModel::from_config(&ModelConfig::default()).expect("default model")
}

/// Workers simulated from the model with a quiz every third step.
pub fn simulated_history(model: &PomdpModel, workers: usize, steps: usize, seed: u64) -> History {
    let mut rng = StdRng::seed_from_u64(seed);
    let quiz = model.spaces.action_index(&Action::Quiz(0)).expect("quiz action");
    let ask = model.spaces.action_index(&Action::Ask(0)).expect("ask action");
    let start = WeightedIndex::new(model.start_belief().expect("start belief")).expect("start weights");

    let mut history = History::new();
    for _ in 0..workers {
        history.new_worker();
        let mut s = start.sample(&mut rng);
        for t in 0..steps {
            let a = if t % 3 == 0 { quiz } else { ask };
            let step = model.sample_step(s, a, &mut rng).expect("sample step");
            history.record(a, step.observation);
            if model.spaces.states[step.next_state].term {
                break;
            }
            s = step.next_state;
        }
    }
    history
}
