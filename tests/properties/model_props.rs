use crowdgate::config::{EstimatorConfig, ModelConfig};
use crowdgate::inference::{BeliefTracker, Estimator, History};
use crowdgate::model::{Action, PomdpModel};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

fn pair(range: std::ops::Range<f64>) -> impl Strategy<Value = [f64; 2]> {
    (range.clone(), range).prop_map(|(a, b)| [a, b])
}

/// Worker models with one or two question types (one rule per type) and
/// any combination of explained and told teaching.
fn model_config() -> impl Strategy<Value = ModelConfig> {
    (
        (any::<bool>(), any::<bool>(), any::<bool>()),
        0.05f64..0.95,
        (pair(0.01..0.49), pair(0.01..0.49)),
        pair(0.05..0.95),
        pair(0.01..0.3),
        0.01f64..0.3,
        pair(0.1..0.9),
        (pair(0.05..0.9), pair(0.05..0.9)),
    )
        .prop_map(
            |((two_types, explain, tell), w, (slip_a, slip_b), guess, lose, leave, p_s, (exp, told))| {
                let n = if two_types { 2 } else { 1 };
                let mut p_slip = slip_a[..n].to_vec();
                p_slip.extend_from_slice(&slip_b[..n]);
                ModelConfig {
                    p_worker: vec![w, 1.0 - w],
                    p_r: vec![1.0 / n as f64; n],
                    p_1: vec![0.5; n],
                    p_s: p_s[..n].to_vec(),
                    p_slip,
                    p_guess: guess[..n].to_vec(),
                    p_lose: lose[..n].to_vec(),
                    p_leave: vec![leave],
                    p_learn_exp: if explain { exp[..n].to_vec() } else { Vec::new() },
                    p_learn_tell: if tell { told[..n].to_vec() } else { Vec::new() },
                    explain,
                    tell,
                    ..ModelConfig::default()
                }
            },
        )
}

/// Workers driven by uniformly random valid actions, teaching included.
fn random_walk(model: &PomdpModel, workers: usize, steps: usize, seed: u64) -> History {
    let mut rng = StdRng::seed_from_u64(seed);
    let start = WeightedIndex::new(model.start_belief().unwrap()).unwrap();
    let mut history = History::new();
    for _ in 0..workers {
        history.new_worker();
        let mut s = start.sample(&mut rng);
        let mut last = None;
        for _ in 0..steps {
            let choices: Vec<usize> = model
                .valid_actions(last)
                .into_iter()
                .filter(|&a| model.spaces.actions[a] != Action::Boot)
                .collect();
            let a = *choices.choose(&mut rng).unwrap();
            let step = model.sample_step(s, a, &mut rng).unwrap();
            history.record(a, step.observation);
            if model.spaces.states[step.next_state].term {
                break;
            }
            s = step.next_state;
            last = Some(a);
        }
    }
    history
}

fn close_to_one(sum: f64) -> bool {
    (sum - 1.0).abs() < 1e-9
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn start_belief_is_a_distribution(config in model_config()) {
        let model = PomdpModel::from_config(&config).unwrap();
        let start = model.start_belief().unwrap();
        prop_assert_eq!(start.len(), model.n_states());
        prop_assert!(start.iter().all(|p| *p >= 0.0));
        prop_assert!(close_to_one(start.iter().sum()));
    }

    #[test]
    fn transition_and_observation_rows_sum_to_one(config in model_config()) {
        let model = PomdpModel::from_config(&config).unwrap();
        let tables = model.probability_tables(&model.params.values).unwrap();
        for s in 0..tables.n_states {
            for a in 0..tables.n_actions {
                let t: f64 = (0..tables.n_states).map(|s1| tables.t(s, a, s1)).sum();
                let o: f64 = (0..tables.n_observations).map(|o| tables.o(s, a, o)).sum();
                prop_assert!(close_to_one(t), "T row s={} a={} sums to {}", s, a, t);
                prop_assert!(close_to_one(o), "O row s={} a={} sums to {}", s, a, o);
            }
        }
    }

    #[test]
    fn belief_stays_normalized_along_sampled_histories(
        config in model_config(),
        seed in any::<u64>(),
    ) {
        let model = PomdpModel::from_config(&config).unwrap();
        let history = random_walk(&model, 1, 15, seed);
        let mut tracker = BeliefTracker::new(&model).unwrap();
        for record in history.current() {
            tracker.update(record.action, record.observation).unwrap();
            prop_assert!(close_to_one(tracker.belief().iter().sum()));
            prop_assert!(tracker.belief().iter().all(|p| *p >= 0.0));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn em_trace_is_monotone(config in model_config(), seed in any::<u64>()) {
        let model = PomdpModel::from_config(&config).unwrap();
        let history = random_walk(&model, 6, 8, seed);
        let config = EstimatorConfig {
            restarts: 0,
            max_iterations: 10,
            parallel: false,
            seed: Some(seed),
            ..EstimatorConfig::default()
        };
        let estimate = Estimator::from_config(&model, &config)
            .unwrap()
            .estimate(&history)
            .unwrap();
        for pair in estimate.trace.windows(2) {
            prop_assert!(pair[1] >= pair[0] - 1e-9);
        }
    }
}
