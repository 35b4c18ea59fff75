//! Criterion benchmarks for model evaluation, belief tracking and EM.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use std::hint::black_box;

use crowdgate::config::{EstimatorConfig, GatingConfig, ModelConfig};
use crowdgate::gating::{GateHistory, next_action};
use crowdgate::inference::{BeliefTracker, Estimator, History};
use crowdgate::model::export::write_pomdp;
use crowdgate::model::{Action, PomdpModel};

fn simulate(model: &PomdpModel, workers: usize, steps: usize) -> History {
    let mut rng = StdRng::seed_from_u64(42);
    let quiz = model.spaces.action_index(&Action::Quiz(0)).unwrap();
    let ask = model.spaces.action_index(&Action::Ask(0)).unwrap();
    let start = WeightedIndex::new(model.start_belief().unwrap()).unwrap();
    let mut history = History::new();
    for _ in 0..workers {
        history.new_worker();
        let mut s = start.sample(&mut rng);
        for t in 0..steps {
            let a = if t % 3 == 0 { quiz } else { ask };
            let step = model.sample_step(s, a, &mut rng).unwrap();
            history.record(a, step.observation);
            if model.spaces.states[step.next_state].term {
                break;
            }
            s = step.next_state;
        }
    }
    history
}

// =============================================================================
// Model Benchmarks
// =============================================================================

fn model_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("model");
    let model = PomdpModel::from_config(&ModelConfig::default()).unwrap();
    let teaching = PomdpModel::from_config(&ModelConfig {
        explain: true,
        p_learn_exp: vec![0.4],
        ..ModelConfig::default()
    })
    .unwrap();

    group.bench_function("tables_default", |b| {
        b.iter(|| model.make_tables(black_box(&model.params.values)).unwrap());
    });
    group.bench_function("write_pomdp_teaching", |b| {
        b.iter(|| write_pomdp(black_box(&teaching), 0.99).unwrap());
    });
    group.finish();
}

// =============================================================================
// Belief Benchmarks
// =============================================================================

fn belief_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("belief");
    let model = PomdpModel::from_config(&ModelConfig::default()).unwrap();
    let history = simulate(&model, 1, 200);
    let records = history.current();
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("replay_worker", |b| {
        b.iter(|| BeliefTracker::from_records(&model, black_box(records)).unwrap());
    });
    group.finish();
}

// =============================================================================
// Estimation Benchmarks
// =============================================================================

fn estimation_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimation");
    group.sample_size(10);
    let model = PomdpModel::from_config(&ModelConfig::default()).unwrap();

    for workers in [10usize, 50] {
        let history = simulate(&model, workers, 20);
        let config = EstimatorConfig {
            restarts: 0,
            seed: Some(1),
            max_iterations: 20,
            ..EstimatorConfig::default()
        };
        let estimator = Estimator::from_config(&model, &config).unwrap();
        group.throughput(Throughput::Elements(history.total_steps() as u64));

        group.bench_with_input(BenchmarkId::new("e_step", workers), &history, |b, h| {
            b.iter(|| estimator.e_step(h, &model.params.values).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("estimate", workers), &history, |b, h| {
            b.iter(|| estimator.estimate(h).unwrap());
        });
    }
    group.finish();
}

// =============================================================================
// Gating Benchmarks
// =============================================================================

fn gating_benchmarks(c: &mut Criterion) {
    let config = GatingConfig {
        n_tutorial: 5,
        n_screening: 10,
        ..GatingConfig::default()
    };
    let history = GateHistory {
        tutorial: vec![true; 5],
        screening: vec![true; 10],
        work: vec![None; 500],
    };
    c.bench_function("gating_next_action", |b| {
        let mut rng = StdRng::seed_from_u64(0);
        b.iter(|| next_action(black_box(&history), &config, Some(7), &mut rng));
    });
}

criterion_group!(
    benches,
    model_benchmarks,
    belief_benchmarks,
    estimation_benchmarks,
    gating_benchmarks,
);

criterion_main!(benches);
