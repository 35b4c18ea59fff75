use crowdgate::GateError;
use crowdgate::config::EstimatorConfig;
use crowdgate::inference::Estimator;

use crate::common::{default_model, simulated_history};

fn config(restarts: usize, parallel: bool) -> EstimatorConfig {
    EstimatorConfig {
        restarts,
        seed: Some(7),
        parallel,
        max_iterations: 50,
        ..EstimatorConfig::default()
    }
}

#[test]
fn log_likelihood_trace_never_decreases() {
    let model = default_model();
    let history = simulated_history(&model, 30, 12, 11);
    let estimator = Estimator::from_config(&model, &config(0, false)).unwrap();
    let estimate = estimator.estimate(&history).unwrap();

    assert!(!estimate.trace.is_empty());
    for pair in estimate.trace.windows(2) {
        assert!(pair[1] >= pair[0] - 1e-9, "trace decreased: {:?}", estimate.trace);
    }
    assert_eq!(estimate.trace.last().copied(), Some(estimate.log_likelihood));
}

#[test]
fn seeded_restarts_match_across_execution_modes() {
    let model = default_model();
    let history = simulated_history(&model, 20, 10, 5);
    let sequential = Estimator::from_config(&model, &config(2, false))
        .unwrap()
        .estimate(&history)
        .unwrap();
    let parallel = Estimator::from_config(&model, &config(2, true))
        .unwrap()
        .estimate(&history)
        .unwrap();

    assert_eq!(sequential.restart, parallel.restart);
    assert!((sequential.log_likelihood - parallel.log_likelihood).abs() < 1e-9);
    assert_eq!(sequential.values, parallel.values);
}

#[test]
fn estimated_parameters_stay_normalized() {
    let model = default_model();
    let history = simulated_history(&model, 25, 10, 3);
    let estimate = Estimator::from_config(&model, &config(1, true))
        .unwrap()
        .estimate(&history)
        .unwrap();
    for (key, values) in &estimate.values {
        let sum: f64 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "{key:?} sums to {sum}");
    }
}

#[test]
fn bic_score_subtracts_complexity_penalty() {
    let model = default_model();
    let history = simulated_history(&model, 10, 8, 2);
    let estimate = Estimator::from_config(&model, &config(0, false))
        .unwrap()
        .estimate(&history)
        .unwrap();
    let bic = estimate.bic_score(&model.params, &history);
    assert!(bic < estimate.log_likelihood);
}

#[test]
fn unknown_prior_variant_is_rejected() {
    let model = default_model();
    let config = EstimatorConfig {
        prior: "no_such_prior".to_string(),
        ..EstimatorConfig::default()
    };
    assert!(matches!(
        Estimator::from_config(&model, &config),
        Err(GateError::UnknownPriorVariant(name)) if name == "no_such_prior"
    ));
}
