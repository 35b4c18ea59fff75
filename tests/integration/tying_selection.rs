use crowdgate::config::EstimatorConfig;
use crowdgate::inference::select_tying;
use crowdgate::model::ParamName;

use crate::common::{default_model, simulated_history};

fn config() -> EstimatorConfig {
    EstimatorConfig {
        restarts: 0,
        last_params: true,
        seed: Some(3),
        parallel: false,
        max_iterations: 5,
        ..EstimatorConfig::default()
    }
}

#[test]
fn every_tying_layout_is_ranked_by_bic() {
    let model = default_model();
    let history = simulated_history(&model, 15, 10, 21);
    let candidates = select_tying(&model.params, &history, &config()).unwrap();

    assert_eq!(candidates.len(), 16);
    for pair in candidates.windows(2) {
        assert!(pair[0].bic_score >= pair[1].bic_score);
    }
    for candidate in &candidates {
        let score = candidate.log_likelihood - candidate.bic_penalty;
        assert!((candidate.bic_score - score).abs() < 1e-9);
        assert!(candidate.log_likelihood.is_finite());
    }
}

#[test]
fn tying_everything_pays_the_smallest_penalty() {
    let model = default_model();
    let history = simulated_history(&model, 10, 8, 4);
    let candidates = select_tying(&model.params, &history, &config()).unwrap();

    let all_shared = candidates
        .iter()
        .find(|c| c.shared.len() == 4)
        .unwrap();
    let none_shared = candidates.iter().find(|c| c.shared.is_empty()).unwrap();
    assert!(all_shared.shared.contains(&ParamName::PGuess));
    for candidate in &candidates {
        assert!(all_shared.bic_penalty <= candidate.bic_penalty);
        assert!(none_shared.bic_penalty >= candidate.bic_penalty);
    }
    assert_eq!(all_shared.params["p_slip"].len(), 1);
    assert_eq!(none_shared.params["p_slip"].len(), 2);
}

#[test]
fn sequential_and_parallel_sweeps_agree() {
    let model = default_model();
    let history = simulated_history(&model, 8, 8, 9);
    let sequential = select_tying(&model.params, &history, &config()).unwrap();
    let parallel = select_tying(
        &model.params,
        &history,
        &EstimatorConfig {
            parallel: true,
            ..config()
        },
    )
    .unwrap();

    let names = |c: &[crowdgate::inference::TyingCandidate]| {
        c.iter().map(|c| c.name.clone()).collect::<Vec<_>>()
    };
    assert_eq!(names(&sequential), names(&parallel));
}
