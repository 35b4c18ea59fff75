use crowdgate::gating::{Gate, GateDecision, next_action};
use crowdgate::test_utils::expected_batch;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::common::{
    SCREENING_COMPLETE_FAIL, SCREENING_COMPLETE_PASS, TUTORIAL_COMPLETE, gate_history,
    gating_config,
};

fn decide(tutorial: &[u8], screening: &[u8], work: Vec<Option<bool>>) -> Option<GateDecision> {
    let mut rng = StdRng::seed_from_u64(12345);
    next_action(
        &gate_history(tutorial, screening, work),
        &gating_config(),
        Some(0),
        &mut rng,
    )
}

fn as_work(batch: &[bool]) -> Vec<Option<bool>> {
    batch.iter().map(|gold| gold.then_some(true)).collect()
}

#[test]
fn tutorial_retries_last_wrong_answer() {
    assert_eq!(decide(&[1, 1, 0], &[], vec![]), Some(GateDecision::Tutorial(2)));
    assert_eq!(
        decide(&[1, 1, 1, 1, 0], &[], vec![]),
        Some(GateDecision::Tutorial(4))
    );
}

#[test]
fn screening_progress_pass_and_fail() {
    assert_eq!(
        decide(&TUTORIAL_COMPLETE, &[0, 1], vec![]),
        Some(GateDecision::Screening(2))
    );
    assert!(matches!(
        decide(&TUTORIAL_COMPLETE, &SCREENING_COMPLETE_PASS, vec![]),
        Some(GateDecision::Test(_))
    ));
    assert_eq!(
        decide(&TUTORIAL_COMPLETE, &SCREENING_COMPLETE_FAIL, vec![]),
        None
    );
}

#[test]
fn first_batch_follows_seed_zero() {
    let batch = expected_batch(0, 20, 5);
    for i in 0..20 {
        let decision = decide(&TUTORIAL_COMPLETE, &SCREENING_COMPLETE_PASS, as_work(&batch[..i]));
        assert_eq!(decision, Some(GateDecision::Test(batch[i])), "item {i}");
    }
}

#[test]
fn second_batch_follows_seed_one() {
    let first = expected_batch(0, 20, 5);
    let second = expected_batch(1, 20, 5);
    for i in 0..20 {
        let mut work = as_work(&first);
        work.extend(as_work(&second[..i]));
        let decision = decide(&TUTORIAL_COMPLETE, &SCREENING_COMPLETE_PASS, work);
        assert_eq!(decision, Some(GateDecision::Test(second[i])), "item {i}");
    }
}

#[test]
fn third_batch_is_work_until_gold_window_fails() {
    let mut base = as_work(&expected_batch(0, 20, 5));
    base.extend(as_work(&expected_batch(1, 20, 5)));
    for i in 0..4 {
        let mut work = base.clone();
        work.extend(std::iter::repeat_n(Some(false), i));
        let decision = decide(&TUTORIAL_COMPLETE, &SCREENING_COMPLETE_PASS, work);
        if i == 3 {
            assert_eq!(decision, None);
        } else {
            assert_eq!(decision, Some(GateDecision::Test(false)), "item {i}");
        }
    }
}

#[test]
fn gate_uses_configured_seed_unless_overridden() {
    let seeded = Gate::new(crowdgate::config::GatingConfig {
        seed: Some(0),
        ..gating_config()
    })
    .unwrap();
    let batch = expected_batch(0, 20, 5);
    let history = gate_history(&TUTORIAL_COMPLETE, &SCREENING_COMPLETE_PASS, vec![]);
    assert_eq!(
        seeded.next(&history, None).unwrap(),
        Some(GateDecision::Test(batch[0]))
    );

    let other = expected_batch(9, 20, 5);
    assert_eq!(
        seeded.next(&history, Some(9)).unwrap(),
        Some(GateDecision::Test(other[0]))
    );
}

#[test]
fn json_history_round_trip_through_gate() {
    let gate = Gate::new(gating_config()).unwrap();
    let history = crowdgate::gating::GateHistory::from_json(
        r#"{"tutorial": [1, 1, 1, 1, 1], "screening": [1, 1, 1]}"#,
    )
    .unwrap();
    let decision = gate.next(&history, Some(0)).unwrap();
    assert_eq!(
        serde_json::to_string(&decision).unwrap(),
        r#"{"screening":3}"#
    );
    let dismissed: Option<GateDecision> = None;
    assert_eq!(serde_json::to_string(&dismissed).unwrap(), "null");
}
