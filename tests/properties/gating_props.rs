use crowdgate::gating::{GateDecision, next_action, passes_gold};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::common::{SCREENING_COMPLETE_PASS, TUTORIAL_COMPLETE, gate_history, gating_config};

fn work_items() -> impl Strategy<Value = Vec<Option<bool>>> {
    prop::collection::vec(prop::option::of(any::<bool>()), 0..80)
}

proptest! {
    #[test]
    fn seeded_decision_ignores_caller_rng(
        work in work_items(),
        seed in any::<u64>(),
        a in any::<u64>(),
        b in any::<u64>(),
    ) {
        let history = gate_history(&TUTORIAL_COMPLETE, &SCREENING_COMPLETE_PASS, work);
        let config = gating_config();
        let first = next_action(&history, &config, Some(seed), &mut StdRng::seed_from_u64(a));
        let second = next_action(&history, &config, Some(seed), &mut StdRng::seed_from_u64(b));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn work_phase_only_tests_or_dismisses(work in work_items(), seed in any::<u64>()) {
        let history = gate_history(&TUTORIAL_COMPLETE, &SCREENING_COMPLETE_PASS, work);
        let decision = next_action(&history, &gating_config(), Some(seed), &mut rand::rng());
        prop_assert!(matches!(decision, None | Some(GateDecision::Test(_))));
    }

    #[test]
    fn short_gold_windows_always_pass(graded in prop::collection::vec(any::<bool>(), 0..10)) {
        let work: Vec<Option<bool>> = graded.into_iter().map(Some).collect();
        prop_assert!(passes_gold(&work, 0.8, 10));
    }
}
