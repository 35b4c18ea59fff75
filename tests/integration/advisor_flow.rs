use crowdgate::config::ModelConfig;
use crowdgate::gating::{Gate, GateDecision};
use crowdgate::model::{Action, PomdpModel};
use crowdgate::policy::{AlphaPolicy, AlphaVector, PolicyAdvisor, PolicyFormat};

use crate::common::{SCREENING_COMPLETE_FAIL, SCREENING_COMPLETE_PASS, TUTORIAL_COMPLETE, gate_history, gating_config};

fn favoring(action: &Action) -> AlphaPolicy {
    let model = PomdpModel::from_config(&ModelConfig::for_accuracy(0.8)).unwrap();
    let n = model.n_states();
    let vectors = model
        .spaces
        .actions
        .iter()
        .enumerate()
        .map(|(a, candidate)| AlphaVector {
            action: a,
            values: vec![Some(if candidate == action { 2.0 } else { 0.0 }); n],
        })
        .collect();
    AlphaPolicy {
        format: PolicyFormat::Zmdp,
        vectors,
    }
}

fn gate_with(action: &Action) -> Gate {
    Gate::new(gating_config())
        .unwrap()
        .with_advisor(Box::new(PolicyAdvisor::with_policy(favoring(action)).with_seed(Some(3))))
}

#[test]
fn advisor_is_not_consulted_during_phases() {
    let gate = gate_with(&Action::Boot);
    let history = gate_history(&[1, 0], &[], vec![]);
    assert_eq!(gate.next(&history, Some(0)).unwrap(), Some(GateDecision::Tutorial(1)));

    let history = gate_history(&TUTORIAL_COMPLETE, &[1, 1], vec![]);
    assert_eq!(gate.next(&history, Some(0)).unwrap(), Some(GateDecision::Screening(2)));
}

#[test]
fn failed_screening_dismisses_without_advice() {
    let gate = gate_with(&Action::Quiz(0));
    let history = gate_history(&TUTORIAL_COMPLETE, &SCREENING_COMPLETE_FAIL, vec![]);
    assert_eq!(gate.next(&history, Some(0)).unwrap(), None);
}

#[test]
fn advisor_drives_work_phase() {
    let history = gate_history(
        &TUTORIAL_COMPLETE,
        &SCREENING_COMPLETE_PASS,
        vec![Some(true), None, None],
    );
    assert_eq!(
        gate_with(&Action::Quiz(0)).next(&history, Some(0)).unwrap(),
        Some(GateDecision::Test(true))
    );
    assert_eq!(
        gate_with(&Action::Ask(0)).next(&history, Some(0)).unwrap(),
        Some(GateDecision::Test(false))
    );
    assert_eq!(gate_with(&Action::Boot).next(&history, Some(0)).unwrap(), None);
}

#[cfg(unix)]
#[test]
fn resolving_advisor_runs_solver_per_decision() {
    use crowdgate::policy::{SolverProcess, ZmdpSolver};
    use crowdgate::test_utils::fixtures::Workspace;

    let model = PomdpModel::from_config(&ModelConfig::for_accuracy(0.8)).unwrap();
    let quiz = model.spaces.action_index(&Action::Quiz(0)).unwrap();
    let entries: Vec<String> = (0..model.n_states()).map(|s| format!("{s}, 1.0")).collect();
    let ws = Workspace::new().unwrap();
    let binary = ws
        .fake_solver(
            "zmdp",
            &format!(
                "cat > \"$4\" <<'POLICY'\nplanes => [\n{{\naction => {quiz},\nentries => [ {} ]\n}}\n]\nPOLICY",
                entries.join(", ")
            ),
        )
        .unwrap();
    let solver = ZmdpSolver::new(SolverProcess::new(&binary, 0.99));
    let gate = Gate::new(gating_config())
        .unwrap()
        .with_advisor(Box::new(PolicyAdvisor::resolving(Box::new(solver))));

    let history = gate_history(&TUTORIAL_COMPLETE, &SCREENING_COMPLETE_PASS, vec![None]);
    assert_eq!(gate.next(&history, Some(0)).unwrap(), Some(GateDecision::Test(true)));
}
