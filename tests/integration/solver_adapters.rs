#![cfg(unix)]

use std::time::{Duration, Instant};

use crowdgate::GateError;
use crowdgate::policy::{AiToolboxSolver, ApplSolver, Solver, SolverProcess, ZmdpSolver};
use crowdgate::test_utils::fixtures::Workspace;

use crate::common::default_model;

#[test]
fn zmdp_adapter_reads_sparse_policy() {
    let ws = Workspace::new().unwrap();
    let binary = ws
        .fake_solver(
            "zmdp",
            r#"[ "$1" = solve ] || exit 9
cat > "$4" <<'POLICY'
{
  policyType => "MaxPlanesLowerBoundWithPrune",
  planes => [
    {
      action => 2,
      numEntries => 1,
      entries => [
        0, 1.5
      ]
    }
  ]
}
POLICY"#,
        )
        .unwrap();
    let workdir = ws.path().join("work");
    let model = default_model();
    let solver = ZmdpSolver::new(
        SolverProcess::new(&binary, 0.95).with_workdir(Some(workdir.clone())),
    );

    let policy = solver.solve(&model).unwrap();
    assert_eq!(policy.vectors.len(), 1);
    assert_eq!(policy.vectors[0].action, 2);
    assert_eq!(policy.vectors[0].values[0], Some(1.5));

    let written = std::fs::read_to_string(workdir.join("model.pomdp")).unwrap();
    assert!(written.starts_with("discount: 0.95"));
}

#[test]
fn appl_adapter_passes_timeout_and_reads_xml() {
    let ws = Workspace::new().unwrap();
    let binary = ws
        .fake_solver(
            "appl",
            r#"[ "$4" = --timeout ] && [ "$5" = 30 ] || exit 9
cat > "$3" <<'POLICY'
<?xml version="1.0"?>
<Policy>
<AlphaVector>
<Vector action="1">0.25 0.5</Vector>
</AlphaVector>
</Policy>
POLICY"#,
        )
        .unwrap();
    let model = default_model();
    let solver = ApplSolver::new(
        SolverProcess::new(&binary, 0.99).with_timeout(Some(Duration::from_secs(30))),
    );
    let policy = solver.solve(&model).unwrap();
    assert_eq!(policy.vectors[0].action, 1);
    assert_eq!(policy.vectors[0].values, vec![Some(0.25), Some(0.5)]);
}

#[test]
fn aitoolbox_adapter_reads_last_horizon() {
    let ws = Workspace::new().unwrap();
    let model = default_model();
    let zeros = vec!["0"; model.n_states()].join(" ");
    let ones = vec!["1"; model.n_states()].join(" ");
    let binary = ws
        .fake_solver(
            "aitoolbox",
            &format!(
                "[ \"$8\" = 12 ] || exit 9\nprintf '{zeros} 0\\n@\\n{ones} 3\\n' > \"$4\""
            ),
        )
        .unwrap();
    let solver = AiToolboxSolver::new(SolverProcess::new(&binary, 0.9), 12);
    let policy = solver.solve(&model).unwrap();
    assert_eq!(policy.vectors.len(), 1);
    assert_eq!(policy.vectors[0].action, 3);
}

#[test]
fn nonzero_exit_is_reported_with_stderr() {
    let ws = Workspace::new().unwrap();
    let binary = ws.fake_solver("broken", "echo boom >&2\nexit 3").unwrap();
    let solver = ZmdpSolver::new(SolverProcess::new(&binary, 0.99));
    match solver.solve(&default_model()) {
        Err(GateError::SolverFailed {
            solver,
            code,
            stderr,
        }) => {
            assert_eq!(solver, "zmdp");
            assert_eq!(code, Some(3));
            assert_eq!(stderr, "boom");
        }
        other => panic!("expected solver failure, got {other:?}"),
    }
}

#[test]
fn missing_policy_output_is_an_io_error() {
    let ws = Workspace::new().unwrap();
    let binary = ws.fake_solver("lazy", "exit 0").unwrap();
    let solver = ZmdpSolver::new(SolverProcess::new(&binary, 0.99));
    assert!(matches!(solver.solve(&default_model()), Err(GateError::Io(_))));
}

#[test]
fn slow_solver_is_killed_at_deadline() {
    let ws = Workspace::new().unwrap();
    let binary = ws.fake_solver("slow", "sleep 30").unwrap();
    let solver = ApplSolver::new(
        SolverProcess::new(&binary, 0.99)
            .with_timeout(Some(Duration::from_millis(200)))
            .with_kill_grace(Duration::ZERO),
    );
    let started = Instant::now();
    let result = solver.solve(&default_model());
    assert!(matches!(result, Err(GateError::SolverTimeout { solver: "appl", .. })));
    assert!(started.elapsed() < Duration::from_secs(20));
}
