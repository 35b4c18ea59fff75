use crowdgate::GateError;
use crowdgate::config::ModelConfig;
use crowdgate::model::PomdpModel;
use crowdgate::model::export::{CassandraModel, write_pomdp, write_pomdp_file, write_txt};
use crowdgate::test_utils::fixtures::Workspace;

use crate::common::default_model;

fn assert_close(left: &[f64], right: &[f64], what: &str) {
    assert_eq!(left.len(), right.len(), "{what} length");
    for (i, (l, r)) in left.iter().zip(right).enumerate() {
        assert!((l - r).abs() < 1e-12, "{what}[{i}]: {l} != {r}");
    }
}

#[test]
fn cassandra_export_reads_back_to_model_tables() {
    let model = default_model();
    let parsed = CassandraModel::parse(&write_pomdp(&model, 0.99).unwrap()).unwrap();
    let tables = model.make_tables(&model.params.values).unwrap();

    assert!((parsed.discount - 0.99).abs() < f64::EPSILON);
    assert_eq!(parsed.states.len(), model.n_states());
    assert_eq!(parsed.actions.len(), model.n_actions());
    assert_eq!(parsed.observations.len(), model.n_observations());
    assert_close(&parsed.start, &tables.start, "start");
    assert_close(&parsed.transition, &tables.transition, "transition");
    assert_close(&parsed.observation, &tables.observation, "observation");
    assert_close(&parsed.reward, &tables.reward, "reward");
}

#[test]
fn teaching_model_exports_every_action() {
    let model = PomdpModel::from_config(&ModelConfig {
        explain: true,
        tell: true,
        p_learn_exp: vec![0.4],
        p_learn_tell: vec![0.1],
        ..ModelConfig::default()
    })
    .unwrap();
    let parsed = CassandraModel::parse(&write_pomdp(&model, 0.9).unwrap()).unwrap();
    let names: Vec<String> = model.spaces.actions.iter().map(ToString::to_string).collect();
    assert_eq!(parsed.actions, names);
    assert!(names.iter().any(|n| n == "exp0"));
    assert!(names.iter().any(|n| n == "tell0"));
}

#[test]
fn txt_export_has_one_line_per_state_and_table() {
    let model = default_model();
    let text = write_txt(&model).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    let n_s = model.n_states();
    assert_eq!(lines.len(), 2 * n_s);

    let transition_fields = lines[0].split('\t').filter(|f| !f.is_empty()).count();
    assert_eq!(transition_fields, 2 * model.n_actions() * n_s);
    let observation_fields = lines[n_s].split('\t').filter(|f| !f.is_empty()).count();
    assert_eq!(observation_fields, model.n_actions() * model.n_observations());
}

#[test]
fn discount_of_one_is_rejected() {
    let model = default_model();
    assert!(matches!(
        write_pomdp(&model, 1.0),
        Err(GateError::InvalidDiscount(d)) if (d - 1.0).abs() < f64::EPSILON
    ));

    let ws = Workspace::new().unwrap();
    let path = ws.path().join("model.pomdp");
    assert!(write_pomdp_file(&model, 1.5, &path).is_err());
    assert!(!path.exists());
}
