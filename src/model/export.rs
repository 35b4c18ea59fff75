//! Solver input formats.
//!
//! Models are rendered completely in memory and checked row by row before
//! anything reaches the filesystem, so a failed check never leaves a partial
//! model file behind.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use tracing::debug;

use crate::error::{GateError, Result};

use super::pomdp::PomdpModel;

/// Tolerance for transition and observation rows summing to one.
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

/// Render the model in Cassandra `.pomdp` format.
pub fn write_pomdp(model: &PomdpModel, discount: f64) -> Result<String> {
    if discount >= 1.0 {
        return Err(GateError::InvalidDiscount(discount));
    }
    let spaces = &model.spaces;
    let names = |items: Vec<String>| items.join(" ");

    let mut out = String::new();
    writeln!(out, "discount: {discount}").ok();
    writeln!(out, "values: reward").ok();
    writeln!(
        out,
        "states: {}",
        names(spaces.states.iter().map(ToString::to_string).collect())
    )
    .ok();
    writeln!(
        out,
        "actions: {}",
        names(spaces.actions.iter().map(ToString::to_string).collect())
    )
    .ok();
    writeln!(
        out,
        "observations: {}",
        names(spaces.observations.iter().map(ToString::to_string).collect())
    )
    .ok();
    let start = model.start_belief()?;
    writeln!(
        out,
        "start: {}",
        names(start.iter().map(ToString::to_string).collect())
    )
    .ok();

    out.push_str("\n\n### Transitions\n");
    for (s, st) in spaces.states.iter().enumerate() {
        for (a, act) in spaces.actions.iter().enumerate() {
            let mut sum = 0.0;
            for (s1, st1) in spaces.states.iter().enumerate() {
                let p = model.transition(s, a, s1)?;
                writeln!(out, "T: {act} : {st} : {st1} {p}").ok();
                sum += p;
            }
            check_row("transition", &st.to_string(), &act.to_string(), sum)?;
            out.push('\n');
        }
    }

    out.push_str("\n\n### Observations\n");
    for (s, st) in spaces.states.iter().enumerate() {
        for (a, act) in spaces.actions.iter().enumerate() {
            let mut sum = 0.0;
            for (o, obs) in spaces.observations.iter().enumerate() {
                let p = model.observation(s, a, o)?;
                writeln!(out, "O: {act} : {st} : {obs} {p}").ok();
                sum += p;
            }
            check_row("observation", &st.to_string(), &act.to_string(), sum)?;
            out.push('\n');
        }
    }

    out.push_str("\n\n### Rewards\n");
    for (s, st) in spaces.states.iter().enumerate() {
        for (a, act) in spaces.actions.iter().enumerate() {
            for (s1, st1) in spaces.states.iter().enumerate() {
                let (cost, reward) = model.reward(s, a, s1)?;
                writeln!(out, "R: {act} : {st} : {st1} : * {}", cost + reward).ok();
            }
            out.push('\n');
        }
    }

    Ok(out)
}

/// Render the model as tab-separated tables for AI-Toolbox: one line per
/// state of `(transition, reward)` pairs over `(a, s1)`, then one line per
/// state of observation probabilities over `(a, o)`.
pub fn write_txt(model: &PomdpModel) -> Result<String> {
    let (n_s, n_a, n_o) = (model.n_states(), model.n_actions(), model.n_observations());
    let mut out = String::new();
    for s in 0..n_s {
        for a in 0..n_a {
            let mut sum = 0.0;
            for s1 in 0..n_s {
                let p = model.transition(s, a, s1)?;
                let (cost, reward) = model.reward(s, a, s1)?;
                write!(out, "{p}\t{}\t", cost + reward).ok();
                sum += p;
            }
            check_row("transition", &s.to_string(), &a.to_string(), sum)?;
        }
        out.push('\n');
    }
    for s in 0..n_s {
        for a in 0..n_a {
            let mut sum = 0.0;
            for o in 0..n_o {
                let p = model.observation(s, a, o)?;
                write!(out, "{p}\t").ok();
                sum += p;
            }
            check_row("observation", &s.to_string(), &a.to_string(), sum)?;
        }
        out.push('\n');
    }
    Ok(out)
}

pub fn write_pomdp_file(model: &PomdpModel, discount: f64, path: &Path) -> Result<()> {
    let rendered = write_pomdp(model, discount)?;
    std::fs::write(path, rendered)?;
    debug!(path = %path.display(), states = model.n_states(), "wrote pomdp model");
    Ok(())
}

pub fn write_txt_file(model: &PomdpModel, path: &Path) -> Result<()> {
    let rendered = write_txt(model)?;
    std::fs::write(path, rendered)?;
    debug!(path = %path.display(), states = model.n_states(), "wrote txt model");
    Ok(())
}

fn check_row(kind: &'static str, state: &str, action: &str, sum: f64) -> Result<()> {
    if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
        return Err(GateError::RowSum {
            kind,
            state: state.to_string(),
            action: action.to_string(),
            sum,
        });
    }
    Ok(())
}

/// A Cassandra model read back from text, with dense tables indexed like
/// [`super::pomdp::ModelTables`].
#[derive(Debug, Clone)]
pub struct CassandraModel {
    pub discount: f64,
    pub states: Vec<String>,
    pub actions: Vec<String>,
    pub observations: Vec<String>,
    pub start: Vec<f64>,
    pub transition: Vec<f64>,
    pub observation: Vec<f64>,
    pub reward: Vec<f64>,
}

impl CassandraModel {
    /// Parse the explicit-entry subset of the format that [`write_pomdp`]
    /// produces.
    pub fn parse(text: &str) -> Result<Self> {
        let mut discount = None;
        let mut states = Vec::new();
        let mut actions = Vec::new();
        let mut observations = Vec::new();
        let mut start = Vec::new();
        let mut entries: Vec<(&str, Vec<String>, f64)> = Vec::new();

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (head, rest) = line
                .split_once(':')
                .ok_or_else(|| parse_error(lineno, "missing ':'"))?;
            let words = || rest.split_whitespace().map(ToString::to_string).collect();
            match head.trim() {
                "discount" => discount = Some(parse_float(lineno, rest.trim())?),
                "values" => {}
                "states" => states = words(),
                "actions" => actions = words(),
                "observations" => observations = words(),
                "start" => {
                    start = rest
                        .split_whitespace()
                        .map(|v| parse_float(lineno, v))
                        .collect::<Result<_>>()?;
                }
                kind @ ("T" | "O" | "R") => {
                    let mut fields: Vec<String> =
                        rest.split(':').map(|f| f.trim().to_string()).collect();
                    let last = fields
                        .pop()
                        .ok_or_else(|| parse_error(lineno, "empty entry"))?;
                    let (name, value) = last
                        .rsplit_once(' ')
                        .ok_or_else(|| parse_error(lineno, "missing value"))?;
                    fields.push(name.trim().to_string());
                    entries.push((kind, fields, parse_float(lineno, value)?));
                }
                other => return Err(parse_error(lineno, &format!("unknown section {other}"))),
            }
        }

        let index = |names: &[String]| -> HashMap<String, usize> {
            names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.clone(), i))
                .collect()
        };
        let (s_idx, a_idx, o_idx) = (index(&states), index(&actions), index(&observations));
        let (n_s, n_a, n_o) = (states.len(), actions.len(), observations.len());
        let mut transition = vec![0.0; n_s * n_a * n_s];
        let mut observation = vec![0.0; n_s * n_a * n_o];
        let mut reward = vec![0.0; n_s * n_a * n_s];

        let find = |map: &HashMap<String, usize>, name: &str| {
            map.get(name)
                .copied()
                .ok_or_else(|| GateError::ModelParse(format!("unknown name {name}")))
        };
        for (tag, fields, value) in entries {
            let field = |i: usize| fields.get(i).map_or("", String::as_str);
            let a = find(&a_idx, field(0))?;
            let s = find(&s_idx, field(1))?;
            match tag {
                "T" => transition[(s * n_a + a) * n_s + find(&s_idx, field(2))?] = value,
                "O" => observation[(s * n_a + a) * n_o + find(&o_idx, field(2))?] = value,
                _ => reward[(s * n_a + a) * n_s + find(&s_idx, field(2))?] = value,
            }
        }

        Ok(Self {
            discount: discount.ok_or_else(|| GateError::ModelParse("missing discount".into()))?,
            states,
            actions,
            observations,
            start,
            transition,
            observation,
            reward,
        })
    }
}

fn parse_float(lineno: usize, value: &str) -> Result<f64> {
    value
        .parse()
        .map_err(|err| parse_error(lineno, &format!("bad number {value}: {err}")))
}

fn parse_error(lineno: usize, message: &str) -> GateError {
    GateError::ModelParse(format!("line {}: {message}", lineno + 1))
}
