//! Alpha-vector policies read from solver output.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::config::SolverKind;
use crate::error::{GateError, Result};

/// On-disk policy formats produced by the supported solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyFormat {
    /// XML `<Policy><AlphaVector><Vector action="a">...</Vector>...`.
    Policyx,
    /// Dense lines of `n_states` floats then the action, horizons split by `@`.
    AiToolbox,
    /// Sparse planes with `action => a` and `entries => [index, value, ...]`.
    Zmdp,
}

impl PolicyFormat {
    #[must_use]
    pub const fn for_solver(kind: SolverKind) -> Self {
        match kind {
            SolverKind::Appl => Self::Policyx,
            SolverKind::AiToolbox => Self::AiToolbox,
            SolverKind::Zmdp => Self::Zmdp,
        }
    }
}

/// One alpha vector. `None` marks a state the solver never reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlphaVector {
    pub action: usize,
    pub values: Vec<Option<f64>>,
}

impl AlphaVector {
    fn dense(action: usize, values: Vec<f64>) -> Self {
        Self {
            action,
            values: values.into_iter().map(Some).collect(),
        }
    }

    /// A vector applies unless the belief puts mass on an unreached state.
    #[must_use]
    pub fn applies_to(&self, belief: &[f64]) -> bool {
        !belief
            .iter()
            .zip(&self.values)
            .any(|(b, v)| *b > 0.0 && v.is_none())
    }

    #[must_use]
    pub fn dot(&self, belief: &[f64]) -> f64 {
        belief
            .iter()
            .zip(&self.values)
            .map(|(b, v)| b * v.unwrap_or(0.0))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlphaPolicy {
    pub format: PolicyFormat,
    pub vectors: Vec<AlphaVector>,
}

impl AlphaPolicy {
    pub fn load(path: &Path, format: PolicyFormat, n_states: usize) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, format, n_states)
    }

    pub fn parse(text: &str, format: PolicyFormat, n_states: usize) -> Result<Self> {
        let vectors = match format {
            PolicyFormat::Policyx => parse_policyx(text)?,
            PolicyFormat::AiToolbox => parse_aitoolbox(text, n_states)?,
            PolicyFormat::Zmdp => parse_zmdp(text, n_states)?,
        };
        if vectors.is_empty() {
            return Err(GateError::PolicyParse(
                "policy contained no alpha vectors".to_string(),
            ));
        }
        Ok(Self { format, vectors })
    }

    /// Best value per action at `belief`, over the vectors that apply to it.
    ///
    /// Actions with no applicable vector are absent from the table.
    pub fn action_values(&self, belief: &[f64]) -> Result<BTreeMap<usize, f64>> {
        let mut table: BTreeMap<usize, f64> = BTreeMap::new();
        for vector in &self.vectors {
            if vector.values.len() != belief.len() {
                return Err(GateError::PolicyParse(format!(
                    "alpha vector has {} entries but belief has {}",
                    vector.values.len(),
                    belief.len()
                )));
            }
            if !vector.applies_to(belief) {
                continue;
            }
            let value = vector.dot(belief);
            table
                .entry(vector.action)
                .and_modify(|best| *best = best.max(value))
                .or_insert(value);
        }
        Ok(table)
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| GateError::PolicyParse(format!("invalid {what}: {raw:?}")))
}

fn parse_policyx(text: &str) -> Result<Vec<AlphaVector>> {
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| GateError::PolicyParse(format!("policy XML: {e}")))?;
    let Some(container) = doc.root_element().children().find(roxmltree::Node::is_element) else {
        return Ok(Vec::new());
    };
    container
        .children()
        .filter(roxmltree::Node::is_element)
        .map(|node| {
            let action = node
                .attribute("action")
                .ok_or_else(|| GateError::PolicyParse("alpha vector without action".to_string()))?;
            let values = node
                .text()
                .unwrap_or_default()
                .split_whitespace()
                .map(|v| parse_number(v, "coefficient"))
                .collect::<Result<Vec<f64>>>()?;
            Ok(AlphaVector::dense(parse_number(action, "action")?, values))
        })
        .collect()
}

fn parse_aitoolbox(text: &str, n_states: usize) -> Result<Vec<AlphaVector>> {
    let mut horizons: Vec<Vec<&str>> = vec![Vec::new()];
    for line in text.lines() {
        if line.starts_with('@') {
            horizons.push(Vec::new());
        } else if !line.trim().is_empty() {
            if let Some(current) = horizons.last_mut() {
                current.push(line);
            }
        }
    }
    let Some(last) = horizons.into_iter().rev().find(|h| !h.is_empty()) else {
        return Ok(Vec::new());
    };

    last.into_iter()
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() <= n_states {
                return Err(GateError::PolicyParse(format!(
                    "expected {} values and an action, found {} fields",
                    n_states,
                    fields.len()
                )));
            }
            let values = fields[..n_states]
                .iter()
                .map(|v| parse_number(v, "coefficient"))
                .collect::<Result<Vec<f64>>>()?;
            Ok(AlphaVector::dense(parse_number(fields[n_states], "action")?, values))
        })
        .collect()
}

fn parse_zmdp(text: &str, n_states: usize) -> Result<Vec<AlphaVector>> {
    let mut vectors = Vec::new();
    let mut action: Option<usize> = None;
    let mut entries: Option<Vec<&str>> = None;

    for raw in text.lines() {
        let line = raw.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        if let Some(tokens) = entries.as_mut() {
            let (body, closed) = match line.find(']') {
                Some(end) => (&line[..end], true),
                None => (line, false),
            };
            tokens.extend(body.split(',').map(str::trim).filter(|t| !t.is_empty()));
            if closed {
                let action = action.take().ok_or_else(|| {
                    GateError::PolicyParse("plane entries without an action".to_string())
                })?;
                let tokens = entries.take().unwrap_or_default();
                vectors.push(sparse_plane(action, &tokens, n_states)?);
            }
            continue;
        }
        if let Some(rest) = field_value(line, "action") {
            action = Some(parse_number(rest, "action")?);
        } else if let Some(rest) = field_value(line, "entries") {
            let rest = rest.trim_start_matches('[');
            let mut tokens: Vec<&str> = Vec::new();
            match rest.find(']') {
                Some(end) => {
                    tokens.extend(rest[..end].split(',').map(str::trim).filter(|t| !t.is_empty()));
                    let action = action.take().ok_or_else(|| {
                        GateError::PolicyParse("plane entries without an action".to_string())
                    })?;
                    vectors.push(sparse_plane(action, &tokens, n_states)?);
                }
                None => {
                    tokens.extend(rest.split(',').map(str::trim).filter(|t| !t.is_empty()));
                    entries = Some(tokens);
                }
            }
        }
    }
    if entries.is_some() {
        return Err(GateError::PolicyParse(
            "unterminated entries list".to_string(),
        ));
    }
    Ok(vectors)
}

/// Value after `name =>`, without the trailing comma.
fn field_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.trim_start().strip_prefix("=>")?;
    Some(rest.trim().trim_end_matches(','))
}

fn sparse_plane(action: usize, tokens: &[&str], n_states: usize) -> Result<AlphaVector> {
    if tokens.len() % 2 != 0 {
        return Err(GateError::PolicyParse(format!(
            "odd number of plane entries for action {action}"
        )));
    }
    let mut values = vec![None; n_states];
    for pair in tokens.chunks(2) {
        let index: usize = parse_number(pair[0], "state index")?;
        let value: f64 = parse_number(pair[1], "coefficient")?;
        let slot = values.get_mut(index).ok_or(GateError::OutOfRange {
            space: "state",
            index,
            len: n_states,
        })?;
        *slot = Some(value);
    }
    Ok(AlphaVector { action, values })
}
