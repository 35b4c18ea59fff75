//! Error types for crowdgate.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Discount must be less than 1.0 (got {0})")]
    InvalidDiscount(f64),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("{kind} probabilities sum to {sum} for state {state}, action {action}")]
    RowSum {
        kind: &'static str,
        state: String,
        action: String,
        sum: f64,
    },

    #[error("Belief update has zero mass for action {action}, observation {observation}")]
    DegenerateBelief { action: String, observation: String },

    #[error("History of worker {worker} has zero likelihood under the model")]
    DegenerateHistory { worker: usize },

    #[error("Index {index} out of range for {space} space of size {len}")]
    OutOfRange {
        space: &'static str,
        index: usize,
        len: usize,
    },

    #[error("No valid actions in policy")]
    NoValidAction,

    #[error("Best policy action {best} (value {best_value}) is not valid; best valid is {best_valid} (value {best_valid_value})")]
    PolicyDesync {
        best: usize,
        best_value: f64,
        best_valid: usize,
        best_valid_value: f64,
    },

    #[error("Policy parse error: {0}")]
    PolicyParse(String),

    #[error("Model parse error: {0}")]
    ModelParse(String),

    #[error("Solver unavailable: {0}")]
    SolverUnavailable(String),

    #[error("Solver {solver} exited with code {code:?}: {stderr}")]
    SolverFailed {
        solver: &'static str,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Solver {solver} timed out after {timeout:?}")]
    SolverTimeout {
        solver: &'static str,
        timeout: Duration,
    },

    #[error("Unknown prior variant: {0}")]
    UnknownPriorVariant(String),

    #[error("Estimation error: {0}")]
    Estimation(String),

    #[error("Sampling error: {0}")]
    Sampling(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;
