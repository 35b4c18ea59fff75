use console::style;
use serde::Serialize;

use crate::error::{GateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Robot,
}

#[derive(Serialize)]
pub struct RobotResponse<T> {
    pub status: RobotStatus,
    pub version: String,
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Ok,
}

pub fn robot_ok<T: Serialize>(data: T) -> RobotResponse<T> {
    RobotResponse {
        status: RobotStatus::Ok,
        version: env!("CARGO_PKG_VERSION").to_string(),
        data,
        warnings: Vec::new(),
    }
}

pub fn emit_robot<T: Serialize>(response: &RobotResponse<T>) -> Result<()> {
    emit_json(response)
}

pub fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)
        .map_err(|err| GateError::Config(format!("serialize output: {err}")))?;
    println!("{payload}");
    Ok(())
}

/// Stable error code for robot-mode error objects.
#[must_use]
pub const fn error_code(err: &GateError) -> &'static str {
    match err {
        GateError::Config(_) | GateError::InvalidDiscount(_) | GateError::Toml(_) => "config",
        GateError::MissingParameter(_) | GateError::UnknownPriorVariant(_) => "parameter",
        GateError::RowSum { .. } => "row_sum",
        GateError::DegenerateBelief { .. } | GateError::DegenerateHistory { .. } => "degenerate",
        GateError::OutOfRange { .. } => "out_of_range",
        GateError::NoValidAction | GateError::PolicyDesync { .. } => "policy_desync",
        GateError::PolicyParse(_) | GateError::ModelParse(_) => "parse",
        GateError::SolverUnavailable(_) => "solver_unavailable",
        GateError::SolverFailed { .. } => "solver_failed",
        GateError::SolverTimeout { .. } => "solver_timeout",
        GateError::Estimation(_) | GateError::Sampling(_) => "estimation",
        GateError::Io(_) => "io",
        GateError::Json(_) => "json",
    }
}

/// Process exit status for a failed command: 2 for bad configuration or
/// input, 3 when an external solver fails, 1 otherwise.
#[must_use]
pub const fn exit_status(err: &GateError) -> u8 {
    match err {
        GateError::Config(_)
        | GateError::InvalidDiscount(_)
        | GateError::Toml(_)
        | GateError::MissingParameter(_)
        | GateError::UnknownPriorVariant(_)
        | GateError::OutOfRange { .. }
        | GateError::Json(_) => 2,
        GateError::SolverUnavailable(_)
        | GateError::SolverFailed { .. }
        | GateError::SolverTimeout { .. } => 3,
        _ => 1,
    }
}

#[derive(Serialize)]
pub struct RobotError {
    pub error: bool,
    pub code: &'static str,
    pub message: String,
}

impl From<&GateError> for RobotError {
    fn from(err: &GateError) -> Self {
        Self {
            error: true,
            code: error_code(err),
            message: err.to_string(),
        }
    }
}

/// Report a failed command on the channel the output mode reads: a JSON
/// object on stdout for robots, a styled line on stderr for humans.
pub fn emit_error(mode: OutputMode, err: &GateError) {
    match mode {
        OutputMode::Robot => match serde_json::to_string(&RobotError::from(err)) {
            Ok(payload) => println!("{payload}"),
            Err(_) => eprintln!("{err}"),
        },
        OutputMode::Human => eprintln!("{} {err}", style("error:").red().bold()),
    }
}

pub struct HumanLayout {
    lines: Vec<String>,
    key_width: usize,
}

impl Default for HumanLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanLayout {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lines: Vec::new(),
            key_width: 18,
        }
    }

    pub fn title(&mut self, text: &str) -> &mut Self {
        self.lines.push(style(text).bold().to_string());
        self.lines.push(String::new());
        self
    }

    pub fn section(&mut self, text: &str) -> &mut Self {
        self.lines.push(style(text).bold().to_string());
        self.lines.push("-".repeat(text.len().max(3)));
        self
    }

    pub fn kv(&mut self, key: &str, value: &str) -> &mut Self {
        self.lines
            .push(format!("{key:width$} {value}", width = self.key_width));
        self
    }

    pub fn push_line(&mut self, line: impl Into<String>) -> &mut Self {
        self.lines.push(line.into());
        self
    }

    #[must_use]
    pub fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn emit_human(layout: HumanLayout) {
    println!("{}", layout.build());
}
