//! External POMDP solvers.
//!
//! Each adapter writes the model in its solver's input format, runs the
//! solver as a child process and reads back the alpha-vector policy.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{SolverConfig, SolverKind};
use crate::error::{GateError, Result};
use crate::model::PomdpModel;
use crate::model::export::{write_pomdp_file, write_txt_file};

use super::alpha::{AlphaPolicy, PolicyFormat};

/// Extra time a solver gets past its own time limit before it is killed.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Computes a policy for a model.
pub trait Solver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, model: &PomdpModel) -> Result<AlphaPolicy>;
}

/// Settings shared by the process-backed solvers.
#[derive(Debug, Clone)]
pub struct SolverProcess {
    binary: PathBuf,
    timeout: Option<Duration>,
    kill_grace: Duration,
    discount: f64,
    workdir: Option<PathBuf>,
}

impl SolverProcess {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, discount: f64) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
            kill_grace: KILL_GRACE,
            discount,
            workdir: None,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    #[must_use]
    pub fn with_workdir(mut self, workdir: Option<PathBuf>) -> Self {
        self.workdir = workdir;
        self
    }

    fn resolve_binary(&self, solver: &'static str) -> Result<PathBuf> {
        which::which(&self.binary).map_err(|e| {
            GateError::SolverUnavailable(format!(
                "{solver} binary {} not found: {e}",
                self.binary.display()
            ))
        })
    }

    /// Run `f` with a directory for model and policy files.
    fn in_workdir<T>(&self, f: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
        match &self.workdir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                f(dir)
            }
            None => {
                let dir = tempfile::tempdir()?;
                f(dir.path())
            }
        }
    }

    /// Spawn the solver and wait for it, killing it past the deadline.
    fn run(&self, solver: &'static str, args: &[String], dir: &Path) -> Result<()> {
        let binary = self.resolve_binary(solver)?;
        debug!(solver, binary = %binary.display(), ?args, "running solver");

        let stderr_path = dir.join(format!("{solver}.stderr"));
        let stderr = File::create(&stderr_path)?;
        let mut child = Command::new(&binary)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|e| GateError::SolverUnavailable(format!("{solver}: {e}")))?;

        let started = Instant::now();
        let deadline = self.timeout.map(|t| t + self.kill_grace);
        let status: ExitStatus = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if let Some(deadline) = deadline {
                if started.elapsed() >= deadline {
                    child.kill().ok();
                    child.wait().ok();
                    return Err(GateError::SolverTimeout {
                        solver,
                        timeout: self.timeout.unwrap_or(deadline),
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let stderr = std::fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(GateError::SolverFailed {
                solver,
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        info!(
            solver,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "solver finished"
        );
        Ok(())
    }
}

/// SARSOP via `pomdpsol-appl`; reads `policyx` XML.
#[derive(Debug, Clone)]
pub struct ApplSolver {
    process: SolverProcess,
}

impl ApplSolver {
    pub const DEFAULT_BINARY: &'static str = "pomdpsol-appl";

    #[must_use]
    pub const fn new(process: SolverProcess) -> Self {
        Self { process }
    }
}

impl Solver for ApplSolver {
    fn name(&self) -> &'static str {
        "appl"
    }

    fn solve(&self, model: &PomdpModel) -> Result<AlphaPolicy> {
        self.process.in_workdir(|dir| {
            let model_path = dir.join("model.pomdp");
            let policy_path = dir.join("model.policy");
            write_pomdp_file(model, self.process.discount, &model_path)?;

            let mut args = vec![
                model_path.display().to_string(),
                "-o".to_string(),
                policy_path.display().to_string(),
            ];
            if let Some(timeout) = self.process.timeout {
                args.push("--timeout".to_string());
                args.push(timeout.as_secs().to_string());
            }
            self.process.run(self.name(), &args, dir)?;
            AlphaPolicy::load(&policy_path, PolicyFormat::Policyx, model.n_states())
        })
    }
}

/// Finite-horizon solver via `pomdpsol-aitoolbox`; reads dense alpha lines.
#[derive(Debug, Clone)]
pub struct AiToolboxSolver {
    process: SolverProcess,
    horizon: u32,
}

impl AiToolboxSolver {
    pub const DEFAULT_BINARY: &'static str = "pomdpsol-aitoolbox";

    #[must_use]
    pub const fn new(process: SolverProcess, horizon: u32) -> Self {
        Self { process, horizon }
    }
}

impl Solver for AiToolboxSolver {
    fn name(&self) -> &'static str {
        "aitoolbox"
    }

    fn solve(&self, model: &PomdpModel) -> Result<AlphaPolicy> {
        self.process.in_workdir(|dir| {
            let model_path = dir.join("model.txt");
            let policy_path = dir.join("model.policy");
            write_txt_file(model, &model_path)?;

            let args = vec![
                "--input".to_string(),
                model_path.display().to_string(),
                "--output".to_string(),
                policy_path.display().to_string(),
                "--discount".to_string(),
                self.process.discount.to_string(),
                "--horizon".to_string(),
                self.horizon.to_string(),
                "--n_states".to_string(),
                model.n_states().to_string(),
                "--n_actions".to_string(),
                model.n_actions().to_string(),
                "--n_observations".to_string(),
                model.n_observations().to_string(),
            ];
            self.process.run(self.name(), &args, dir)?;
            AlphaPolicy::load(&policy_path, PolicyFormat::AiToolbox, model.n_states())
        })
    }
}

/// ZMDP (`<binary> solve`); reads sparse max-planes policies.
#[derive(Debug, Clone)]
pub struct ZmdpSolver {
    process: SolverProcess,
}

impl ZmdpSolver {
    pub const DEFAULT_BINARY: &'static str = "pomdpsol-zmdp";

    #[must_use]
    pub const fn new(process: SolverProcess) -> Self {
        Self { process }
    }
}

impl Solver for ZmdpSolver {
    fn name(&self) -> &'static str {
        "zmdp"
    }

    fn solve(&self, model: &PomdpModel) -> Result<AlphaPolicy> {
        self.process.in_workdir(|dir| {
            let model_path = dir.join("model.pomdp");
            let policy_path = dir.join("model.policy");
            write_pomdp_file(model, self.process.discount, &model_path)?;

            let mut args = vec![
                "solve".to_string(),
                model_path.display().to_string(),
                "-o".to_string(),
                policy_path.display().to_string(),
            ];
            if let Some(timeout) = self.process.timeout {
                args.push("-t".to_string());
                args.push(timeout.as_secs().to_string());
            }
            self.process.run(self.name(), &args, dir)?;
            AlphaPolicy::load(&policy_path, PolicyFormat::Zmdp, model.n_states())
        })
    }
}

/// Build the configured solver adapter.
pub fn from_config(config: &SolverConfig) -> Result<Box<dyn Solver>> {
    config.validate()?;
    let binary = |default: &str| {
        config
            .binary
            .clone()
            .unwrap_or_else(|| PathBuf::from(default))
    };
    let process = |default: &str| {
        SolverProcess::new(binary(default), config.discount)
            .with_timeout(config.timeout())
            .with_workdir(config.workdir.clone())
    };
    let solver: Box<dyn Solver> = match config.kind {
        SolverKind::Appl => Box::new(ApplSolver::new(process(ApplSolver::DEFAULT_BINARY))),
        SolverKind::AiToolbox => {
            let horizon = config.horizon.ok_or_else(|| {
                GateError::Config("ai_toolbox solver requires a horizon".to_string())
            })?;
            Box::new(AiToolboxSolver::new(
                process(AiToolboxSolver::DEFAULT_BINARY),
                horizon,
            ))
        }
        SolverKind::Zmdp => Box::new(ZmdpSolver::new(process(ZmdpSolver::DEFAULT_BINARY))),
    };
    Ok(solver)
}
