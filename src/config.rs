use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gating: GatingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
}

impl Config {
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let explicit = explicit_path
            .map(PathBuf::from)
            .or_else(|| std::env::var("CROWDGATE_CONFIG").ok().map(PathBuf::from));

        if let Some(path) = explicit {
            if let Some(patch) = Self::load_patch(&path)? {
                config.merge_patch(patch);
            } else {
                return Err(GateError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        } else {
            if let Some(global) = Self::load_global()? {
                config.merge_patch(global);
            }
            if let Some(project) = Self::load_patch(Path::new("crowdgate.toml"))? {
                config.merge_patch(project);
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let patch: ConfigPatch = toml::from_str(raw)?;
        let mut config = Self::default();
        config.merge_patch(patch);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.gating.validate()?;
        self.solver.validate()?;
        self.estimator.validate()
    }

    fn load_global() -> Result<Option<ConfigPatch>> {
        let Some(dir) = dirs::config_dir() else {
            return Ok(None);
        };
        Self::load_patch(&dir.join("crowdgate/config.toml"))
    }

    fn load_patch(path: &Path) -> Result<Option<ConfigPatch>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|err| GateError::Config(format!("read config {}: {err}", path.display())))?;
        let patch = toml::from_str(&raw)
            .map_err(|err| GateError::Config(format!("parse config {}: {err}", path.display())))?;
        Ok(Some(patch))
    }

    fn merge_patch(&mut self, patch: ConfigPatch) {
        if let Some(patch) = patch.gating {
            self.gating.merge(patch);
        }
        if let Some(patch) = patch.model {
            self.model.merge(patch);
        }
        if let Some(patch) = patch.solver {
            self.solver.merge(patch);
        }
        if let Some(patch) = patch.estimator {
            self.estimator.merge(patch);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_u64("CROWDGATE_SEED")? {
            self.gating.seed = Some(value);
        }
        if let Some(value) = env_f64("CROWDGATE_DESIRED_ACCURACY")? {
            self.gating.desired_accuracy = value;
            self.model.utility.desired_accuracy = value;
        }
        if let Some(value) = env_string("CROWDGATE_SOLVER") {
            self.solver.kind = parse_solver_kind(&value)?;
        }
        if let Some(value) = env_u64("CROWDGATE_SOLVER_TIMEOUT")? {
            self.solver.timeout_secs = Some(value);
        }
        if self.solver.kind == SolverKind::Zmdp && self.solver.binary.is_none() {
            if let Some(alias) = env_string("ZMDP_ALIAS") {
                self.solver.binary = Some(PathBuf::from(alias));
            }
        }
        Ok(())
    }
}

/// Adaptive gating scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatingConfig {
    pub n_tutorial: usize,
    pub n_screening: usize,
    pub desired_accuracy: f64,
    pub n_gold_sliding: usize,
    pub batch_size: usize,
    pub gold_per_batch: usize,
    pub exponential_backoff: bool,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for GatingConfig {
    fn default() -> Self {
        Self {
            n_tutorial: 0,
            n_screening: 0,
            desired_accuracy: 0.8,
            n_gold_sliding: 10,
            batch_size: 20,
            gold_per_batch: 5,
            exponential_backoff: true,
            seed: None,
        }
    }
}

impl GatingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(GateError::Config("batch_size must be positive".to_string()));
        }
        if self.gold_per_batch > self.batch_size {
            return Err(GateError::Config(format!(
                "gold_per_batch {} exceeds batch_size {}",
                self.gold_per_batch, self.batch_size
            )));
        }
        if !(0.0..=1.0).contains(&self.desired_accuracy) {
            return Err(GateError::Config(format!(
                "desired_accuracy {} outside [0, 1]",
                self.desired_accuracy
            )));
        }
        Ok(())
    }

    fn merge(&mut self, patch: GatingPatch) {
        if let Some(value) = patch.n_tutorial {
            self.n_tutorial = value;
        }
        if let Some(value) = patch.n_screening {
            self.n_screening = value;
        }
        if let Some(value) = patch.desired_accuracy {
            self.desired_accuracy = value;
        }
        if let Some(value) = patch.n_gold_sliding {
            self.n_gold_sliding = value;
        }
        if let Some(value) = patch.batch_size {
            self.batch_size = value;
        }
        if let Some(value) = patch.gold_per_batch {
            self.gold_per_batch = value;
        }
        if let Some(value) = patch.exponential_backoff {
            self.exponential_backoff = value;
        }
        if let Some(value) = patch.seed {
            self.seed = Some(value);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilityKind {
    /// Symmetric penalty derived from the desired accuracy.
    Acc,
    /// Separate false-positive / false-negative penalties.
    Pen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityConfig {
    #[serde(rename = "type")]
    pub kind: UtilityKind,
    pub desired_accuracy: f64,
    #[serde(default)]
    pub penalty_fp: Option<f64>,
    #[serde(default)]
    pub penalty_fn: Option<f64>,
    pub reward_tp: f64,
    pub reward_tn: f64,
}

impl Default for UtilityConfig {
    fn default() -> Self {
        Self {
            kind: UtilityKind::Pen,
            desired_accuracy: 0.8,
            penalty_fp: None,
            penalty_fn: None,
            reward_tp: 1.0,
            reward_tn: 1.0,
        }
    }
}

/// Raw POMDP parameters, in flat list form.
///
/// Bernoulli parameters give only the positive probability. Per-rule lists
/// (`p_s`, `p_lose`, `p_learn_*`) hold one value per rule, or one per rule
/// for every worker class (class-major). Per-question-type lists (`p_slip`,
/// `p_guess`) work the same way over question types. `p_leave` holds one
/// value or one per class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub p_worker: Vec<f64>,
    pub p_s: Vec<f64>,
    pub p_slip: Vec<f64>,
    pub p_guess: Vec<f64>,
    pub p_lose: Vec<f64>,
    pub p_leave: Vec<f64>,
    #[serde(default)]
    pub p_learn_exp: Vec<f64>,
    #[serde(default)]
    pub p_learn_tell: Vec<f64>,
    pub p_r: Vec<f64>,
    pub p_1: Vec<f64>,
    #[serde(default, alias = "exp")]
    pub explain: bool,
    #[serde(default)]
    pub tell: bool,
    pub cost: f64,
    pub cost_exp: f64,
    pub cost_tell: f64,
    #[serde(default)]
    pub utility: UtilityConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            p_worker: vec![0.8, 0.2],
            p_s: vec![1.0],
            p_slip: vec![0.1, 0.4],
            p_guess: vec![0.5],
            p_lose: vec![0.05, 0.1],
            p_leave: vec![0.1],
            p_learn_exp: Vec::new(),
            p_learn_tell: Vec::new(),
            p_r: vec![1.0],
            p_1: vec![0.5],
            explain: false,
            tell: false,
            cost: -0.000_001,
            cost_exp: -0.000_001,
            cost_tell: -0.000_001,
            utility: UtilityConfig::default(),
        }
    }
}

impl ModelConfig {
    /// Default model whose penalties make `desired_accuracy` break even.
    #[must_use]
    pub fn for_accuracy(desired_accuracy: f64) -> Self {
        Self {
            utility: UtilityConfig {
                desired_accuracy,
                ..UtilityConfig::default()
            },
            ..Self::default()
        }
    }

    fn merge(&mut self, patch: ModelPatch) {
        let lists = [
            (patch.p_worker, &mut self.p_worker),
            (patch.p_s, &mut self.p_s),
            (patch.p_slip, &mut self.p_slip),
            (patch.p_guess, &mut self.p_guess),
            (patch.p_lose, &mut self.p_lose),
            (patch.p_leave, &mut self.p_leave),
            (patch.p_learn_exp, &mut self.p_learn_exp),
            (patch.p_learn_tell, &mut self.p_learn_tell),
            (patch.p_r, &mut self.p_r),
            (patch.p_1, &mut self.p_1),
        ];
        for (value, slot) in lists {
            if let Some(value) = value {
                *slot = value;
            }
        }
        if let Some(value) = patch.explain {
            self.explain = value;
        }
        if let Some(value) = patch.tell {
            self.tell = value;
        }
        if let Some(value) = patch.cost {
            self.cost = value;
        }
        if let Some(value) = patch.cost_exp {
            self.cost_exp = value;
        }
        if let Some(value) = patch.cost_tell {
            self.cost_tell = value;
        }
        if let Some(patch) = patch.utility {
            if let Some(value) = patch.kind {
                self.utility.kind = value;
            }
            if let Some(value) = patch.desired_accuracy {
                self.utility.desired_accuracy = value;
            }
            if let Some(value) = patch.penalty_fp {
                self.utility.penalty_fp = Some(value);
            }
            if let Some(value) = patch.penalty_fn {
                self.utility.penalty_fn = Some(value);
            }
            if let Some(value) = patch.reward_tp {
                self.utility.reward_tp = value;
            }
            if let Some(value) = patch.reward_tn {
                self.utility.reward_tn = value;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    Zmdp,
    Appl,
    #[serde(alias = "aitoolbox")]
    AiToolbox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub kind: SolverKind,
    /// Overrides the solver executable looked up on `PATH`.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub discount: f64,
    /// Planning horizon (AI-Toolbox only).
    #[serde(default)]
    pub horizon: Option<u32>,
    /// Directory for model and policy files; a temporary directory otherwise.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::Zmdp,
            binary: None,
            timeout_secs: Some(600),
            discount: 0.99,
            horizon: None,
            workdir: None,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.discount >= 1.0 {
            return Err(GateError::InvalidDiscount(self.discount));
        }
        if self.kind == SolverKind::AiToolbox && self.horizon.is_none() {
            return Err(GateError::Config(
                "ai_toolbox solver requires a horizon".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn merge(&mut self, patch: SolverPatch) {
        if let Some(value) = patch.kind {
            self.kind = value;
        }
        if let Some(value) = patch.binary {
            self.binary = Some(value);
        }
        if let Some(value) = patch.timeout_secs {
            self.timeout_secs = Some(value);
        }
        if let Some(value) = patch.discount {
            self.discount = value;
        }
        if let Some(value) = patch.horizon {
            self.horizon = Some(value);
        }
        if let Some(value) = patch.workdir {
            self.workdir = Some(value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Random restarts drawn from the prior.
    pub restarts: usize,
    /// Also restart once from the current parameter values.
    pub last_params: bool,
    /// Relative log-likelihood improvement below which EM stops.
    pub min_improvement: f64,
    pub max_iterations: usize,
    /// Named prior variant (see `model::prior`).
    pub prior: String,
    #[serde(default)]
    pub seed: Option<u64>,
    pub parallel: bool,
    /// Replace the estimate with a posterior sample.
    pub thompson: bool,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            restarts: 1,
            last_params: true,
            min_improvement: 0.001,
            max_iterations: 500,
            prior: "default".to_string(),
            seed: None,
            parallel: true,
            thompson: false,
        }
    }
}

impl EstimatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.restarts == 0 && !self.last_params {
            return Err(GateError::Config(
                "estimator needs at least one restart or last_params".to_string(),
            ));
        }
        if self.min_improvement <= 0.0 {
            return Err(GateError::Config(
                "estimator min_improvement must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn merge(&mut self, patch: EstimatorPatch) {
        if let Some(value) = patch.restarts {
            self.restarts = value;
        }
        if let Some(value) = patch.last_params {
            self.last_params = value;
        }
        if let Some(value) = patch.min_improvement {
            self.min_improvement = value;
        }
        if let Some(value) = patch.max_iterations {
            self.max_iterations = value;
        }
        if let Some(value) = patch.prior {
            self.prior = value;
        }
        if let Some(value) = patch.seed {
            self.seed = Some(value);
        }
        if let Some(value) = patch.parallel {
            self.parallel = value;
        }
        if let Some(value) = patch.thompson {
            self.thompson = value;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigPatch {
    pub gating: Option<GatingPatch>,
    pub model: Option<ModelPatch>,
    pub solver: Option<SolverPatch>,
    pub estimator: Option<EstimatorPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GatingPatch {
    pub n_tutorial: Option<usize>,
    pub n_screening: Option<usize>,
    pub desired_accuracy: Option<f64>,
    pub n_gold_sliding: Option<usize>,
    pub batch_size: Option<usize>,
    pub gold_per_batch: Option<usize>,
    pub exponential_backoff: Option<bool>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ModelPatch {
    pub p_worker: Option<Vec<f64>>,
    pub p_s: Option<Vec<f64>>,
    pub p_slip: Option<Vec<f64>>,
    pub p_guess: Option<Vec<f64>>,
    pub p_lose: Option<Vec<f64>>,
    pub p_leave: Option<Vec<f64>>,
    pub p_learn_exp: Option<Vec<f64>>,
    pub p_learn_tell: Option<Vec<f64>>,
    pub p_r: Option<Vec<f64>>,
    pub p_1: Option<Vec<f64>>,
    #[serde(alias = "exp")]
    pub explain: Option<bool>,
    pub tell: Option<bool>,
    pub cost: Option<f64>,
    pub cost_exp: Option<f64>,
    pub cost_tell: Option<f64>,
    pub utility: Option<UtilityPatch>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct UtilityPatch {
    #[serde(rename = "type")]
    pub kind: Option<UtilityKind>,
    pub desired_accuracy: Option<f64>,
    pub penalty_fp: Option<f64>,
    pub penalty_fn: Option<f64>,
    pub reward_tp: Option<f64>,
    pub reward_tn: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SolverPatch {
    pub kind: Option<SolverKind>,
    pub binary: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub discount: Option<f64>,
    pub horizon: Option<u32>,
    pub workdir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct EstimatorPatch {
    pub restarts: Option<usize>,
    pub last_params: Option<bool>,
    pub min_improvement: Option<f64>,
    pub max_iterations: Option<usize>,
    pub prior: Option<String>,
    pub seed: Option<u64>,
    pub parallel: Option<bool>,
    pub thompson: Option<bool>,
}

pub fn parse_solver_kind(value: &str) -> Result<SolverKind> {
    match value.to_lowercase().as_str() {
        "zmdp" => Ok(SolverKind::Zmdp),
        "appl" | "sarsop" => Ok(SolverKind::Appl),
        "aitoolbox" | "ai_toolbox" | "ai-toolbox" => Ok(SolverKind::AiToolbox),
        _ => Err(GateError::Config(format!(
            "invalid solver {value} (expected zmdp|appl|aitoolbox)"
        ))),
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<u64>().map(Some).map_err(|err| {
            GateError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}

fn env_f64(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(value) => value.parse::<f64>().map(Some).map_err(|err| {
            GateError::Config(format!("invalid {key} value {value}: {err}"))
        }),
        Err(_) => Ok(None),
    }
}
