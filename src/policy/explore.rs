//! Exploration probability schedules.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Where the caller is in the hiring run when an exploration decision is made.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExploreContext {
    /// Index of the current worker.
    pub worker: usize,
    /// Steps taken with the current worker.
    pub t: usize,
    /// Fraction of the exploration budget already spent, in `[0, 1]`.
    pub budget_fraction: f64,
}

pub type ScheduleFn = Arc<dyn Fn(ExploreContext) -> f64 + Send + Sync>;

/// Probability of taking an exploratory action instead of the policy's choice.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExplorationSchedule {
    #[default]
    Never,
    Constant { p: f64 },
    /// `initial · rate^worker`.
    DecayPerWorker { initial: f64, rate: f64 },
    /// `initial · (1 - budget_fraction)`.
    BudgetFraction { initial: f64 },
    #[serde(skip)]
    Custom(ScheduleFn),
}

impl fmt::Debug for ExplorationSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => write!(f, "Never"),
            Self::Constant { p } => write!(f, "Constant({p})"),
            Self::DecayPerWorker { initial, rate } => {
                write!(f, "DecayPerWorker({initial}, {rate})")
            }
            Self::BudgetFraction { initial } => write!(f, "BudgetFraction({initial})"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl ExplorationSchedule {
    /// Exploration probability at `ctx`, clamped to `[0, 1]`.
    #[must_use]
    pub fn probability(&self, ctx: ExploreContext) -> f64 {
        let p = match self {
            Self::Never => 0.0,
            Self::Constant { p } => *p,
            Self::DecayPerWorker { initial, rate } => {
                let exponent = i32::try_from(ctx.worker).unwrap_or(i32::MAX);
                initial * rate.powi(exponent)
            }
            Self::BudgetFraction { initial } => initial * (1.0 - ctx.budget_fraction),
            Self::Custom(f) => f(ctx),
        };
        if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
    }

    #[must_use]
    pub const fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }
}
