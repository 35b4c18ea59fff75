//! Solved policies and action selection.

pub mod advisor;
pub mod alpha;
pub mod explore;
pub mod select;
pub mod solver;

pub use advisor::PolicyAdvisor;
pub use alpha::{AlphaPolicy, AlphaVector, PolicyFormat};
pub use explore::{ExplorationSchedule, ExploreContext};
pub use select::{ActionSelector, select_action};
pub use solver::{AiToolboxSolver, ApplSolver, Solver, SolverProcess, ZmdpSolver};
