//! Belief tracking and parameter estimation from worker histories.

pub mod belief;
pub mod estimate;
pub mod history;
pub mod tying;

pub use belief::{BeliefTracker, update_belief};
pub use estimate::{Estimate, Estimator, Statistics, thompson_sample};
pub use history::{History, Record};
pub use tying::{TyingCandidate, select_tying};
