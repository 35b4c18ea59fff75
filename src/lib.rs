//! crowdgate - adaptive gating and POMDP worker-quality control for crowd work.
//!
//! The [`gating`] scheduler decides tutorial, screening and gold-test
//! placement from a worker's graded history. The [`model`], [`inference`] and
//! [`policy`] modules implement the worker POMDP: model construction and
//! export, belief tracking, Baum-Welch estimation and action selection from
//! externally solved policies.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod gating;
pub mod inference;
pub mod model;
pub mod policy;
pub mod test_utils;

pub use error::{GateError, Result};
