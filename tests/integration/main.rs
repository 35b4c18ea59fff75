//! Integration test suite entry point.

mod advisor_flow;
#[path = "../common/mod.rs"]
mod common;
mod estimation;
mod export_roundtrip;
mod gating_scenarios;
mod solver_adapters;
mod tying_selection;
