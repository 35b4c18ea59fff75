//! Property test suite entry point.

#[path = "../common/mod.rs"]
mod common;
mod gating_props;
mod model_props;
