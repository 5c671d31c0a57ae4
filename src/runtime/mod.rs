// src/runtime/mod.rs
// Request-time orchestration.

pub mod decision;

pub use decision::{Action, Decision, Enforcer, Verdict};
