//! exercise-forge: verified programming exercise generation.
//!
//! An [`contracts::ActivitySpec`] is expanded into an ordered plan of problem
//! slots. Each slot is generated by a chat model, its hidden reference
//! solution is judged against its own test suite in a sandbox, and only
//! secret-free problems leave the pipeline.

#[macro_use]
mod macros;

pub mod cli;
pub mod contracts;
pub mod error;
pub mod generation;
pub mod judge;
pub mod languages;
pub mod llm;
pub mod planner;
pub mod utils;

// Re-export commonly used error types
pub use error::{JudgeError, LlmError, PlanError, SpecError};
