//! Command-line interface for exercise-forge.
//!
//! Provides commands for planning, generation, judging, running programs
//! and proposing spec fallbacks.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
