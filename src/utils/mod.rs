//! Shared utility functions for exercise-forge.
//!
//! JSON ingestion for model output plus small text helpers used by prompts
//! and error snippets.

pub mod json_extraction;
pub mod text;

pub use json_extraction::{
    close_unbalanced, find_matching_brace, parse_model_json, relax_json, strip_code_fences,
    CandidateKind, JsonExtractionError, ParseStage, ParsedJson,
};
pub use text::{sha256_hex, snip, truncate_chars};
