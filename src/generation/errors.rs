//! Generation failure taxonomy.
//!
//! Every failed attempt is classified into a [`FailureKind`]; the kind drives
//! both the repair context for the next attempt and the terminal report.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::orchestrator::GenerationOutcome;
use crate::error::LlmError;
use crate::utils::text::truncate_chars;

/// Raw model output kept on a contract error for audit.
pub const RAW_SNIPPET_CHARS: usize = 2400;

/// Why a generation attempt (or a whole slot) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Model output failed the structural contract.
    Contract,
    /// Reference artifact did not compile.
    Compile,
    /// Reference artifact compiled but failed tests.
    Tests,
    /// Judge wall clock elapsed.
    Timeout,
    /// The model call failed or returned unparseable output.
    Llm,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Contract => "contract",
            FailureKind::Compile => "compile",
            FailureKind::Tests => "tests",
            FailureKind::Timeout => "timeout",
            FailureKind::Llm => "llm",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Model output that parsed but broke the problem contract.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct GenerationContractError {
    pub message: String,
    pub slot_index: usize,
    pub llm_output_hash: String,
    /// First [`RAW_SNIPPET_CHARS`] characters of the raw output.
    pub raw_snippet: String,
}

impl GenerationContractError {
    pub fn new(
        message: impl Into<String>,
        slot_index: usize,
        llm_output_hash: impl Into<String>,
        raw: &str,
    ) -> Self {
        Self {
            message: message.into(),
            slot_index,
            llm_output_hash: llm_output_hash.into(),
            raw_snippet: truncate_chars(raw, RAW_SNIPPET_CHARS).to_string(),
        }
    }
}

/// The reference artifact failed in the sandbox.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ReferenceSolutionError {
    pub message: String,
    /// One of `Compile`, `Tests` or `Timeout`.
    pub kind: FailureKind,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Any failure of a single attempt.
#[derive(Debug, Error)]
pub enum SlotError {
    #[error(transparent)]
    Contract(GenerationContractError),

    /// The raw output could not be parsed as a JSON object at all.
    #[error(transparent)]
    Unparseable(GenerationContractError),

    #[error(transparent)]
    Reference(#[from] ReferenceSolutionError),

    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("{0}")]
    Other(String),
}

impl SlotError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SlotError::Contract(_) => FailureKind::Contract,
            SlotError::Unparseable(_) | SlotError::Llm(_) => FailureKind::Llm,
            SlotError::Reference(e) => e.kind,
            SlotError::Other(message) => {
                if regex!(r"Invalid test_suite|schema validation|public class|Test suite class name")
                    .is_match(message)
                {
                    FailureKind::Contract
                } else {
                    FailureKind::Unknown
                }
            }
        }
    }

    /// Hash of the raw output this attempt produced, when one was parsed.
    pub fn llm_output_hash(&self) -> Option<&str> {
        match self {
            SlotError::Contract(e) | SlotError::Unparseable(e) => Some(&e.llm_output_hash),
            _ => None,
        }
    }
}

/// A slot exhausted its retry budget. Terminal for the whole run.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct GenerationSlotFailureError {
    pub message: String,
    pub slot_index: usize,
    pub kind: FailureKind,
    pub attempts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_output_hash: Option<String>,
    pub outcomes_so_far: Vec<GenerationOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_truncates_raw() {
        let raw = "é".repeat(3000);
        let err = GenerationContractError::new("bad", 2, "abc", &raw);
        assert_eq!(err.raw_snippet.chars().count(), RAW_SNIPPET_CHARS);
        assert_eq!(err.to_string(), "bad");
    }

    #[test]
    fn test_kind_classification() {
        let contract = SlotError::Contract(GenerationContractError::new("x", 0, "h", ""));
        assert_eq!(contract.kind(), FailureKind::Contract);
        assert_eq!(contract.llm_output_hash(), Some("h"));

        let unparseable = SlotError::Unparseable(GenerationContractError::new("x", 0, "h", ""));
        assert_eq!(unparseable.kind(), FailureKind::Llm);

        let reference = SlotError::from(ReferenceSolutionError {
            message: "t".to_string(),
            kind: FailureKind::Timeout,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
        });
        assert_eq!(reference.kind(), FailureKind::Timeout);

        let other = SlotError::Other("Generated problem for slot 1 failed schema validation: x".into());
        assert_eq!(other.kind(), FailureKind::Contract);
        assert_eq!(SlotError::Other("disk full".into()).kind(), FailureKind::Unknown);
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&FailureKind::Compile).unwrap(),
            "\"compile\""
        );
    }
}
