//! Error types for exercise-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Activity spec validation and slot planning
//! - LLM API interactions
//! - Sandboxed judge setup
//!
//! Generation-time failures (contract, reference and slot exhaustion errors)
//! carry audit data and live in [`crate::generation::errors`].

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised when an [`ActivitySpec`](crate::contracts::ActivitySpec) is
/// rejected by its own schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("problem_count must be between 1 and 7 (got {0})")]
    ProblemCount(usize),

    #[error("difficulty_plan must contain 1 to 3 entries (got {0})")]
    PlanLength(usize),

    #[error("difficulty_plan lists '{0}' more than once")]
    DuplicateDifficulty(String),

    #[error("difficulty_plan must have at least two non-zero difficulties")]
    TooFewBuckets,

    #[error("difficulty_plan counts sum to {sum}, expected problem_count {expected}")]
    PlanSum { sum: usize, expected: usize },

    #[error("topic_tags must contain 1 to 12 entries (got {0})")]
    TopicCount(usize),

    #[error("invalid topic tag '{0}': must be 1 to 40 characters")]
    TopicTag(String),

    #[error("test_case_count must be 8 (got {0})")]
    TestCaseCount(usize),

    #[error("constraints must not be empty")]
    EmptyConstraints,

    #[error("constraints must mention 'no package' and JUnit requirements (e.g. 'JUnit 5')")]
    JavaConstraints,

    #[error("invalid pedagogy: {0}")]
    Pedagogy(String),
}

/// Errors that can occur while deriving a problem plan.
///
/// These are programming errors (the spec was invalid upstream) and are never
/// retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("plan has {actual} slots, expected {expected}")]
    SlotCount { expected: usize, actual: usize },

    #[error("slot at position {position} has index {index}")]
    NonSequentialIndex { position: usize, index: usize },

    #[error("slot {index} disagrees with the plan on {field}")]
    InconsistentSlot { index: usize, field: &'static str },

    #[error("activity spec has no topic tags")]
    NoTopics,
}

/// Errors that can occur while preparing a sandboxed judge or run.
///
/// Adapters convert these into a failed [`JudgeResult`](crate::judge::JudgeResult)
/// rather than propagating them.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("User files include \"{0}\", which conflicts with the test suite filename.")]
    ReservedFilename(String),

    #[error("Invalid filename \"{0}\".")]
    InvalidFilename(String),

    #[error("{0}")]
    MissingEntryFile(String),

    #[error("Failed to execute docker: {0}")]
    Exec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_filename_message() {
        let err = JudgeError::ReservedFilename("test_solution.py".to_string());
        assert_eq!(
            err.to_string(),
            "User files include \"test_solution.py\", which conflicts with the test suite filename."
        );
    }

    #[test]
    fn test_plan_error_display() {
        let err = PlanError::SlotCount {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "plan has 2 slots, expected 3");
    }

    #[test]
    fn test_llm_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: LlmError = io.into();
        assert!(matches!(err, LlmError::Io(_)));
    }
}
