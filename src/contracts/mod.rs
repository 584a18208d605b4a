//! Data contracts shared across the pipeline.
//!
//! - [`ActivitySpec`]: validated input describing an activity
//! - [`ProblemSlot`]: one planned exercise
//! - [`GeneratedProblemDraft`]: model output plus the hidden reference
//! - [`GeneratedProblem`]: the persisted, secret-free shape

pub mod activity_spec;
pub mod problem;

pub use activity_spec::{
    ActivitySpec, Difficulty, DifficultyBucket, Language, ProblemStyle, MAX_PROBLEM_COUNT,
    TEST_CASE_COUNT,
};
pub use problem::{
    FileRole, GeneratedProblem, GeneratedProblemDraft, Pedagogy, ProblemSlot, ReferenceArtifact,
    ScaffoldedRegion, Workspace, WorkspaceFile,
};
