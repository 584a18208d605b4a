//! The activity specification: the sole input to the planner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SpecError;

/// Number of tests every generated suite must contain.
pub const TEST_CASE_COUNT: usize = 8;

/// Upper bound on problems per activity.
pub const MAX_PROBLEM_COUNT: usize = 7;

/// Supported exercise languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    Python,
    Cpp,
    Sql,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Java,
        Language::Python,
        Language::Cpp,
        Language::Sql,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::Python => "python",
            Language::Cpp => "cpp",
            Language::Sql => "sql",
        }
    }

    /// Constraints string pinned to each language runtime.
    pub fn default_constraints(&self) -> &'static str {
        match self {
            Language::Java => "Java 17, JUnit 5, no package declarations.",
            Language::Python => "Python 3.11, pytest, no external libraries.",
            Language::Cpp => "C++20, g++, standard library only, no main() in solution.",
            Language::Sql => "SQLite 3, read-only SELECT/WITH queries only.",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "java" => Ok(Language::Java),
            "python" | "py" => Ok(Language::Python),
            "cpp" | "c++" => Ok(Language::Cpp),
            "sql" => Ok(Language::Sql),
            other => Err(format!("unsupported language '{}'", other)),
        }
    }
}

/// Problem difficulty. The derived ordering (easy < medium < hard) is the
/// planner's slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a solution reports its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProblemStyle {
    Stdout,
    #[default]
    Return,
    Mixed,
}

impl ProblemStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProblemStyle::Stdout => "stdout",
            ProblemStyle::Return => "return",
            ProblemStyle::Mixed => "mixed",
        }
    }

    /// Map a free-form style string onto a known style.
    ///
    /// Exact names win; otherwise "stdout" or "mixed" substrings select those
    /// styles and everything else is `Return`.
    pub fn normalize(raw: &str) -> Self {
        let s = raw.trim().to_ascii_lowercase();
        match s.as_str() {
            "stdout" => ProblemStyle::Stdout,
            "return" => ProblemStyle::Return,
            "mixed" => ProblemStyle::Mixed,
            _ if s.contains("stdout") => ProblemStyle::Stdout,
            _ if s.contains("mixed") => ProblemStyle::Mixed,
            _ => ProblemStyle::Return,
        }
    }
}

impl fmt::Display for ProblemStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `{difficulty, count}` entry of the difficulty plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyBucket {
    pub difficulty: Difficulty,
    pub count: usize,
}

impl DifficultyBucket {
    pub fn new(difficulty: Difficulty, count: usize) -> Self {
        Self { difficulty, count }
    }
}

/// Immutable, validated description of an activity to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySpec {
    pub language: Language,
    pub problem_count: usize,
    pub difficulty_plan: Vec<DifficultyBucket>,
    pub topic_tags: Vec<String>,
    pub problem_style: ProblemStyle,
    pub constraints: String,
    #[serde(default = "default_test_case_count")]
    pub test_case_count: usize,
}

fn default_test_case_count() -> usize {
    TEST_CASE_COUNT
}

impl ActivitySpec {
    /// Build a spec with the language's default constraints and 8 tests.
    pub fn new(
        language: Language,
        difficulty_plan: Vec<DifficultyBucket>,
        topic_tags: Vec<String>,
        problem_style: ProblemStyle,
    ) -> Self {
        let problem_count = difficulty_plan.iter().map(|b| b.count).sum();
        Self {
            language,
            problem_count,
            difficulty_plan,
            topic_tags,
            problem_style,
            constraints: language.default_constraints().to_string(),
            test_case_count: TEST_CASE_COUNT,
        }
    }

    /// Override the constraints string.
    pub fn with_constraints(mut self, constraints: impl Into<String>) -> Self {
        self.constraints = constraints.into();
        self
    }

    /// Count of slots the plan asks for at `difficulty`.
    pub fn count_for(&self, difficulty: Difficulty) -> usize {
        self.difficulty_plan
            .iter()
            .filter(|b| b.difficulty == difficulty)
            .map(|b| b.count)
            .sum()
    }

    /// Check the spec's own schema rules.
    ///
    /// The orchestrator trusts specs handed to it; this is for the upstream
    /// builder and the CLI.
    pub fn validate(&self) -> Result<(), SpecError> {
        if !(1..=MAX_PROBLEM_COUNT).contains(&self.problem_count) {
            return Err(SpecError::ProblemCount(self.problem_count));
        }

        if !(1..=3).contains(&self.difficulty_plan.len()) {
            return Err(SpecError::PlanLength(self.difficulty_plan.len()));
        }
        for (i, bucket) in self.difficulty_plan.iter().enumerate() {
            if self.difficulty_plan[..i]
                .iter()
                .any(|b| b.difficulty == bucket.difficulty)
            {
                return Err(SpecError::DuplicateDifficulty(
                    bucket.difficulty.to_string(),
                ));
            }
        }
        if self.difficulty_plan.iter().filter(|b| b.count > 0).count() < 2 {
            return Err(SpecError::TooFewBuckets);
        }
        let sum: usize = self.difficulty_plan.iter().map(|b| b.count).sum();
        if sum != self.problem_count {
            return Err(SpecError::PlanSum {
                sum,
                expected: self.problem_count,
            });
        }

        if !(1..=12).contains(&self.topic_tags.len()) {
            return Err(SpecError::TopicCount(self.topic_tags.len()));
        }
        if let Some(bad) = self
            .topic_tags
            .iter()
            .find(|t| t.trim().is_empty() || t.trim().chars().count() > 40)
        {
            return Err(SpecError::TopicTag(bad.clone()));
        }

        if self.test_case_count != TEST_CASE_COUNT {
            return Err(SpecError::TestCaseCount(self.test_case_count));
        }
        if self.constraints.trim().is_empty() {
            return Err(SpecError::EmptyConstraints);
        }
        if self.language == Language::Java {
            let c = self.constraints.to_lowercase();
            if !c.contains("no package") || !c.contains("junit") {
                return Err(SpecError::JavaConstraints);
            }
        }
        Ok(())
    }
}
