//! Sandboxed compile/execute/test judging.
//!
//! A judge call materializes files into a fresh temporary directory, runs the
//! language's judge image against it through a [`ContainerRuntime`], parses
//! the tool output and always returns a [`JudgeResult`]. Setup, execution
//! and teardown failures are folded into an unsuccessful result rather than
//! surfaced as errors.

pub mod adapters;
pub mod executor;
pub mod parsers;
pub mod run;
pub mod sandbox;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::contracts::Language;
use crate::languages;

pub use adapters::DockerJudge;
pub use executor::{ContainerRuntime, DockerCli, ExecOutput};
pub use run::{run_code, RunOutput};

/// Default judge wall clock.
pub const DEFAULT_JUDGE_TIMEOUT_MS: u64 = 15_000;
/// Default wall clock for run-only execution.
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 8_000;
/// Upper bound for either timeout.
pub const MAX_TIMEOUT_MS: u64 = 30_000;

/// Outcome of one judge invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeResult {
    pub success: bool,
    pub passed_tests: Vec<String>,
    pub failed_tests: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub timed_out: bool,
}

impl JudgeResult {
    /// A failed result carrying only an error message.
    pub fn failure(stderr: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            stderr: stderr.into(),
            execution_time_ms,
            ..Default::default()
        }
    }
}

/// What is being judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A single solution source, written under the language's solution name.
    Code(String),
    /// Several files keyed by filename.
    Files(BTreeMap<String, String>),
}

impl Submission {
    pub fn files(files: impl IntoIterator<Item = (String, String)>) -> Self {
        Submission::Files(files.into_iter().collect())
    }
}

/// Judges a submission against a test suite.
#[async_trait]
pub trait JudgeAdapter: Send + Sync {
    async fn judge(
        &self,
        language: Language,
        submission: &Submission,
        test_suite: &str,
    ) -> JudgeResult;
}

/// Images and timeouts used by the Docker judge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeConfig {
    pub image_overrides: HashMap<Language, String>,
    pub judge_timeout: Duration,
    pub run_timeout: Duration,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            image_overrides: HashMap::new(),
            judge_timeout: Duration::from_millis(DEFAULT_JUDGE_TIMEOUT_MS),
            run_timeout: Duration::from_millis(DEFAULT_RUN_TIMEOUT_MS),
        }
    }
}

impl JudgeConfig {
    /// Read `JUDGE_TIMEOUT_MS` and `CODEMM_RUN_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let judge = std::env::var("JUDGE_TIMEOUT_MS").ok();
        let run = std::env::var("CODEMM_RUN_TIMEOUT_MS").ok();
        Self {
            image_overrides: HashMap::new(),
            judge_timeout: Duration::from_millis(parse_timeout_ms(
                judge.as_deref(),
                DEFAULT_JUDGE_TIMEOUT_MS,
            )),
            run_timeout: Duration::from_millis(parse_timeout_ms(
                run.as_deref(),
                DEFAULT_RUN_TIMEOUT_MS,
            )),
        }
    }

    pub fn with_image(mut self, language: Language, image: impl Into<String>) -> Self {
        self.image_overrides.insert(language, image.into());
        self
    }

    pub fn with_judge_timeout(mut self, timeout: Duration) -> Self {
        self.judge_timeout = timeout;
        self
    }

    pub fn image(&self, language: Language) -> &str {
        self.image_overrides
            .get(&language)
            .map(String::as_str)
            .unwrap_or(languages::profile(language).judge_image)
    }
}

/// Parse a millisecond timeout: missing, non-numeric or non-positive values
/// fall back to `default_ms`, everything is capped at [`MAX_TIMEOUT_MS`].
pub fn parse_timeout_ms(raw: Option<&str>, default_ms: u64) -> u64 {
    let Some(value) = raw.and_then(|r| r.trim().parse::<f64>().ok()) else {
        return default_ms;
    };
    if !value.is_finite() || value <= 0.0 {
        return default_ms;
    }
    (value.floor() as u64).min(MAX_TIMEOUT_MS)
}
