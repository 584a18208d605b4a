//! Sandbox proof that a draft's reference artifact passes its own tests.

use regex::Regex;
use tracing::{debug, info};

use super::errors::{FailureKind, ReferenceSolutionError};
use crate::contracts::{GeneratedProblemDraft, Language, ReferenceArtifact};
use crate::judge::{JudgeAdapter, JudgeResult, Submission};
use crate::utils::text::truncate_chars;

const SNIPPET_CHARS: usize = 1200;

fn compile_error_pattern(language: Language) -> &'static Regex {
    match language {
        Language::Java => {
            regex!(r"\berror:|cannot find symbol|class, interface, or enum expected")
        }
        Language::Python => {
            regex!(r"\b(syntaxerror|indentationerror|taberror|modulenotfounderror|importerror)\b")
        }
        Language::Cpp | Language::Sql => regex!(r"\berror:|undefined reference|ld returned|collect2:"),
    }
}

/// Classify a judge result. `None` means the reference passed.
pub fn classify_judge_result(language: Language, result: &JudgeResult) -> Option<FailureKind> {
    if result.timed_out {
        return Some(FailureKind::Timeout);
    }
    if result.success && result.failed_tests.is_empty() {
        return None;
    }
    let combined = format!("{}\n{}", result.stdout, result.stderr).to_lowercase();
    if compile_error_pattern(language).is_match(&combined) {
        Some(FailureKind::Compile)
    } else {
        Some(FailureKind::Tests)
    }
}

fn exit_code_label(code: Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn compile_snippet(result: &JudgeResult) -> String {
    let source = if result.stderr.is_empty() {
        &result.stdout
    } else {
        &result.stderr
    };
    let snippet = truncate_chars(source, SNIPPET_CHARS);
    if snippet.is_empty() {
        format!(
            "No compiler output captured (exitCode={}).",
            exit_code_label(result.exit_code)
        )
    } else {
        snippet.to_string()
    }
}

fn test_failure_snippet(result: &JudgeResult) -> String {
    let junit_failure =
        regex!(r"(?i)Failures\s*\(\d+\):|\[X\]|AssertionFailedError|org\.opentest4j")
            .is_match(&result.stdout);
    let source = if junit_failure || result.stdout.len() >= result.stderr.len() {
        &result.stdout
    } else {
        &result.stderr
    };
    let snippet = truncate_chars(source, SNIPPET_CHARS);
    if snippet.is_empty() {
        format!(
            "No JUnit output captured (exitCode={}).",
            exit_code_label(result.exit_code)
        )
    } else {
        snippet.to_string()
    }
}

/// Judge the draft's reference artifact against its test suite.
///
/// Workspace references are submitted as files, single-file references as
/// code. The caller must discard the reference after this returns `Ok`.
pub async fn validate_reference(
    judge: &dyn JudgeAdapter,
    draft: &GeneratedProblemDraft,
) -> Result<(), ReferenceSolutionError> {
    let problem = &draft.problem;
    let submission = match &draft.reference {
        ReferenceArtifact::Solution(code) => Submission::Code(code.clone()),
        ReferenceArtifact::Workspace(ws) => Submission::files(
            ws.files
                .iter()
                .map(|f| (f.path.clone(), f.content.clone())),
        ),
    };

    let result = judge
        .judge(problem.language, &submission, &problem.test_suite)
        .await;
    debug!(
        "Judge output for \"{}\": stdout={} bytes, stderr={} bytes",
        problem.title,
        result.stdout.len(),
        result.stderr.len()
    );

    let Some(kind) = classify_judge_result(problem.language, &result) else {
        info!(
            "Reference for \"{}\" passed {} tests in {}ms",
            problem.title,
            result.passed_tests.len(),
            result.execution_time_ms
        );
        return Ok(());
    };

    let message = match kind {
        FailureKind::Timeout => format!("Reference solution timed out for \"{}\".", problem.title),
        FailureKind::Compile => format!(
            "Reference solution failed to compile for \"{}\": {}",
            problem.title,
            compile_snippet(&result)
        ),
        _ => format!(
            "Reference solution failed tests for \"{}\": {}",
            problem.title,
            test_failure_snippet(&result)
        ),
    };

    Err(ReferenceSolutionError {
        message,
        kind,
        stdout: result.stdout,
        stderr: result.stderr,
        exit_code: result.exit_code,
    })
}
