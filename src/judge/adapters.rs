//! Docker-backed [`JudgeAdapter`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::executor::{ContainerRuntime, DockerCli};
use super::parsers::{self, TestOutcome};
use super::sandbox::{self, is_safe_filename, Workdir};
use super::{JudgeAdapter, JudgeConfig, JudgeResult, Submission};
use crate::contracts::Language;
use crate::error::JudgeError;
use crate::languages::{self, java, python};

/// Judges submissions in per-language Docker images.
pub struct DockerJudge {
    runtime: Arc<dyn ContainerRuntime>,
    config: JudgeConfig,
}

impl DockerJudge {
    pub fn new(config: JudgeConfig) -> Self {
        Self::with_runtime(Arc::new(DockerCli::default()), config)
    }

    pub fn with_runtime(runtime: Arc<dyn ContainerRuntime>, config: JudgeConfig) -> Self {
        Self { runtime, config }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    async fn try_judge(
        &self,
        language: Language,
        submission: &Submission,
        test_suite: &str,
        start: Instant,
    ) -> Result<JudgeResult, JudgeError> {
        let profile = languages::profile(language);
        let files = judge_layout(language, submission, test_suite)?;

        let workdir = Workdir::create(profile.tmp_prefix)?;
        for (name, content) in &files {
            workdir.write(name, content)?;
        }

        let container = format!("{}{}", profile.tmp_prefix, Uuid::new_v4());
        let args = sandbox::judge_sandbox(language, self.config.image(language))
            .docker_run_args(&container, workdir.path());
        let output = self
            .runtime
            .execute(&args, &container, self.config.judge_timeout)
            .await?;
        debug!(
            "judge exit={:?} timed_out={} stdout={}B stderr={}B",
            output.exit_code,
            output.timed_out(),
            output.stdout.len(),
            output.stderr.len()
        );

        let outcome = match language {
            Language::Java => parsers::parse_junit_tree(&output.stdout),
            Language::Python => {
                let inferred = python::test_function_names(test_suite);
                if output.success() {
                    TestOutcome {
                        passed: inferred,
                        failed: Vec::new(),
                    }
                } else {
                    let combined = format!("{}\n{}", output.stdout, output.stderr);
                    parsers::parse_pytest(&combined, &inferred)
                }
            }
            Language::Cpp | Language::Sql => parsers::parse_pass_fail(&output.stdout),
        };

        Ok(JudgeResult {
            success: output.success(),
            passed_tests: outcome.passed,
            failed_tests: outcome.failed,
            execution_time_ms: start.elapsed().as_millis() as u64,
            exit_code: output.exit_code,
            timed_out: output.timed_out(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[async_trait]
impl JudgeAdapter for DockerJudge {
    async fn judge(
        &self,
        language: Language,
        submission: &Submission,
        test_suite: &str,
    ) -> JudgeResult {
        let start = Instant::now();
        info!("Judging {} submission", language);
        match self.try_judge(language, submission, test_suite, start).await {
            Ok(result) => {
                info!(
                    "Judge finished: success={} passed={} failed={} in {}ms",
                    result.success,
                    result.passed_tests.len(),
                    result.failed_tests.len(),
                    result.execution_time_ms
                );
                result
            }
            Err(e) => {
                warn!("Judge setup failed: {}", e);
                JudgeResult::failure(e.to_string(), start.elapsed().as_millis() as u64)
            }
        }
    }
}

/// Files to materialize for a judge run, test suite last.
pub fn judge_layout(
    language: Language,
    submission: &Submission,
    test_suite: &str,
) -> Result<Vec<(String, String)>, JudgeError> {
    let profile = languages::profile(language);

    let (mut files, test_filename) = match (language, submission) {
        (Language::Java, Submission::Code(code)) => {
            let user_class = java::infer_class_name(code, "Solution");
            let test_class = java::infer_class_name(test_suite, &format!("{}Test", user_class));
            (
                vec![(format!("{}.java", user_class), code.clone())],
                format!("{}.java", test_class),
            )
        }
        (Language::Java, Submission::Files(map)) => {
            let test_class = java::infer_class_name(test_suite, "UserTest");
            (
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                format!("{}.java", test_class),
            )
        }
        (Language::Sql, submission) => {
            let code = match submission {
                Submission::Code(code) => code.clone(),
                Submission::Files(map) => map.get("solution.sql").cloned().ok_or_else(|| {
                    JudgeError::MissingEntryFile(
                        "SQL judge requires a \"solution.sql\" file.".to_string(),
                    )
                })?,
            };
            (
                vec![("solution.sql".to_string(), code)],
                "test_suite.json".to_string(),
            )
        }
        (_, Submission::Code(code)) => (
            vec![(
                profile.solution_filename.unwrap_or("solution").to_string(),
                code.clone(),
            )],
            profile.test_filename.unwrap_or("test").to_string(),
        ),
        (_, Submission::Files(map)) => (
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            profile.test_filename.unwrap_or("test").to_string(),
        ),
    };

    for (name, _) in &files {
        if !is_safe_filename(name) {
            return Err(JudgeError::InvalidFilename(name.clone()));
        }
        if *name == test_filename {
            return Err(JudgeError::ReservedFilename(test_filename));
        }
    }
    if !is_safe_filename(&test_filename) {
        return Err(JudgeError::InvalidFilename(test_filename));
    }

    files.push((test_filename, test_suite.to_string()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ProblemStyle;
    use crate::judge::ExecOutput;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records the argument list and the files visible in the mounted
    /// directory, then replies with a canned output.
    struct FakeRuntime {
        reply: ExecOutput,
        seen: Mutex<Vec<(Vec<String>, Vec<String>)>>,
    }

    impl FakeRuntime {
        fn new(reply: ExecOutput) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn execute(
            &self,
            args: &[String],
            _container_name: &str,
            _timeout: Duration,
        ) -> Result<ExecOutput, JudgeError> {
            let mount = args
                .iter()
                .find(|a| a.contains(":/workspace"))
                .map(|a| a.split(":/workspace").next().unwrap_or_default().to_string())
                .unwrap_or_default();
            let mut names: Vec<String> = std::fs::read_dir(&mount)
                .map(|rd| {
                    rd.filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().to_string())
                        .collect()
                })
                .unwrap_or_default();
            names.sort();
            self.seen.lock().unwrap().push((args.to_vec(), names));
            Ok(self.reply.clone())
        }
    }

    fn reply(stdout: &str, exit_code: i32) -> ExecOutput {
        ExecOutput {
            stdout: stdout.to_string(),
            exit_code: Some(exit_code),
            ..Default::default()
        }
    }

    #[test]
    fn test_java_layout_infers_class_names() {
        let files = judge_layout(
            Language::Java,
            &Submission::Code("public class Cart { }".into()),
            "class CartTest { }",
        )
        .unwrap();
        let names: Vec<&str> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Cart.java", "CartTest.java"]);
    }

    #[test]
    fn test_reserved_filename_rejected() {
        let submission = Submission::files([(
            "test_solution.py".to_string(),
            "x = 1".to_string(),
        )]);
        let err = judge_layout(Language::Python, &submission, "def test_a(): pass").unwrap_err();
        assert!(matches!(err, JudgeError::ReservedFilename(_)));

        let submission = Submission::files([("UserTest.java".to_string(), "".to_string())]);
        let err = judge_layout(Language::Java, &submission, "no class here").unwrap_err();
        assert_eq!(
            err.to_string(),
            "User files include \"UserTest.java\", which conflicts with the test suite filename."
        );
    }

    #[test]
    fn test_path_traversal_rejected() {
        let submission = Submission::files([("../x.cpp".to_string(), "".to_string())]);
        let err = judge_layout(Language::Cpp, &submission, "").unwrap_err();
        assert!(matches!(err, JudgeError::InvalidFilename(_)));
    }

    #[test]
    fn test_sql_files_require_solution() {
        let submission = Submission::Files(BTreeMap::new());
        let err = judge_layout(Language::Sql, &submission, "{}").unwrap_err();
        assert_eq!(err.to_string(), "SQL judge requires a \"solution.sql\" file.");
    }

    #[tokio::test]
    async fn test_python_success_passes_inferred_tests() {
        let runtime = FakeRuntime::new(reply("2 passed", 0));
        let judge = DockerJudge::with_runtime(runtime.clone(), JudgeConfig::default());
        let suite = "def test_case_1():\n    pass\n\ndef test_case_2():\n    pass\n";
        let result = judge
            .judge(Language::Python, &Submission::Code("def solve(): pass".into()), suite)
            .await;

        assert!(result.success);
        assert_eq!(result.passed_tests, vec!["test_case_1", "test_case_2"]);
        let seen = runtime.seen.lock().unwrap();
        assert_eq!(seen[0].1, vec!["solution.py", "test_solution.py"]);
        assert!(seen[0].0.contains(&"codem-python-judge".to_string()));
    }

    #[tokio::test]
    async fn test_cpp_failure_and_timeout_classification() {
        let runtime = FakeRuntime::new(reply("[PASS] test_case_1\n[FAIL] test_case_2\n", 137));
        let judge = DockerJudge::with_runtime(runtime, JudgeConfig::default());
        let result = judge
            .judge(Language::Cpp, &Submission::Code("int solve(){return 1;}".into()), "")
            .await;

        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.exit_code, Some(137));
        assert_eq!(result.passed_tests, vec!["test_case_1"]);
        assert_eq!(result.failed_tests, vec!["test_case_2"]);
    }

    /// Judge a suite that passes validation against a runner reporting
    /// every test green, and return the passed names.
    async fn judge_valid_suite(language: Language, suite: &str, code: &str, stdout: &str) -> Vec<String> {
        assert!(
            languages::validate_test_suite(language, suite, 8, ProblemStyle::Return).is_ok(),
            "suite should validate"
        );
        let runtime = FakeRuntime::new(reply(stdout, 0));
        let judge = DockerJudge::with_runtime(runtime, JudgeConfig::default());
        let result = judge.judge(language, &Submission::Code(code.into()), suite).await;
        assert!(result.success);
        assert!(result.failed_tests.is_empty());
        result.passed_tests
    }

    fn pass_lines() -> String {
        (1..=8).map(|i| format!("[PASS] test_case_{}\n", i)).collect()
    }

    #[tokio::test]
    async fn test_java_valid_suite_reports_all_tests() {
        let mut suite = String::from(
            "import org.junit.jupiter.api.Test;\nimport static org.junit.jupiter.api.Assertions.*;\n\npublic class CounterTest {\n",
        );
        let mut tree = String::from("+-- JUnit Jupiter [OK]\n| '-- CounterTest [OK]\n");
        for i in 1..=8 {
            suite.push_str(&format!(
                "    @Test\n    void testCase{}() {{\n        assertEquals({}, new Counter().add({}));\n    }}\n",
                i, i, i
            ));
            tree.push_str(&format!("|   +-- testCase{}() [OK]\n", i));
        }
        suite.push_str("}\n");
        tree.push_str("Test run finished after 120 ms\n[         8 tests successful      ]\n");

        let code = "public class Counter { public int add(int x) { return x; } }";
        let passed = judge_valid_suite(Language::Java, &suite, code, &tree).await;
        assert_eq!(passed.len(), 8);
        assert_eq!(passed[0], "testCase1");
        assert_eq!(passed[7], "testCase8");
    }

    #[tokio::test]
    async fn test_cpp_valid_suite_reports_all_tests() {
        let mut suite = String::from(
            "#include <bits/stdc++.h>\n#include \"solution.cpp\"\n\n#define RUN_TEST(name, ...) do { try { __VA_ARGS__; std::cout << \"[PASS] \" << name << \"\\n\"; } catch (...) { std::cout << \"[FAIL] \" << name << \"\\n\"; } } while (0)\n\nint main() {\n",
        );
        for i in 1..=8 {
            suite.push_str(&format!(
                "  RUN_TEST(\"test_case_{}\", {{ if (solve({}) != {}) throw std::runtime_error(\"mismatch\"); }});\n",
                i,
                i,
                i * 2
            ));
        }
        suite.push_str("  return 0;\n}\n");

        let code = "int solve(int x) { return x * 2; }\n";
        let passed = judge_valid_suite(Language::Cpp, &suite, code, &pass_lines()).await;
        assert_eq!(passed.len(), 8);
        assert!((1..=8).all(|i| passed.contains(&format!("test_case_{}", i))));
    }

    #[tokio::test]
    async fn test_sql_valid_suite_reports_all_tests() {
        let cases: Vec<serde_json::Value> = (1..=8)
            .map(|i| {
                serde_json::json!({
                    "name": format!("test_case_{}", i),
                    "seed_sql": format!("INSERT INTO users VALUES ({}, 'user{}');", i, i),
                    "expected": {"columns": ["name"], "rows": [[format!("user{}", i)]]}
                })
            })
            .collect();
        let suite = serde_json::json!({
            "schema_sql": "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);",
            "cases": cases
        })
        .to_string();

        let passed = judge_valid_suite(Language::Sql, &suite, "SELECT name FROM users;", &pass_lines()).await;
        assert_eq!(passed.len(), 8);
        assert!(passed.contains(&"test_case_8".to_string()));
    }

    #[tokio::test]
    async fn test_workdir_removed_after_judge() {
        let runtime = FakeRuntime::new(reply("", 0));
        let judge = DockerJudge::with_runtime(runtime.clone(), JudgeConfig::default());
        judge
            .judge(Language::Sql, &Submission::Code("SELECT 1".into()), "{}")
            .await;

        let seen = runtime.seen.lock().unwrap();
        let mount = seen[0]
            .0
            .iter()
            .find(|a| a.contains(":/workspace"))
            .unwrap()
            .split(":/workspace")
            .next()
            .unwrap()
            .to_string();
        assert!(!std::path::Path::new(&mount).exists());
        assert_eq!(seen[0].1, vec!["solution.sql", "test_suite.json"]);
    }

    #[tokio::test]
    async fn test_setup_error_becomes_failed_result() {
        let runtime = FakeRuntime::new(reply("", 0));
        let judge = DockerJudge::with_runtime(runtime.clone(), JudgeConfig::default());
        let submission = Submission::files([("test.cpp".to_string(), "".to_string())]);
        let result = judge.judge(Language::Cpp, &submission, "").await;

        assert!(!result.success);
        assert!(result.stderr.contains("conflicts with the test suite filename"));
        assert!(runtime.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires docker and the codem-python-judge image"]
    async fn test_docker_python_judge() {
        let judge = DockerJudge::new(JudgeConfig::from_env());
        let suite = "from solution import solve\n\ndef test_case_1():\n    assert solve(1) == 2\n";
        let result = judge
            .judge(
                Language::Python,
                &Submission::Code("def solve(x):\n    return x + 1\n".into()),
                suite,
            )
            .await;
        assert!(result.success, "{}", result.stderr);
    }
}
