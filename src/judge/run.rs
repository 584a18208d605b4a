//! Run-only execution: compile and run a program without a test suite.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::executor::ContainerRuntime;
use super::sandbox::{self, is_safe_filename, Workdir};
use super::{JudgeConfig, Submission};
use crate::contracts::Language;
use crate::error::JudgeError;
use crate::languages::java;

const STDIN_FILENAME: &str = "stdin.txt";

/// Output of a run-only execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub timed_out: bool,
    pub execution_time_ms: u64,
}

fn run_prefix(language: Language) -> &'static str {
    match language {
        Language::Java => "codem-run-",
        Language::Python => "codem-py-run-",
        Language::Cpp => "codem-cpp-run-",
        Language::Sql => "codem-sql-run-",
    }
}

/// Compile and run `submission`, feeding `stdin` when given.
///
/// Like judging, this never fails: setup errors come back in `stderr`.
pub async fn run_code(
    runtime: &dyn ContainerRuntime,
    config: &JudgeConfig,
    language: Language,
    submission: &Submission,
    stdin: Option<&str>,
    main_class: Option<&str>,
) -> RunOutput {
    let start = Instant::now();
    info!("Running {} program", language);
    match try_run(runtime, config, language, submission, stdin, main_class).await {
        Ok(mut output) => {
            output.execution_time_ms = start.elapsed().as_millis() as u64;
            output
        }
        Err(e) => {
            warn!("Run failed before execution: {}", e);
            RunOutput {
                stderr: e.to_string(),
                execution_time_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            }
        }
    }
}

async fn try_run(
    runtime: &dyn ContainerRuntime,
    config: &JudgeConfig,
    language: Language,
    submission: &Submission,
    stdin: Option<&str>,
    main_class: Option<&str>,
) -> Result<RunOutput, JudgeError> {
    let files = run_layout(language, submission)?;
    for name in files.keys() {
        if !is_safe_filename(name) {
            return Err(JudgeError::InvalidFilename(name.clone()));
        }
        if stdin.is_some() && name == STDIN_FILENAME {
            return Err(JudgeError::ReservedFilename(name.clone()));
        }
    }

    let main_class = match language {
        Language::Java => main_class
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| java_main_class(&files)),
        _ => String::new(),
    };

    let workdir = Workdir::create(run_prefix(language))?;
    for (name, content) in &files {
        workdir.write(name, content)?;
    }
    if let Some(input) = stdin {
        workdir.write(STDIN_FILENAME, input)?;
    }

    let container = format!("{}{}", run_prefix(language), Uuid::new_v4());
    let args = sandbox::run_sandbox(
        language,
        config.image(language),
        &main_class,
        stdin.is_some(),
    )
    .docker_run_args(&container, workdir.path());
    let output = runtime.execute(&args, &container, config.run_timeout).await?;

    Ok(RunOutput {
        timed_out: output.timed_out(),
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
        execution_time_ms: 0,
    })
}

/// Files to materialize for a run, validating the language's entry file.
fn run_layout(
    language: Language,
    submission: &Submission,
) -> Result<BTreeMap<String, String>, JudgeError> {
    let files = match submission {
        Submission::Files(map) => map.clone(),
        Submission::Code(code) => {
            let name = match language {
                Language::Java => format!("{}.java", java::infer_class_name(code, "Solution")),
                Language::Python => "main.py".to_string(),
                Language::Cpp => "main.cpp".to_string(),
                Language::Sql => "solution.sql".to_string(),
            };
            BTreeMap::from([(name, code.clone())])
        }
    };

    let required = match language {
        Language::Python => Some(("main.py", "Python /run requires a \"main.py\" file.")),
        Language::Cpp => Some(("main.cpp", "C++ /run requires a \"main.cpp\" file.")),
        Language::Sql => Some((
            "test_suite.json",
            "SQL /run requires a \"test_suite.json\" file with schema and seed data.",
        )),
        Language::Java => None,
    };
    if let Some((name, message)) = required {
        if !files.contains_key(name) {
            return Err(JudgeError::MissingEntryFile(message.to_string()));
        }
    }
    if language == Language::Sql && !files.contains_key("solution.sql") {
        return Err(JudgeError::MissingEntryFile(
            "SQL /run requires a \"solution.sql\" file.".to_string(),
        ));
    }
    Ok(files)
}

/// The class declaring `main`, else the first file's class.
fn java_main_class(files: &BTreeMap<String, String>) -> String {
    files
        .values()
        .find(|src| java::has_main_method(src))
        .or_else(|| files.values().next())
        .map(|src| java::infer_primary_class_name(src, "Main"))
        .unwrap_or_else(|| "Main".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::ExecOutput;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        args: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContainerRuntime for Recorder {
        async fn execute(
            &self,
            args: &[String],
            _container_name: &str,
            _timeout: Duration,
        ) -> Result<ExecOutput, JudgeError> {
            *self.args.lock().unwrap() = args.to_vec();
            Ok(ExecOutput {
                stdout: "hello\n".to_string(),
                exit_code: Some(0),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_python_requires_main() {
        let recorder = Recorder::default();
        let submission = Submission::files([("app.py".to_string(), "print(1)".to_string())]);
        let out = run_code(
            &recorder,
            &JudgeConfig::default(),
            Language::Python,
            &submission,
            None,
            None,
        )
        .await;
        assert_eq!(out.stderr, "Python /run requires a \"main.py\" file.");
        assert!(recorder.args.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_java_main_class_inferred() {
        let recorder = Recorder::default();
        let submission = Submission::files([
            ("Helper.java".to_string(), "public class Helper { }".to_string()),
            (
                "App.java".to_string(),
                "public class App { public static void main(String[] args) { } }".to_string(),
            ),
        ]);
        let out = run_code(
            &recorder,
            &JudgeConfig::default(),
            Language::Java,
            &submission,
            Some("3\n"),
            None,
        )
        .await;
        assert_eq!(out.stdout, "hello\n");
        let args = recorder.args.lock().unwrap();
        assert_eq!(
            args.last().unwrap(),
            "javac *.java && java App < /workspace/stdin.txt"
        );
    }

    #[tokio::test]
    async fn test_stdin_file_conflict() {
        let recorder = Recorder::default();
        let submission = Submission::files([
            ("main.cpp".to_string(), "int main(){}".to_string()),
            ("stdin.txt".to_string(), "x".to_string()),
        ]);
        let out = run_code(
            &recorder,
            &JudgeConfig::default(),
            Language::Cpp,
            &submission,
            Some("y"),
            None,
        )
        .await;
        assert!(out.stderr.contains("stdin.txt"));
    }

    #[test]
    fn test_code_layout_names() {
        let files = run_layout(Language::Cpp, &Submission::Code("int main(){}".into())).unwrap();
        assert!(files.contains_key("main.cpp"));
        let err = run_layout(Language::Sql, &Submission::Code("SELECT 1".into())).unwrap_err();
        assert!(err.to_string().contains("test_suite.json"));
    }
}
