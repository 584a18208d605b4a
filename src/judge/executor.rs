//! Container runtime boundary.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::JudgeError;
use crate::utils::text::truncate_chars;

/// Per-stream output cap.
pub const MAX_OUTPUT_CHARS: usize = 1_000_000;

/// Exit codes a container reports after SIGKILL / SIGTERM.
const SIGNAL_EXIT_CODES: [i32; 2] = [137, 143];

/// Raw output of one container invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed before reporting a status.
    pub exit_code: Option<i32>,
    /// Set when the wall clock elapsed and the container was killed.
    pub killed: bool,
    pub duration: Duration,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.killed
    }

    /// Killed by the wrapper or terminated by signal inside the container.
    pub fn timed_out(&self) -> bool {
        self.killed
            || self
                .exit_code
                .is_some_and(|code| SIGNAL_EXIT_CODES.contains(&code))
    }

    pub fn execution_time_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// Runs `docker`-style argument lists under a wall clock.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn execute(
        &self,
        args: &[String],
        container_name: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, JudgeError>;
}

/// Shells out to the Docker CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
        }
    }
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn kill(&self, container_name: &str) {
        let result = tokio::process::Command::new(&self.program)
            .args(["kill", container_name])
            .output()
            .await;
        if let Err(e) = result {
            warn!("Failed to kill container {}: {}", container_name, e);
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn execute(
        &self,
        args: &[String],
        container_name: &str,
        timeout: Duration,
    ) -> Result<ExecOutput, JudgeError> {
        debug!("{} {}", self.program, args.join(" "));
        let start = Instant::now();

        let child = tokio::process::Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => Ok(ExecOutput {
                stdout: cap(&String::from_utf8_lossy(&output.stdout)),
                stderr: cap(&String::from_utf8_lossy(&output.stderr)),
                exit_code: output.status.code(),
                killed: false,
                duration: start.elapsed(),
            }),
            Ok(Err(e)) => Err(JudgeError::Exec(e.to_string())),
            Err(_) => {
                warn!(
                    "Container {} exceeded {}ms, killing",
                    container_name,
                    timeout.as_millis()
                );
                self.kill(container_name).await;
                Ok(ExecOutput {
                    stdout: String::new(),
                    stderr: format!("Timed out after {}ms", timeout.as_millis()),
                    exit_code: None,
                    killed: true,
                    duration: start.elapsed(),
                })
            }
        }
    }
}

fn cap(text: &str) -> String {
    truncate_chars(text, MAX_OUTPUT_CHARS).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(exit_code: Option<i32>, killed: bool) -> ExecOutput {
        ExecOutput {
            exit_code,
            killed,
            ..Default::default()
        }
    }

    #[test]
    fn test_timeout_classification() {
        assert!(output(Some(137), false).timed_out());
        assert!(output(Some(143), false).timed_out());
        assert!(output(None, true).timed_out());
        assert!(!output(Some(1), false).timed_out());
        assert!(!output(Some(0), false).timed_out());
    }

    #[test]
    fn test_success() {
        assert!(output(Some(0), false).success());
        assert!(!output(Some(0), true).success());
        assert!(!output(None, false).success());
    }

    #[tokio::test]
    async fn test_missing_program_is_an_exec_error() {
        let cli = DockerCli::new("definitely-not-a-real-docker-binary");
        let err = cli
            .execute(&["version".to_string()], "x", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::Exec(_)));
    }
}
