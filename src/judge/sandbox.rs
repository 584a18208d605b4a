//! Docker argument construction for judge and run containers.

use std::path::{Path, PathBuf};

use crate::contracts::Language;

/// Container-side mount point of the ephemeral directory.
pub const WORKSPACE: &str = "/workspace";

const CPP_TEST_COMPILE: &str =
    "g++ -std=c++20 -O2 -pipe -Wall -Wextra -Wno-unused-parameter -o /tmp/test /workspace/test.cpp";
const CPP_RUN_COMPILE: &str =
    "g++ -std=c++20 -O2 -pipe -Wall -Wextra -Wno-unused-parameter -o /tmp/a.out *.cpp";

const PYTHON_ENV: [(&str, &str); 4] = [
    ("PYTHONDONTWRITEBYTECODE", "1"),
    ("PYTHONHASHSEED", "0"),
    ("PYTHONUNBUFFERED", "1"),
    ("PYTEST_DISABLE_PLUGIN_AUTOLOAD", "1"),
];

/// Isolation settings for one container invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub image: String,
    /// Network mode ("none" for every judge container).
    pub network_mode: String,
    /// Mount the root filesystem read-only.
    pub read_only_root: bool,
    /// Writable scratch mount, e.g. `/tmp:rw`.
    pub tmpfs: Option<String>,
    /// Whether the workspace mount is read-only.
    pub workspace_readonly: bool,
    pub workdir: Option<String>,
    pub entrypoint: Option<String>,
    pub env_vars: Vec<(String, String)>,
    /// Arguments after the image name.
    pub command: Vec<String>,
}

impl SandboxConfig {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            network_mode: "none".to_string(),
            read_only_root: false,
            tmpfs: None,
            workspace_readonly: false,
            workdir: None,
            entrypoint: None,
            env_vars: Vec::new(),
            command: Vec::new(),
        }
    }

    /// Read-only root with a writable tmpfs, read-only workspace as cwd.
    pub fn locked_down(mut self, tmpfs: &str) -> Self {
        self.read_only_root = true;
        self.tmpfs = Some(tmpfs.to_string());
        self.workspace_readonly = true;
        self.workdir = Some(WORKSPACE.to_string());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Run `script` through `bash -lc`.
    pub fn with_bash(mut self, script: impl Into<String>) -> Self {
        self.entrypoint = Some("/bin/bash".to_string());
        self.command = vec!["-lc".to_string(), script.into()];
        self
    }

    /// Full `docker` argument list (without the `docker` program itself).
    pub fn docker_run_args(&self, container_name: &str, host_dir: &Path) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            "--network".to_string(),
            self.network_mode.clone(),
        ];

        if self.read_only_root {
            args.push("--read-only".to_string());
        }
        if let Some(tmpfs) = &self.tmpfs {
            args.push("--tmpfs".to_string());
            args.push(tmpfs.clone());
        }
        for (key, value) in &self.env_vars {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        let ro = if self.workspace_readonly { ":ro" } else { "" };
        args.push("-v".to_string());
        args.push(format!("{}:{}{}", host_dir.display(), WORKSPACE, ro));

        if let Some(workdir) = &self.workdir {
            args.push("--workdir".to_string());
            args.push(workdir.clone());
        }
        if let Some(entrypoint) = &self.entrypoint {
            args.push("--entrypoint".to_string());
            args.push(entrypoint.clone());
        }

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// Container settings for running a test suite.
pub fn judge_sandbox(language: Language, image: &str) -> SandboxConfig {
    let base = SandboxConfig::new(image);
    match language {
        // The JUnit image compiles in place, so its workspace stays writable.
        Language::Java => base,
        Language::Python => PYTHON_ENV
            .iter()
            .fold(base.locked_down("/tmp:rw"), |cfg, (k, v)| cfg.with_env(*k, *v)),
        Language::Cpp => base
            .locked_down("/tmp:rw")
            .with_bash(format!("{} && /tmp/test", CPP_TEST_COMPILE)),
        Language::Sql => base.locked_down("/tmp:rw"),
    }
}

/// Container settings for running a program without tests.
pub fn run_sandbox(
    language: Language,
    image: &str,
    main_class: &str,
    has_stdin: bool,
) -> SandboxConfig {
    let base = SandboxConfig::new(image);
    let stdin = if has_stdin { " < /workspace/stdin.txt" } else { "" };
    match language {
        Language::Java => base.with_bash(format!(
            "javac *.java && java {}{}",
            main_class, stdin
        )),
        Language::Python => PYTHON_ENV
            .iter()
            .fold(base.locked_down("/tmp:rw"), |cfg, (k, v)| cfg.with_env(*k, *v))
            .with_bash(format!("python main.py{}", stdin)),
        Language::Cpp => base
            .locked_down("/tmp:rw,exec")
            .with_bash(format!("{} && /tmp/a.out{}", CPP_RUN_COMPILE, stdin)),
        Language::Sql => base
            .locked_down("/tmp:rw")
            .with_env("CODEMM_SQL_MODE", "run"),
    }
}

/// A unique ephemeral directory for one invocation.
///
/// Removed on drop, so every exit path (including panics and early returns)
/// cleans up.
pub struct Workdir {
    dir: tempfile::TempDir,
}

impl Workdir {
    pub fn create(prefix: &str) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to a top-level file in the directory.
    pub fn write(&self, filename: &str, content: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(filename);
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

/// Plain top-level filename: no separators, no parent references.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(cfg: &SandboxConfig) -> String {
        cfg.docker_run_args("c1", Path::new("/tmp/x")).join(" ")
    }

    #[test]
    fn test_python_judge_args() {
        let args = joined(&judge_sandbox(Language::Python, "codem-python-judge"));
        assert!(args.starts_with("run --rm --name c1 --network none --read-only --tmpfs /tmp:rw"));
        assert!(args.contains("-e PYTHONHASHSEED=0"));
        assert!(args.contains("-e PYTEST_DISABLE_PLUGIN_AUTOLOAD=1"));
        assert!(args.contains("-v /tmp/x:/workspace:ro --workdir /workspace"));
        assert!(args.ends_with("codem-python-judge"));
    }

    #[test]
    fn test_cpp_judge_args() {
        let args = judge_sandbox(Language::Cpp, "codem-cpp-judge")
            .docker_run_args("c1", Path::new("/tmp/x"));
        let image_pos = args.iter().position(|a| a == "codem-cpp-judge").unwrap();
        assert_eq!(args[image_pos - 1], "/bin/bash");
        assert_eq!(args[image_pos + 1], "-lc");
        assert!(args[image_pos + 2].ends_with("/workspace/test.cpp && /tmp/test"));
    }

    #[test]
    fn test_java_judge_args() {
        let args = joined(&judge_sandbox(Language::Java, "codem-java-judge"));
        assert_eq!(
            args,
            "run --rm --name c1 --network none -v /tmp/x:/workspace codem-java-judge"
        );
    }

    #[test]
    fn test_run_args() {
        let java = joined(&run_sandbox(Language::Java, "codem-java-judge", "Main", false));
        assert!(java.ends_with("-lc javac *.java && java Main"));

        let cpp = run_sandbox(Language::Cpp, "codem-cpp-judge", "", true);
        assert_eq!(cpp.tmpfs.as_deref(), Some("/tmp:rw,exec"));
        assert!(cpp.command[1].ends_with("/tmp/a.out < /workspace/stdin.txt"));

        let sql = run_sandbox(Language::Sql, "codem-sql-judge", "", false);
        assert!(sql.env_vars.contains(&("CODEMM_SQL_MODE".to_string(), "run".to_string())));
        assert!(sql.entrypoint.is_none());
    }

    #[test]
    fn test_workdir_is_removed_on_drop() {
        let path = {
            let wd = Workdir::create("codem-test-").unwrap();
            wd.write("a.txt", "hi").unwrap();
            assert!(wd.path().join("a.txt").exists());
            wd.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_safe_filenames() {
        assert!(is_safe_filename("Main.java"));
        assert!(!is_safe_filename("../etc/passwd"));
        assert!(!is_safe_filename("a/b.py"));
        assert!(!is_safe_filename(".."));
        assert!(!is_safe_filename(""));
    }
}
