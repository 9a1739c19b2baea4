// Subprocess execution for devboot: interpreter probes, build scripts and
// virtual environment creation, with timeout handling and output capture

use crate::error::{DevbootError, ProcessError, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use tracing::debug;

/// Process execution configuration
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    pub command: String,
    pub args: Vec<OsString>,
    pub environment: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl ProcessConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            environment: BTreeMap::new(),
            timeout: None,
        }
    }

    /// Command given as a path, e.g. an interpreter inside an installation
    pub fn for_program(program: &Path) -> Self {
        Self::new(program.to_string_lossy().into_owned())
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_environment(mut self, env: BTreeMap<String, String>) -> Self {
        self.environment = env;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Command line as shown in logs and errors
    pub fn display_command(&self) -> String {
        let mut rendered = self.command.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&arg.to_string_lossy());
        }
        rendered
    }
}

/// Process execution result
#[derive(Debug)]
pub struct ProcessResult {
    pub exit_status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_status.success()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_status.code()
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Runs subprocesses on the tokio runtime
#[derive(Debug, Clone)]
pub struct ProcessManager {
    default_timeout: Duration,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
        }
    }

    pub async fn execute_async(&self, config: ProcessConfig) -> Result<ProcessResult> {
        use std::process::Stdio;
        use tokio::io::AsyncReadExt;
        use tokio::process::Command;
        use tokio::time::timeout;

        let start_time = std::time::Instant::now();
        debug!(command = %config.display_command(), "Spawning process");

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);

        for (key, value) in &config.environment {
            cmd.env(key, value);
        }

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            let error = if e.kind() == std::io::ErrorKind::NotFound {
                ProcessError::CommandNotFound {
                    command: config.command.clone(),
                    suggestion: None,
                }
            } else {
                ProcessError::SpawnFailed {
                    command: config.command.clone(),
                    error: e.to_string(),
                }
            };
            DevbootError::Process(Box::new(error))
        })?;

        let timeout_duration = config.timeout.unwrap_or(self.default_timeout);

        let execution_result = timeout(timeout_duration, async {
            let mut stdout_data = Vec::new();
            let mut stderr_data = Vec::new();

            // Drain both pipes together so a chatty stderr cannot block stdout.
            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            let (stdout_read, stderr_read) = tokio::join!(
                async {
                    match stdout {
                        Some(mut pipe) => pipe.read_to_end(&mut stdout_data).await.map(|_| ()),
                        None => Ok(()),
                    }
                },
                async {
                    match stderr {
                        Some(mut pipe) => pipe.read_to_end(&mut stderr_data).await.map(|_| ()),
                        None => Ok(()),
                    }
                }
            );
            stdout_read.and(stderr_read).map_err(|e| {
                DevbootError::Process(Box::new(ProcessError::OutputCaptureFailed {
                    message: format!("Failed to read output: {e}"),
                    command: config.command.clone(),
                }))
            })?;

            let exit_status = child.wait().await.map_err(|e| {
                DevbootError::Process(Box::new(ProcessError::ExecutionFailed {
                    command: config.command.clone(),
                    exit_code: None,
                    stderr: format!("Failed to wait for process: {e}"),
                }))
            })?;

            Ok::<ProcessResult, DevbootError>(ProcessResult {
                exit_status,
                stdout: stdout_data,
                stderr: stderr_data,
                duration: start_time.elapsed(),
            })
        })
        .await;

        match execution_result {
            Ok(result) => result,
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;

                Err(DevbootError::Process(Box::new(ProcessError::Timeout {
                    command: config.display_command(),
                    duration: timeout_duration,
                })))
            }
        }
    }

    /// Execute and turn a non-zero exit into `ProcessError::ExecutionFailed`
    pub async fn execute_checked(&self, config: ProcessConfig) -> Result<ProcessResult> {
        let command = config.display_command();
        let result = self.execute_async(config).await?;
        if !result.success() {
            return Err(DevbootError::Process(Box::new(
                ProcessError::ExecutionFailed {
                    command,
                    exit_code: result.exit_code(),
                    stderr: result.stderr(),
                },
            )));
        }
        Ok(result)
    }
}

/// Locate a program on PATH
pub fn find_program(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| {
        DevbootError::Process(Box::new(ProcessError::CommandNotFound {
            command: name.to_string(),
            suggestion: Some(format!("Install {name} or add it to PATH")),
        }))
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_execute_captures_output() {
        let manager = ProcessManager::new();
        let config = ProcessConfig::new("sh").with_args(["-c", "echo out; echo err >&2"]);
        let result = manager.execute_async(config).await.unwrap();

        assert!(result.success());
        assert_eq!(result.stdout().trim(), "out");
        assert_eq!(result.stderr().trim(), "err");
    }

    #[tokio::test]
    async fn test_environment_is_passed() {
        let manager = ProcessManager::new();
        let config = ProcessConfig::new("sh")
            .with_args(["-c", "printf %s \"$DEVBOOT_PROBE\""])
            .with_env("DEVBOOT_PROBE", "value");
        let result = manager.execute_async(config).await.unwrap();
        assert_eq!(result.stdout(), "value");
    }

    #[tokio::test]
    async fn test_checked_execution_reports_failure() {
        let manager = ProcessManager::new();
        let config = ProcessConfig::new("sh").with_args(["-c", "echo broken >&2; exit 3"]);
        let error = manager.execute_checked(config).await.unwrap_err();

        match error {
            DevbootError::Process(process_error) => match *process_error {
                ProcessError::ExecutionFailed {
                    exit_code, stderr, ..
                } => {
                    assert_eq!(exit_code, Some(3));
                    assert!(stderr.contains("broken"));
                }
                other => panic!("unexpected process error: {other:?}"),
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let manager = ProcessManager::new();
        let config = ProcessConfig::new("sleep")
            .with_args(["5"])
            .with_timeout(Duration::from_millis(100));
        let error = manager.execute_async(config).await.unwrap_err();
        assert!(error.to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn test_missing_command() {
        let manager = ProcessManager::new();
        let config = ProcessConfig::new("devboot-no-such-binary");
        let error = manager.execute_async(config).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::General);
        assert!(error.to_string().contains("Command not found"));
    }

    #[test]
    fn test_display_command() {
        let config = ProcessConfig::new("python-build").with_args(["3.10.9", "/opt/py"]);
        assert_eq!(config.display_command(), "python-build 3.10.9 /opt/py");
    }
}
