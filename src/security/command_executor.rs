//! SafeCommandExecutor: Type-safe command execution with injection prevention
//!
//! # Security Features
//!
//! - **Whitelist-based validation**: Only pre-approved commands can execute
//! - **Injection prevention**: Uses `tokio::process::Command` which prevents shell injection
//! - **Argument sanitization**: Arguments passed as a slice, never interpolated into shell strings
//! - **Scoped working directory**: Validated per call, the process cwd is never changed
//! - **Timeout control**: Commands exceeding the limit are killed
//!
//! # Example
//!
//! ```rust,no_run
//! use release_dispatcher::security::SafeCommandExecutor;
//! use std::path::Path;
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), release_dispatcher::security::CommandError> {
//! let mut executor = SafeCommandExecutor::new();
//! executor.set_timeout(Duration::from_secs(30));
//!
//! let output = executor.execute(Path::new("."), "python", &["--version"]).await?;
//! println!("{}", String::from_utf8_lossy(&output.stdout));
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Allowed commands whitelist for security.
///
/// Only the build and upload tooling can be executed through
/// SafeCommandExecutor. This prevents arbitrary command execution.
const ALLOWED_COMMANDS: &[&str] = &["python", "python3", "twine"];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed whitelist
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not accessible
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command execution failed (e.g., binary not found, permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// Command exceeded the timeout duration
    #[error("Command timeout after {0:?}")]
    Timeout(Duration),
}

/// Safe command executor with security controls
///
/// The working directory is supplied per call so one executor can serve
/// every sub-project in a run without mutating shared state.
#[derive(Debug, Default)]
pub struct SafeCommandExecutor {
    /// Optional timeout for command execution
    timeout: Option<Duration>,
}

impl SafeCommandExecutor {
    /// Create a new SafeCommandExecutor without a timeout
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Create a new SafeCommandExecutor with the given timeout
    pub fn with_timeout(limit: Duration) -> Self {
        Self {
            timeout: Some(limit),
        }
    }

    /// Set command execution timeout.
    ///
    /// Commands exceeding this duration are killed and reported as
    /// `CommandError::Timeout`.
    pub fn set_timeout(&mut self, limit: Duration) {
        self.timeout = Some(limit);
    }

    /// Execute a command with whitelist validation and argument sanitization.
    ///
    /// # Arguments
    ///
    /// * `working_dir` - Directory to run the command in (must exist)
    /// * `command` - The command to execute (must be in the whitelist)
    /// * `args` - Command arguments (safely passed without shell interpretation)
    ///
    /// # Errors
    ///
    /// - `CommandError::CommandNotAllowed` - Command not in whitelist
    /// - `CommandError::InvalidWorkingDirectory` - Directory missing
    /// - `CommandError::ExecutionFailed` - Binary not found or execution error
    /// - `CommandError::Timeout` - Command exceeded the configured timeout
    pub async fn execute(
        &self,
        working_dir: &Path,
        command: &str,
        args: &[&str],
    ) -> Result<Output, CommandError> {
        self.execute_with_env(working_dir, command, args, &[]).await
    }

    /// Execute a command with additional environment variables.
    ///
    /// Credential values are injected this way so they never appear in the
    /// argument list (visible in process listings) or in any output.
    pub async fn execute_with_env(
        &self,
        working_dir: &Path,
        command: &str,
        args: &[&str],
        envs: &[(&str, &str)],
    ) -> Result<Output, CommandError> {
        // Whitelist validation: Only pre-approved commands
        if !ALLOWED_COMMANDS.contains(&command) {
            return Err(CommandError::CommandNotAllowed(command.to_string()));
        }

        if !working_dir.exists() {
            return Err(CommandError::InvalidWorkingDirectory(
                working_dir.to_path_buf(),
            ));
        }

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in envs {
            cmd.env(key, value);
        }

        // kill_on_drop terminates the child when the timeout drops the future
        let result = match self.timeout {
            Some(limit) => match timeout(limit, cmd.output()).await {
                Ok(result) => result,
                Err(_) => return Err(CommandError::Timeout(limit)),
            },
            None => cmd.output().await,
        };

        result.map_err(|e| CommandError::ExecutionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir()
    }

    // Guard for environments without a Python interpreter
    async fn python_available() -> bool {
        Command::new("python3")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok()
    }

    #[tokio::test]
    async fn test_rejected_command_rm() {
        let executor = SafeCommandExecutor::new();
        let result = executor.execute(&temp_dir(), "rm", &["-rf", "/"]).await;
        assert!(
            matches!(result, Err(CommandError::CommandNotAllowed(_))),
            "rm should be rejected as not in whitelist"
        );
    }

    #[tokio::test]
    async fn test_rejected_command_shell() {
        let executor = SafeCommandExecutor::new();
        let result = executor.execute(&temp_dir(), "sh", &["-c", "true"]).await;
        assert!(
            matches!(result, Err(CommandError::CommandNotAllowed(_))),
            "shells should be rejected for security"
        );
    }

    #[tokio::test]
    async fn test_invalid_working_directory() {
        let executor = SafeCommandExecutor::new();
        let missing = Path::new("/nonexistent/directory/that/does/not/exist");
        let result = executor.execute(missing, "python3", &["--version"]).await;
        assert!(
            matches!(result, Err(CommandError::InvalidWorkingDirectory(_))),
            "Should reject non-existent working directory"
        );
    }

    #[tokio::test]
    async fn test_output_capture() {
        if !python_available().await {
            return;
        }

        let executor = SafeCommandExecutor::new();
        let output = executor
            .execute(&temp_dir(), "python3", &["-c", "print('ok')"])
            .await
            .unwrap();

        assert_eq!(output.status.code(), Some(0));
        assert!(String::from_utf8_lossy(&output.stdout).contains("ok"));
    }

    #[tokio::test]
    async fn test_timeout_kills_long_running_command() {
        if !python_available().await {
            return;
        }

        let executor = SafeCommandExecutor::with_timeout(Duration::from_millis(200));
        let result = executor
            .execute(
                &temp_dir(),
                "python3",
                &["-c", "import time; time.sleep(10)"],
            )
            .await;

        assert!(
            matches!(result, Err(CommandError::Timeout(_))),
            "Long-running command should be killed, got {:?}",
            result.map(|o| o.status)
        );
    }

    #[tokio::test]
    async fn test_env_injection() {
        if !python_available().await {
            return;
        }

        let executor = SafeCommandExecutor::new();
        let output = executor
            .execute_with_env(
                &temp_dir(),
                "python3",
                &["-c", "import os; print(os.environ['DISPATCH_TEST_VAR'])"],
                &[("DISPATCH_TEST_VAR", "value-123")],
            )
            .await
            .unwrap();

        assert!(String::from_utf8_lossy(&output.stdout).contains("value-123"));
    }

    #[tokio::test]
    async fn test_injection_attempt_via_arguments() {
        if !python_available().await {
            return;
        }

        let executor = SafeCommandExecutor::new();
        // Semicolons in arguments reach the interpreter verbatim, no shell expansion
        let output = executor
            .execute(&temp_dir(), "python3", &["-c", "print('a; rm -rf /')"])
            .await
            .unwrap();

        assert!(String::from_utf8_lossy(&output.stdout).contains("a; rm -rf /"));
    }
}
