//! Subprocess execution with timeouts.
//!
//! Runs engine and helper commands via `tokio::process::Command`, capturing
//! stdout/stderr and bounding every invocation with a caller-supplied timeout.
//! Command lines may carry secrets (environment flags on `run`), so each
//! invocation accepts an optional masked variant that is substituted only in
//! log output, never in what gets executed.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Outcome of a finished subprocess: exit status plus captured output.
#[derive(Debug, Clone)]
pub struct ProcessResult {
    /// Exit status code (`-1` if terminated by a signal)
    pub status: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ProcessResult {
    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Errors from running a subprocess.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessError {
    /// The process did not finish before the timeout elapsed.
    ///
    /// The underlying OS process is left running; no forced kill is attempted.
    #[error("process timed out after {timeout:?}: {command}")]
    Timeout {
        /// Configured timeout that elapsed
        timeout: Duration,
        /// The (masked) command line, for diagnostics
        command: String,
    },

    /// The process exited with a non-zero status.
    #[error("process exited with status {}: {}", .result.status, .command)]
    Unsuccessful {
        /// Exit status and captured output
        result: ProcessResult,
        /// The (masked) command line, for diagnostics
        command: String,
    },

    /// The process could not be spawned at all.
    #[error("failed to spawn {command}: {message}")]
    Spawn {
        /// The (masked) command line
        command: String,
        /// OS error text
        message: String,
    },
}

/// Seam for subprocess execution.
///
/// The production implementation is [`HostProcessRunner`]; tests substitute a
/// scripted runner to exercise error classification without a container
/// engine installed.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `args` as a command line, bounded by `timeout`.
    ///
    /// Returns trimmed stdout on exit status zero. `masked_args`, when given,
    /// replaces `args` in log output only.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Timeout`] if the command does not finish in
    /// time (the OS process keeps running), [`ProcessError::Unsuccessful`]
    /// on a non-zero exit, or [`ProcessError::Spawn`] if it cannot start.
    async fn run(
        &self,
        args: &[String],
        timeout: Duration,
        masked_args: Option<&[String]>,
    ) -> Result<String, ProcessError>;
}

/// Executes commands directly on the host system.
#[derive(Debug, Clone, Default)]
pub struct HostProcessRunner;

impl HostProcessRunner {
    /// Create a new host process runner.
    pub fn new() -> Self {
        Self
    }
}

fn loggable(args: &[String], masked_args: Option<&[String]>) -> String {
    masked_args.unwrap_or(args).join(" ")
}

#[async_trait]
impl ProcessRunner for HostProcessRunner {
    async fn run(
        &self,
        args: &[String],
        timeout: Duration,
        masked_args: Option<&[String]>,
    ) -> Result<String, ProcessError> {
        let display_cmd = loggable(args, masked_args);
        debug!(command = %display_cmd, ?timeout, "executing command");

        let (program, rest) = args.split_first().ok_or_else(|| ProcessError::Spawn {
            command: String::new(),
            message: "empty argument vector".to_string(),
        })?;

        let start = Instant::now();
        let mut command = Command::new(program);
        command.args(rest);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ProcessError::Spawn {
                    command: display_cmd,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ProcessError::Timeout {
                    timeout,
                    command: display_cmd,
                });
            }
        };

        let result = ProcessResult {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        debug!(
            command = %display_cmd,
            status = result.status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "command finished"
        );

        if result.success() {
            Ok(result.stdout.trim().to_string())
        } else {
            Err(ProcessError::Unsuccessful {
                result,
                command: display_cmd,
            })
        }
    }
}
