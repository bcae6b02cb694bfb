//! Shell command execution with an exit-code contract.

use std::fmt;
use std::path::Path;
use std::process::{Output, Stdio};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::env::{HarnessEnv, FORCED_LOCALE};
use crate::error::{CaseError, CaseResult};

/// Exit code a command is expected to finish with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpectedExit {
    #[default]
    Success,
    Warning,
    Error,
    Code(i32),
}

impl ExpectedExit {
    pub fn code(&self) -> i32 {
        match self {
            ExpectedExit::Success => 0,
            ExpectedExit::Warning => 1,
            ExpectedExit::Error => 2,
            ExpectedExit::Code(code) => *code,
        }
    }
}

impl From<i32> for ExpectedExit {
    fn from(code: i32) -> Self {
        match code {
            0 => ExpectedExit::Success,
            1 => ExpectedExit::Warning,
            2 => ExpectedExit::Error,
            other => ExpectedExit::Code(other),
        }
    }
}

impl FromStr for ExpectedExit {
    type Err = CaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ExpectedExit::Success),
            "warning" => Ok(ExpectedExit::Warning),
            "error" => Ok(ExpectedExit::Error),
            other => other
                .parse::<i32>()
                .map(ExpectedExit::from)
                .map_err(|_| CaseError::InvalidExitCode(other.to_string())),
        }
    }
}

impl fmt::Display for ExpectedExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Result of one command invocation.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Command line as actually issued (including any appended redirect).
    pub command: String,

    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Lines captured from the appended redirect, if one was appended.
    pub output: Option<Vec<String>>,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl Execution {
    /// Captured lines, empty when the command redirected its own output.
    pub fn lines(&self) -> &[String] {
        self.output.as_deref().unwrap_or(&[])
    }
}

/// Runs command lines through `sh -c` with the harness environment applied.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    env: Arc<HarnessEnv>,
}

impl ProcessRunner {
    pub fn new(env: Arc<HarnessEnv>) -> Self {
        Self { env }
    }

    /// Whether `command_line` lacks its own output redirect.
    pub fn needs_capture(command_line: &str) -> bool {
        !command_line.contains('>')
    }

    /// Execute `command_line` and enforce `expected`.
    ///
    /// When `capture_to` is given and the command does not redirect its own
    /// output, the whole command line is grouped and its stdout and stderr
    /// are redirected into that file; the lines come back in
    /// [`Execution::output`].
    pub async fn execute(
        &self,
        command_line: &str,
        expected: ExpectedExit,
        capture_to: Option<&Path>,
    ) -> CaseResult<Execution> {
        let start = Instant::now();

        let (command, capture) = match capture_to {
            Some(path) if Self::needs_capture(command_line) => (
                format!("{{ {}\n}} >{} 2>&1", command_line.trim_end(), path.display()),
                Some(path),
            ),
            _ => (command_line.to_string(), None),
        };

        if self.env.debug_commands {
            println!("COMMAND {command}");
        }

        let output = self.run_shell(&command).await?;
        let exit_code = output.status.code().unwrap_or(-1);
        if !output.stderr.is_empty() {
            debug!(command = %command, stderr = %String::from_utf8_lossy(&output.stderr), "command wrote to stderr");
        }

        if exit_code != expected.code() {
            return Err(CaseError::CommandFailed {
                command,
                expected: expected.code(),
                actual: exit_code,
            });
        }

        let output = match capture {
            Some(path) => Some(
                tokio::fs::read_to_string(path)
                    .await?
                    .lines()
                    .map(str::to_string)
                    .collect(),
            ),
            None => None,
        };

        Ok(Execution {
            command,
            exit_code,
            output,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Run `command_line` and return its standard output. The exit code is
    /// not checked; pipelines report through their output.
    pub async fn capture_stdout(&self, command_line: &str) -> CaseResult<String> {
        if self.env.debug_commands {
            println!("COMMAND {command_line}");
        }
        let output = self.run_shell(command_line).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_shell(&self, command: &str) -> CaseResult<Output> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env(HarnessEnv::locale_var(), FORCED_LOCALE)
            .env("PATH", self.env.search_path())
            .current_dir(&self.env.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = if self.env.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.env.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| CaseError::Timeout {
                command: command.to_string(),
                limit_secs: self.env.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        Ok(output)
    }
}
