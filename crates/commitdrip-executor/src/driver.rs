//! Subprocess driver for git.
//!
//! Every invocation runs in a given working directory, is bounded by a fixed
//! timeout and yields a tagged result. The driver never retries; retry policy
//! belongs to the callers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// Stdout with surrounding whitespace removed.
    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Both streams, stderr first, for diagnostics. Git reports push progress on stderr.
    pub fn combined(&self) -> String {
        join_streams(&self.stderr, &self.stdout)
    }
}

/// Why an invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The process ran and exited unsuccessfully.
    Exited { code: Option<i32> },
    /// The process was killed after exceeding the driver timeout.
    TimedOut { after: Duration },
    /// The process could not be started.
    Spawn,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Exited { code: Some(code) } => write!(f, "exited with status {}", code),
            FailureReason::Exited { code: None } => f.write_str("terminated by signal"),
            FailureReason::TimedOut { after } => write!(f, "timed out after {}s", after.as_secs()),
            FailureReason::Spawn => f.write_str("could not be started"),
        }
    }
}

/// A failed invocation with the tool's own error text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("git {command} {reason}: {output}")]
pub struct GitFailure {
    /// Subcommand and arguments, secrets redacted.
    pub command: String,
    pub reason: FailureReason,
    /// Raw tool output, secrets redacted.
    pub output: String,
}

impl GitFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self.reason, FailureReason::TimedOut { .. })
    }
}

pub type GitResult = Result<GitOutput, GitFailure>;

/// Runs git subcommands.
#[derive(Debug, Clone)]
pub struct GitDriver {
    program: PathBuf,
    timeout: Duration,
    secrets: Vec<String>,
}

impl Default for GitDriver {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl GitDriver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("git"),
            timeout,
            secrets: Vec::new(),
        }
    }

    /// Use a specific git binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Register a value that must never appear in logged or returned output.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replace every registered secret in `text` with `[REDACTED]`.
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret, "[REDACTED]"))
    }

    /// Run `git <args>` inside `cwd`.
    pub async fn run(&self, cwd: &Path, args: &[&str]) -> GitResult {
        let command = self.redact(&args.join(" "));
        debug!(cwd = %cwd.display(), command = %command, "Running git");

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(GitFailure {
                    command,
                    reason: FailureReason::TimedOut {
                        after: self.timeout,
                    },
                    output: "Command timed out".to_string(),
                });
            }
            Ok(Err(e)) => {
                return Err(GitFailure {
                    command,
                    reason: FailureReason::Spawn,
                    output: e.to_string(),
                });
            }
            Ok(Ok(output)) => output,
        };

        let stdout = self.redact(&String::from_utf8_lossy(&output.stdout));
        let stderr = self.redact(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(GitOutput { stdout, stderr })
        } else {
            // `git commit` with nothing staged explains itself on stdout.
            let text = if stderr.trim().is_empty() {
                stdout
            } else {
                stderr
            };
            Err(GitFailure {
                command,
                reason: FailureReason::Exited {
                    code: output.status.code(),
                },
                output: text.trim().to_string(),
            })
        }
    }
}

fn join_streams(first: &str, second: &str) -> String {
    match (first.trim(), second.trim()) {
        ("", s) => s.to_string(),
        (f, "") => f.to_string(),
        (f, s) => format!("{}\n{}", f, s),
    }
}
