//! Execution - running resolved actions as local or remote processes
//!
//! The catalogue never runs anything itself. It hands an [`Action`] to a
//! [`Runner`], which reports what the process printed and how it exited.
//! A process that ran and exited non-zero is an `Ok(CommandOutput)`; a process
//! that could not be started (or a host that could not be reached) is an error.

mod local;
mod remote;

use std::time::Duration;

use serde::Serialize;

use crate::error::{RegulatorError, Result};
use crate::operation::Action;

pub use remote::{remote_invocation, shell_quote};

/// Captured output of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status; -1 when the process was killed by a signal
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into `RegulatorError::CommandFailed`
    pub fn into_success(self, command: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(RegulatorError::CommandFailed {
                command: command.to_string(),
                exit_code: self.exit_code,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

/// Where remote commands are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// The execution collaborator consulted by the engine
#[async_trait::async_trait]
pub trait Runner: Send + Sync {
    /// Run `action` (args already computed) on this machine
    async fn run_local(&self, action: &Action) -> Result<CommandOutput>;

    /// Run a shell command line on `target`, feeding `stdin` to it
    async fn run_remote(
        &self,
        command: &str,
        stdin: Option<&str>,
        target: &RemoteTarget,
    ) -> Result<CommandOutput>;
}

/// Runs commands as child processes, `ssh` for remote targets
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
    ssh_binary: String,
}

impl ProcessRunner {
    pub fn new(timeout: Duration, ssh_binary: impl Into<String>) -> Self {
        Self {
            timeout,
            ssh_binary: ssh_binary.into(),
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(300), "ssh")
    }
}

#[async_trait::async_trait]
impl Runner for ProcessRunner {
    async fn run_local(&self, action: &Action) -> Result<CommandOutput> {
        local::run_action(action, self.timeout).await
    }

    async fn run_remote(
        &self,
        command: &str,
        stdin: Option<&str>,
        target: &RemoteTarget,
    ) -> Result<CommandOutput> {
        remote::run_ssh_command(&self.ssh_binary, command, stdin, target, self.timeout).await
    }
}

/// Normalize line endings in captured output and drop trailing newlines
pub fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .trim_end_matches('\n')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("ok\r\n"), "ok");
        assert_eq!(normalize_newlines("a\rb\r\nc\n\n"), "a\nb\nc");
        assert_eq!(normalize_newlines(""), "");
    }

    #[test]
    fn test_into_success() {
        let ok = CommandOutput {
            exit_code: 0,
            ..Default::default()
        };
        assert!(ok.into_success("true").is_ok());

        let failed = CommandOutput {
            stdout: String::new(),
            stderr: "boom".into(),
            exit_code: 2,
        };
        let err = failed.into_success("false").unwrap_err();
        assert_eq!(err.exit_code(), Some(2));
    }
}
