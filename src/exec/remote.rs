//! Remote execution over the system `ssh` client
//!
//! Authentication is left to ssh itself (agent, keys, config). Batch mode is
//! forced so a missing key fails instead of prompting.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::local::{capture, ProcessFailure};
use super::{CommandOutput, RemoteTarget};
use crate::error::{RegulatorError, Result};
use crate::operation::Action;

/// Exit status ssh uses for its own failures
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Quote a word for a POSIX shell
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Command line and stdin body that run `action` on a remote shell.
///
/// Inline scripts travel on stdin and are read back through `/dev/stdin`.
pub fn remote_invocation(action: &Action) -> (String, Option<String>) {
    let mut words = vec![action.exe.clone()];
    let mut stdin = None;
    if let Some(path) = action.path.as_deref().filter(|p| !p.is_empty()) {
        words.push(path.to_string());
    } else if let Some(script) = action.script.as_deref().filter(|s| !s.is_empty()) {
        words.push("/dev/stdin".to_string());
        stdin = Some(script.to_string());
    }
    words.extend(action.args.iter().cloned());

    let command = words
        .iter()
        .map(|w| shell_quote(w))
        .collect::<Vec<_>>()
        .join(" ");
    (command, stdin)
}

fn ssh_args(command: &str, target: &RemoteTarget) -> Vec<String> {
    vec![
        "-p".to_string(),
        target.port.to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        format!("{}@{}", target.user, target.host),
        "--".to_string(),
        command.to_string(),
    ]
}

pub(super) async fn run_ssh_command(
    ssh_binary: &str,
    command: &str,
    stdin: Option<&str>,
    target: &RemoteTarget,
    limit: Duration,
) -> Result<CommandOutput> {
    let start = Instant::now();
    debug!(remote = %target, command, "Running remote command");

    let output = capture(ssh_binary, &ssh_args(command, target), stdin, limit)
        .await
        .map_err(|failure| match failure {
            ProcessFailure::Spawn(e) => RegulatorError::RemoteExec(format!(
                "Failed to start '{}' for {}: {}",
                ssh_binary, target, e
            )),
            ProcessFailure::Wait(e) => RegulatorError::RemoteExec(format!(
                "Failed to run remote command \"{}\" on {}: {}",
                command, target, e
            )),
            ProcessFailure::TimedOut => RegulatorError::Timeout(format!(
                "Remote command \"{}\" on {} did not finish within {}s",
                command,
                target,
                limit.as_secs()
            )),
        })?;

    if output.exit_code == SSH_TRANSPORT_FAILURE {
        return Err(RegulatorError::RemoteExec(format!(
            "Failed to open ssh connection to {}:\n{}",
            target, output.stderr
        )));
    }

    info!(
        remote = %target,
        command,
        exit_code = output.exit_code,
        duration_ms = start.elapsed().as_millis() as u64,
        "Remote command finished"
    );
    Ok(output)
}
