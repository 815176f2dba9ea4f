//! Local process execution
//!
//! Inline scripts are written to a temp file first and passed to the
//! executable as its first argument, the same way a script path is.

use std::io::Write;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use super::{normalize_newlines, CommandOutput};
use crate::error::{RegulatorError, Result};
use crate::operation::Action;

/// Why a child process produced no output
#[derive(Debug)]
pub(super) enum ProcessFailure {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut,
}

/// Spawn `program`, optionally feed it `stdin`, and collect its output
pub(super) async fn capture(
    program: &str,
    args: &[String],
    stdin: Option<&str>,
    limit: Duration,
) -> std::result::Result<CommandOutput, ProcessFailure> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.kill_on_drop(true);
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(ProcessFailure::Spawn)?;
    let pipe = child.stdin.take();

    // Feeding stdin shares the deadline with the wait
    let feed = async move {
        match (stdin, pipe) {
            (Some(body), Some(mut pipe)) => {
                pipe.write_all(body.as_bytes()).await?;
                pipe.shutdown().await
            }
            _ => Ok(()),
        }
    };

    let run = async move { tokio::join!(feed, child.wait_with_output()) };
    let (fed, waited) = match timeout(limit, run).await {
        Ok(results) => results,
        Err(_) => return Err(ProcessFailure::TimedOut),
    };
    match fed {
        // The child exited without reading all of its input
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Err(e) => return Err(ProcessFailure::Wait(e)),
        Ok(()) => {}
    }
    let output = waited.map_err(ProcessFailure::Wait)?;

    Ok(CommandOutput {
        stdout: normalize_newlines(&String::from_utf8_lossy(&output.stdout)),
        stderr: normalize_newlines(&String::from_utf8_lossy(&output.stderr)),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

fn local_error(command: &str, failure: ProcessFailure, limit: Duration) -> RegulatorError {
    match failure {
        ProcessFailure::Spawn(e) => {
            RegulatorError::Shell(format!("Command '{}' could not be started: {}", command, e))
        }
        ProcessFailure::Wait(e) => RegulatorError::Shell(format!("Command '{}' failed: {}", command, e)),
        ProcessFailure::TimedOut => RegulatorError::Timeout(format!(
            "Command '{}' did not finish within {}s",
            command,
            limit.as_secs()
        )),
    }
}

/// Run an action on this machine
pub(super) async fn run_action(action: &Action, limit: Duration) -> Result<CommandOutput> {
    let command = action.command_line();
    let start = Instant::now();

    // Held until the process exits; dropping it removes the file
    let mut staged_script = None;
    let mut args = Vec::with_capacity(action.args.len() + 1);

    if let Some(path) = action.path.as_deref().filter(|p| !p.is_empty()) {
        args.push(path.to_string());
    } else if let Some(script) = action.script.as_deref().filter(|s| !s.is_empty()) {
        let mut file = tempfile::Builder::new()
            .prefix("regulator_script")
            .tempfile()
            .map_err(|e| RegulatorError::Shell(format!("Could not create tmp file: {}", e)))?;
        file.write_all(script.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| RegulatorError::Shell(format!("Could not write tmp file: {}", e)))?;
        args.push(file.path().to_string_lossy().into_owned());
        staged_script = Some(file);
    }
    args.extend(action.args.iter().cloned());

    debug!(exe = %action.exe, args = ?args, "Running local command");
    let result = capture(&action.exe, &args, None, limit).await;
    drop(staged_script);

    let output = result.map_err(|failure| local_error(&command, failure, limit))?;
    info!(
        command = %command,
        exit_code = output.exit_code,
        duration_ms = start.elapsed().as_millis() as u64,
        "Local command finished"
    );
    Ok(output)
}
