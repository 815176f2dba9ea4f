//! Regulator workflow tests
//!
//! A scripted runner stands in for real processes: it records every command
//! it is handed and answers with queued outputs.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use regulator::engine::CorrectionStatus;
use regulator::exec::{CommandOutput, ProcessRunner, RemoteTarget, Runner};
use regulator::input::SpecSource;
use regulator::operation::{parse_document, Action};
use regulator::{DefaultImplements, Regulator, RegulatorError, Result, RunSettings};

const CATALOGUE: &str = r#"
observations:
  nginx:
    entity: systemd
    query: service_state
    instance: nginx
    expect: active
  motd:
    entity: file
    query: presence
    instance: /etc/motd
    expect: present
  var_disk:
    entity: host1
    query: disk_space
    instance: /var
    expect: ok
reactions:
  nginx_restart:
    observation: nginx
    action: restart_nginx
    condition:
      check: expected
      value: "false"
actions:
  restart_nginx:
    exe: sh
    script: systemctl restart "$1"
    args: [instance]
"#;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Local(Action),
    Remote {
        command: String,
        stdin: Option<String>,
        target: RemoteTarget,
    },
}

#[derive(Clone, Default)]
struct ScriptedRunner {
    calls: Arc<Mutex<Vec<Call>>>,
    outputs: Arc<Mutex<VecDeque<CommandOutput>>>,
}

impl ScriptedRunner {
    fn answering(stdouts: &[&str]) -> Self {
        let runner = Self::default();
        for stdout in stdouts {
            runner.push(CommandOutput {
                stdout: stdout.to_string(),
                ..Default::default()
            });
        }
        runner
    }

    fn push(&self, output: CommandOutput) {
        self.outputs.lock().unwrap().push_back(output);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn next_output(&self, call: Call) -> CommandOutput {
        self.calls.lock().unwrap().push(call);
        self.outputs.lock().unwrap().pop_front().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Runner for ScriptedRunner {
    async fn run_local(&self, action: &Action) -> Result<CommandOutput> {
        Ok(self.next_output(Call::Local(action.clone())))
    }

    async fn run_remote(
        &self,
        command: &str,
        stdin: Option<&str>,
        target: &RemoteTarget,
    ) -> Result<CommandOutput> {
        Ok(self.next_output(Call::Remote {
            command: command.to_string(),
            stdin: stdin.map(str::to_string),
            target: target.clone(),
        }))
    }
}

fn regulator_with(runner: &ScriptedRunner, settings: RunSettings) -> Regulator {
    let mut regulator = Regulator::new(
        DefaultImplements::builtin("sh"),
        Box::new(runner.clone()),
        settings,
    );
    regulator
        .merge(&parse_document(CATALOGUE.as_bytes()).unwrap())
        .unwrap();
    regulator
}

fn local_args(call: &Call) -> Vec<String> {
    match call {
        Call::Local(action) => action.args.clone(),
        other => panic!("expected a local call, got {:?}", other),
    }
}

// =============================================================================
// Observe
// =============================================================================

#[tokio::test]
async fn test_observe_records_result() {
    let runner = ScriptedRunner::answering(&["active\n"]);
    let mut regulator = regulator_with(&runner, RunSettings::default());

    let result = regulator.observe("nginx").await.unwrap();
    assert_eq!(result.result, "active");
    assert!(result.expected);
    assert_eq!(regulator.last_result("nginx"), Some(&result));
    assert!(regulator.last_result("motd").is_none());

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Call::Local(action) => {
            assert_eq!(action.exe, "sh");
            assert!(action.script.is_some());
            assert_eq!(action.args, vec!["observe", "nginx"]);
        }
        other => panic!("expected a local call, got {:?}", other),
    }
}

#[tokio::test]
async fn test_observe_keeps_stderr_as_logs() {
    let runner = ScriptedRunner::default();
    runner.push(CommandOutput {
        stdout: "absent".into(),
        stderr: "stat: cannot stat '/etc/motd'".into(),
        exit_code: 0,
    });
    let mut regulator = regulator_with(&runner, RunSettings::default());

    let result = regulator.observe("motd").await.unwrap();
    assert!(!result.expected);
    assert!(result.logs.contains("cannot stat"));
}

#[tokio::test]
async fn test_observe_failures() {
    let runner = ScriptedRunner::default();
    runner.push(CommandOutput {
        stdout: String::new(),
        stderr: "unknown mode".into(),
        exit_code: 2,
    });
    let mut regulator = regulator_with(&runner, RunSettings::default());

    let err = regulator.observe("nginx").await.unwrap_err();
    assert!(matches!(err, RegulatorError::CommandFailed { exit_code: 2, .. }));

    let err = regulator.observe("missing").await.unwrap_err();
    assert!(matches!(err, RegulatorError::NotFound(_)));

    // No implement observes host1/disk_space
    let err = regulator.observe("var_disk").await.unwrap_err();
    match err {
        RegulatorError::NotFound(msg) => assert!(msg.contains("disk_space"), "{}", msg),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

// =============================================================================
// React
// =============================================================================

#[tokio::test]
async fn test_react_runs_action_when_condition_holds() {
    let runner = ScriptedRunner::answering(&["inactive", "restarted"]);
    let mut regulator = regulator_with(&runner, RunSettings::default());

    let outcome = regulator.react("nginx_restart").await.unwrap();
    assert!(outcome.fired);
    assert_eq!(outcome.result.result, "inactive");
    let report = outcome.action.unwrap();
    assert_eq!(report.name, "restart_nginx");
    assert!(report.executed);
    assert_eq!(report.output.unwrap().stdout, "restarted");

    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    match &calls[1] {
        Call::Local(action) => {
            assert_eq!(action.script.as_deref(), Some("systemctl restart \"$1\""));
            assert_eq!(action.args, vec!["nginx"]);
        }
        other => panic!("expected a local call, got {:?}", other),
    }
}

#[tokio::test]
async fn test_react_skips_action_when_condition_fails() {
    let runner = ScriptedRunner::answering(&["active"]);
    let mut regulator = regulator_with(&runner, RunSettings::default());

    let outcome = regulator.react("nginx_restart").await.unwrap();
    assert!(!outcome.fired);
    assert!(outcome.action.is_none());
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_react_unknown_reaction() {
    let runner = ScriptedRunner::default();
    let mut regulator = regulator_with(&runner, RunSettings::default());
    let err = regulator.react("nope").await.unwrap_err();
    assert!(matches!(err, RegulatorError::NotFound(_)));
    assert!(runner.calls().is_empty());
}

// =============================================================================
// Correct & act
// =============================================================================

#[tokio::test]
async fn test_correct_already_expected() {
    let runner = ScriptedRunner::answering(&["present"]);
    let mut regulator = regulator_with(&runner, RunSettings::default());

    let outcome = regulator.correct("motd").await.unwrap();
    assert!(matches!(outcome.status, CorrectionStatus::AlreadyExpected));
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_correct_runs_covering_implement() {
    let runner = ScriptedRunner::answering(&["failed"]);
    let mut regulator = regulator_with(&runner, RunSettings::default());

    let outcome = regulator.correct("nginx").await.unwrap();
    match outcome.status {
        CorrectionStatus::Corrected { action } => {
            assert_eq!(action.name, "systemd_service");
            assert!(action.executed);
        }
        other => panic!("expected a correction, got {:?}", other),
    }
    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(local_args(&calls[1]), vec!["react", "nginx"]);
}

#[tokio::test]
async fn test_correct_without_covering_implement() {
    let runner = ScriptedRunner::answering(&["activating"]);
    let mut regulator = regulator_with(&runner, RunSettings::default());

    let outcome = regulator.correct("nginx").await.unwrap();
    assert!(matches!(outcome.status, CorrectionStatus::NoCorrection));
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_dry_run_resolves_without_running() {
    let runner = ScriptedRunner::answering(&["absent"]);
    let settings = RunSettings {
        dry_run: true,
        ..Default::default()
    };
    let mut regulator = regulator_with(&runner, settings);

    let outcome = regulator.correct("motd").await.unwrap();
    match outcome.status {
        CorrectionStatus::Corrected { action } => {
            assert!(!action.executed);
            assert!(action.output.is_none());
            assert_eq!(action.command, "sh <script> react /etc/motd");
        }
        other => panic!("expected a correction, got {:?}", other),
    }
    // Only the observation ran
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_act_fills_instance_from_observation() {
    let runner = ScriptedRunner::default();
    let mut regulator = regulator_with(&runner, RunSettings::default());

    let report = regulator.act("file_presence", Some("motd")).await.unwrap();
    assert!(report.executed);
    let report = regulator.act("file_presence", None).await.unwrap();
    assert_eq!(report.command, "sh <script> react instance");

    let calls = runner.calls();
    assert_eq!(local_args(&calls[0]), vec!["react", "/etc/motd"]);
    assert_eq!(local_args(&calls[1]), vec!["react", "instance"]);

    assert!(matches!(
        regulator.act("nope", None).await,
        Err(RegulatorError::NotFound(_))
    ));
    assert!(matches!(
        regulator.act("file_presence", Some("nope")).await,
        Err(RegulatorError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_remote_settings_route_through_ssh_invocation() {
    let runner = ScriptedRunner::answering(&["active"]);
    let target = RemoteTarget {
        user: "ops".into(),
        host: "web1".into(),
        port: 2222,
    };
    let settings = RunSettings {
        remote: Some(target.clone()),
        dry_run: false,
    };
    let mut regulator = regulator_with(&runner, settings);

    regulator.observe("nginx").await.unwrap();
    match &runner.calls()[0] {
        Call::Remote {
            command,
            stdin,
            target: sent_to,
        } => {
            assert_eq!(command, "sh /dev/stdin observe nginx");
            assert!(stdin.as_deref().is_some_and(|s| s.contains("systemctl")));
            assert_eq!(sent_to, &target);
        }
        other => panic!("expected a remote call, got {:?}", other),
    }
}

// =============================================================================
// Built-in implements on real processes
// =============================================================================

/// Write an executable shell script into `dir`
#[cfg(unix)]
fn executable(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
#[tokio::test]
async fn test_builtin_service_correction_with_inactive_unit() {
    let dir = tempfile::TempDir::new().unwrap();
    // `is-active` reports a stopped unit with exit status 3
    executable(
        dir.path(),
        "systemctl",
        "#!/bin/sh\ncase \"$1\" in\n  is-active) echo inactive; exit 3 ;;\n  restart) echo \"restarted $2\" ;;\nesac\n",
    );
    // Interpreter for the built-ins that finds the fake systemctl first
    let shell = executable(
        dir.path(),
        "fake-sh",
        &format!("#!/bin/sh\nPATH='{}':\"$PATH\" exec sh \"$@\"\n", dir.path().display()),
    );

    let mut regulator = Regulator::new(
        DefaultImplements::builtin(&shell.to_string_lossy()),
        Box::new(ProcessRunner::default()),
        RunSettings::default(),
    );
    regulator
        .merge(&parse_document(CATALOGUE.as_bytes()).unwrap())
        .unwrap();

    let outcome = regulator.correct("nginx").await.unwrap();
    assert_eq!(outcome.result.result, "inactive");
    assert!(!outcome.result.expected);
    match outcome.status {
        CorrectionStatus::Corrected { action } => {
            assert_eq!(action.name, "systemd_service");
            assert_eq!(action.output.unwrap().stdout, "restarted nginx");
        }
        other => panic!("expected a correction, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failing_observation_is_command_failure() {
    let runner = ScriptedRunner::default();
    runner.push(CommandOutput {
        stdout: "inactive".into(),
        stderr: String::new(),
        exit_code: 3,
    });
    let mut regulator = regulator_with(&runner, RunSettings::default());
    assert!(matches!(
        regulator.correct("nginx").await,
        Err(RegulatorError::CommandFailed { exit_code: 3, .. })
    ));
}

// =============================================================================
// Loading
// =============================================================================

fn document(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_merges_sources_in_order() {
    let first = document(CATALOGUE);
    let second = document(
        "observations:\n  sshd:\n    entity: systemd\n    query: service_state\n    instance: sshd\n    expect: active\n",
    );
    let mut regulator = Regulator::new(
        DefaultImplements::builtin("sh"),
        Box::new(ScriptedRunner::default()),
        RunSettings::default(),
    );

    regulator
        .load(&[
            SpecSource::File(first.path().to_path_buf()),
            SpecSource::File(second.path().to_path_buf()),
        ])
        .unwrap();
    assert_eq!(regulator.operations().observations.len(), 4);
    assert_eq!(regulator.operations().implements.len(), 2);
}

#[test]
fn test_load_conflict_names_source_and_keeps_catalogue() {
    let first = document(CATALOGUE);
    let clash = document(
        "observations:\n  web:\n    entity: systemd\n    query: service_state\n    instance: nginx\n    expect: inactive\n  extra:\n    entity: a\n    query: b\n    instance: c\n",
    );
    let mut regulator = Regulator::new(
        DefaultImplements::builtin("sh"),
        Box::new(ScriptedRunner::default()),
        RunSettings::default(),
    );
    regulator
        .load(&[SpecSource::File(first.path().to_path_buf())])
        .unwrap();
    let before = regulator.operations().clone();

    let err = regulator
        .load(&[SpecSource::File(clash.path().to_path_buf())])
        .unwrap_err();
    match err {
        RegulatorError::InvalidInput(msg) => {
            assert!(msg.contains("conflicts with observation 'nginx'"), "{}", msg);
            assert!(msg.contains(&clash.path().display().to_string()), "{}", msg);
        }
        other => panic!("expected InvalidInput, got {:?}", other),
    }
    assert_eq!(regulator.operations(), &before);
}
