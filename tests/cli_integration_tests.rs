//! End-to-end CLI integration tests
//!
//! These tests use assert_cmd to drive the pipeline-gate binary against a
//! throwaway state root, the way a host would invoke it around each action.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use assert_cmd::Command;
use tempfile::TempDir;

/// Isolated home, working directory and state root for one test
pub struct CliTestEnvironment {
    pub temp_dir: TempDir,
}

impl CliTestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        fs::create_dir_all(temp_dir.path().join("state")).unwrap();
        fs::create_dir_all(temp_dir.path().join("work")).unwrap();
        Self { temp_dir }
    }

    pub fn cmd(&self) -> Command {
        Command::from_std(self.std_cmd())
    }

    pub fn std_cmd(&self) -> std::process::Command {
        let mut cmd = std::process::Command::cargo_bin("pipeline-gate").unwrap();
        cmd.current_dir(self.temp_dir.path().join("work"))
            .env("HOME", self.temp_dir.path())
            .env("PIPELINE_GATE_ROOT", self.temp_dir.path().join("state"))
            .env_remove("PIPELINE_GATE_NAMESPACE")
            .env_remove("PIPELINE_GATE_CONFIG")
            .env_remove("PIPELINE_GATE_DEBUG")
            .env_remove("RUST_LOG");
        cmd
    }

    fn json_stdout(output: &std::process::Output) -> Value {
        serde_json::from_slice(&output.stdout).expect("stdout is JSON")
    }
}

#[test]
fn test_help_lists_host_commands() {
    let env = CliTestEnvironment::new();
    env.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("advance"))
        .stdout(predicate::str::contains("reset"));
}

#[test]
fn test_check_approves_with_exit_zero() {
    let env = CliTestEnvironment::new();
    let output = env
        .cmd()
        .arg("check")
        .write_stdin(r#"{"actionId":"start-gathering","namespace":"cli"}"#)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let response = CliTestEnvironment::json_stdout(&output);
    assert_eq!(response["approve"], true);
    assert_eq!(response["stage"], "GATHERING");
    assert!(response["token"].is_string());
}

#[test]
fn test_check_blocks_with_exit_two() {
    let env = CliTestEnvironment::new();
    env.cmd()
        .args(["check", "--action", "start-gathering", "--namespace", "cli"])
        .assert()
        .code(0);

    let output = env
        .cmd()
        .args(["check", "--action", "start-execution", "--namespace", "cli"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let response = CliTestEnvironment::json_stdout(&output);
    assert_eq!(response["approve"], false);
    assert!(response["reason"].as_str().unwrap().contains("start-refining"));
}

#[test]
fn test_garbage_request_fails_open() {
    let env = CliTestEnvironment::new();
    let output = env.cmd().arg("check").write_stdin("not json at all").output().unwrap();

    assert_eq!(output.status.code(), Some(0));
    let response = CliTestEnvironment::json_stdout(&output);
    assert_eq!(response["approve"], true);
    assert!(response["warning"].is_string());
}

#[test]
fn test_classify_then_status_shows_mode() {
    let env = CliTestEnvironment::new();
    env.cmd()
        .arg("advance")
        .write_stdin(r#"{"actionId":"classify","namespace":"cli","resultPayload":{"mode":"TRIVIAL"}}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"recorded\""));

    let output = env.cmd().args(["status", "--namespace", "cli", "--json"]).output().unwrap();
    assert!(output.status.success());
    let state = CliTestEnvironment::json_stdout(&output);
    assert_eq!(state["mode"], "TRIVIAL");
    assert_eq!(state["stage"], "CLASSIFIED");

    env.cmd()
        .args(["status", "--namespace", "cli"])
        .assert()
        .success()
        .stdout(predicate::str::contains("start-execution"));
}

#[test]
fn test_reset_creates_a_listed_backup() {
    let env = CliTestEnvironment::new();
    env.cmd()
        .args(["check", "--action", "start-gathering", "--namespace", "cli"])
        .assert()
        .success();

    env.cmd()
        .args(["reset", "--namespace", "cli", "--reason", "starting over"])
        .assert()
        .success()
        .stdout(predicate::str::contains("from GATHERING to INITIAL"))
        .stdout(predicate::str::contains("Backup:"));

    env.cmd()
        .args(["backups", "--namespace", "cli"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backups for 'cli'"));

    env.cmd()
        .args(["history", "--namespace", "cli"])
        .assert()
        .success()
        .stdout(predicate::str::contains("starting over"));
}

#[test]
fn test_set_mode_rejects_unknown_mode() {
    let env = CliTestEnvironment::new();
    env.cmd()
        .args(["set-mode", "--mode", "ENORMOUS", "--namespace", "cli"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ENORMOUS"));
}

#[test]
fn test_cache_store_then_get() {
    let env = CliTestEnvironment::new();
    let tree = env.temp_dir.path().join("work");
    fs::write(tree.join("main.rs"), "fn main() {}").unwrap();

    let fingerprint = env.cmd().args(["cache", "fingerprint"]).arg(&tree).output().unwrap();
    assert!(fingerprint.status.success());
    let hash = String::from_utf8(fingerprint.stdout).unwrap().trim().to_string();
    assert_eq!(hash.len(), 64);

    env.cmd().args(["cache", "check"]).arg(&tree).assert().code(1);

    env.cmd()
        .args(["cache", "store"])
        .arg(&tree)
        .args(["--payload", r#"{"summary":"one file"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains(hash.as_str()));

    env.cmd()
        .args(["cache", "get"])
        .arg(&tree)
        .assert()
        .success()
        .stdout(predicate::str::contains("one file"));

    env.cmd()
        .args(["cache", "get", "--fingerprint", hash.as_str()])
        .assert()
        .success();

    env.cmd().args(["cache", "check"]).arg(&tree).assert().success();
}

#[test]
fn test_missing_explicit_config_file_is_an_error() {
    let env = CliTestEnvironment::new();
    env.cmd()
        .env("PIPELINE_GATE_CONFIG", env.temp_dir.path().join("missing.toml"))
        .args(["status", "--namespace", "cli"])
        .assert()
        .code(1);
}

#[test]
fn test_local_config_file_is_honoured() {
    let env = CliTestEnvironment::new();
    fs::write(
        env.temp_dir.path().join("work/pipeline-gate.toml"),
        "[policy]\nalways_allowed = [\"deploy-preview\"]\n",
    )
    .unwrap();

    env.cmd()
        .args(["config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy-preview"));
}

#[test]
fn test_session_start_creates_namespace() {
    let env = CliTestEnvironment::new();
    env.cmd()
        .args(["session-start", "--namespace", "fresh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("'fresh' is at INITIAL"));

    env.cmd()
        .arg("namespaces")
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh"));
}

#[test]
fn test_parallel_processes_serialize_on_one_namespace() {
    const PROCESSES: usize = 8;
    let env = CliTestEnvironment::new();
    env.cmd()
        .args(["check", "--action", "start-gathering", "--namespace", "parallel"])
        .assert()
        .success();

    let children: Vec<_> = (0..PROCESSES)
        .map(|i| {
            env.std_cmd()
                .args(["check", "--action", &format!("gather:{i}"), "--namespace", "parallel"])
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .spawn()
                .expect("spawn pipeline-gate")
        })
        .collect();

    for child in children {
        let output = child.wait_with_output().unwrap();
        assert_eq!(
            output.status.code(),
            Some(0),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        assert_eq!(CliTestEnvironment::json_stdout(&output)["approve"], true);
    }

    let state_file = env
        .temp_dir
        .path()
        .join("state/namespaces/parallel/state.json");
    let state: Value = serde_json::from_str(&fs::read_to_string(state_file).unwrap()).expect("state.json parses");
    assert_eq!(state["stage"], "GATHERING");
    assert_eq!(state["history"].as_array().unwrap().len(), PROCESSES + 1);
}

#[test]
fn test_housekeeping_accepts_enormous_day_counts() {
    let env = CliTestEnvironment::new();
    env.cmd()
        .args(["cache", "clean", "--days", "18446744073709551615"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 0"));

    env.cmd()
        .args(["backups", "--namespace", "cli", "--prune-days", "100000000"])
        .assert()
        .success();

    env.cmd()
        .env("PIPELINE_GATE__STATE__BACKUP_RETENTION_DAYS", "100000000000")
        .env("PIPELINE_GATE__CACHE__CLEAN_AFTER_DAYS", "100000000000")
        .args(["session-start", "--namespace", "cli"])
        .assert()
        .success();
}
