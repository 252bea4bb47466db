//! # CLI Tests / 命令行测试
//!
//! Runs the `boost-test-adapter` binary against temporary workspaces that
//! contain fake Boost.Test executables.
//!
//! 针对包含伪造 Boost.Test 可执行文件的临时工作区运行 `boost-test-adapter` 二进制文件。

mod common;

use assert_cmd::prelude::*;
use common::{setup_workspace, write_config, FakeBoost, PASSING_LOG};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;

const CONFIG: &str = "[[tests]]\n[[tests.testExecutables]]\nglob = \"bin/*_test\"\n";

fn adapter_cmd(workspace: &Path) -> Command {
    let mut cmd = Command::cargo_bin("boost-test-adapter").unwrap();
    cmd.env("NO_COLOR", "1")
        .arg("--lang")
        .arg("en")
        .arg("--workspace")
        .arg(workspace);
    cmd
}

/// `list` prints the executables and every test they list.
///
/// `list` 打印可执行文件及其列出的所有测试。
#[test]
fn test_list_prints_tree() {
    let ws = setup_workspace();
    FakeBoost::new().write_to(&ws.path().join("bin/fake_test"));
    write_config(ws.path(), CONFIG);

    adapter_cmd(ws.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("fake_test"))
        .stdout(predicate::str::contains("Suite1"))
        .stdout(predicate::str::contains("caseA"))
        .stdout(predicate::str::contains("caseC"));
}

/// `list --json` prints a snapshot that parses as JSON.
///
/// `list --json` 打印可解析为 JSON 的快照。
#[test]
fn test_list_json() {
    let ws = setup_workspace();
    FakeBoost::new().write_to(&ws.path().join("bin/fake_test"));
    write_config(ws.path(), CONFIG);

    let output = adapter_cmd(ws.path()).arg("list").arg("--json").output().unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let text = value.to_string();
    assert!(value.is_array());
    assert!(text.contains("caseB"));
}

/// A failing test case makes `run` exit with a failure.
///
/// 失败的测试用例使 `run` 以失败退出。
#[test]
fn test_run_with_failure_exits_non_zero() {
    let ws = setup_workspace();
    FakeBoost::new().write_to(&ws.path().join("bin/fake_test"));
    write_config(ws.path(), CONFIG);

    adapter_cmd(ws.path())
        .arg("run")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Test Summary"))
        .stdout(predicate::str::contains("1 failed"));
}

/// Running only passing tests succeeds.
///
/// 仅运行通过的测试时成功退出。
#[test]
fn test_run_passing_path() {
    let ws = setup_workspace();
    FakeBoost::new()
        .log(PASSING_LOG)
        .exit_code(0)
        .write_to(&ws.path().join("bin/fake_test"));
    write_config(ws.path(), CONFIG);

    adapter_cmd(ws.path())
        .arg("run")
        .arg("fake_test/Suite1/caseA")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 failed"));
}

/// An unknown test path is an error before anything runs.
///
/// 未知的测试路径在运行任何内容之前即报错。
#[test]
fn test_run_unknown_path_is_error() {
    let ws = setup_workspace();
    let binary = FakeBoost::new().write_to(&ws.path().join("bin/fake_test"));
    write_config(ws.path(), CONFIG);

    adapter_cmd(ws.path())
        .arg("run")
        .arg("fake_test/NoSuchSuite")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No test found"));
    assert!(common::run_calls(&binary).is_empty());
}

/// `init` writes the default configuration and keeps an existing one.
///
/// `init` 写入默认配置，并保留已有的配置。
#[test]
fn test_init_writes_config() {
    let ws = setup_workspace();
    let config = ws.path().join("boost-test-adapter.toml");

    adapter_cmd(ws.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    let written = fs::read_to_string(&config).unwrap();
    assert!(written.contains("testExecutables"));

    fs::write(&config, "# mine\n").unwrap();
    adapter_cmd(ws.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
    assert_eq!(fs::read_to_string(&config).unwrap(), "# mine\n");

    adapter_cmd(ws.path()).arg("init").arg("--force").assert().success();
    assert_ne!(fs::read_to_string(&config).unwrap(), "# mine\n");
}

/// A broken configuration is reported and fails `list`.
///
/// 损坏的配置会被报告并使 `list` 失败。
#[test]
fn test_list_with_broken_config_fails() {
    let ws = setup_workspace();
    write_config(ws.path(), "[[tests]\n");

    adapter_cmd(ws.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_help() {
    Command::cargo_bin("boost-test-adapter")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("list"));
}
