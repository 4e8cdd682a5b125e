// Command-line behavior of the cbe-diff binary against a fake toolchain.

#![cfg(unix)]

mod common;

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};

use common::FakeSuite;

fn cbe_diff() -> Command {
    let mut cmd = Command::cargo_bin("cbe-diff").unwrap();
    cmd.env_remove("LLVMToolDir");
    cmd
}

fn fake_tools(cmd: &mut Command, suite: &FakeSuite) {
    let bin = suite.bin_dir();
    cmd.arg("--tool-dir")
        .arg(&bin)
        .arg("--interpreter")
        .arg(bin.join("lli"))
        .arg("--clang")
        .arg(bin.join("clang"))
        .arg("--clangxx")
        .arg(bin.join("clang++"))
        .arg("--gcc")
        .arg(bin.join("gcc"))
        .args(["--color", "never", "--timeout", "5"]);
}

#[test]
fn list_prints_planned_units_without_running_tools() {
    let suite = FakeSuite::new();
    suite.add_test("test_a.c", "// status: 6\n");
    suite.add_test("test_b.ll", "; status: 6\n");

    cbe_diff()
        .arg("list")
        .arg(suite.tests_dir())
        .args(["--opt-levels", "0,3", "-k", "test_a"])
        .assert()
        .success()
        .stdout(
            contains("test_a[-O0]")
                .and(contains("test_a[-O3]"))
                .and(contains("test_b [").and(contains("(filtered)")))
                .and(contains("3 units: 2 native, 1 ir")),
        );
    assert!(suite.calls().is_empty());
}

#[test]
fn passing_suite_exits_zero() {
    let suite = FakeSuite::new();
    suite.add_test("test_ok.c", "// status: 6\n");
    suite.add_test("test_known.c", "// xfail: known miscompile\n");

    let mut cmd = cbe_diff();
    cmd.arg("run").arg(suite.tests_dir()).args(["--opt-levels", "1"]);
    fake_tools(&mut cmd, &suite);
    cmd.assert().success().stdout(
        contains("PASS: test_ok[-O1]")
            .and(contains("XFAIL: test_known[-O1]"))
            .and(contains("(known miscompile)"))
            .and(contains("passed 1, failed 0, xfailed 1")),
    );
}

#[test]
fn divergence_exits_one_and_reports_on_stderr() {
    let suite = FakeSuite::new();
    suite.add_test("test_bad.c", "// status: 6\n// cbe-status: 4\n");

    let mut cmd = cbe_diff();
    cmd.arg("run").arg(suite.tests_dir()).args(["--opt-levels", "2"]);
    fake_tools(&mut cmd, &suite);
    cmd.assert()
        .code(1)
        .stderr(
            contains("FAIL: test_bad[-O2]")
                .and(contains("Kind: behavioral divergence"))
                .and(contains("Stage: run-translated"))
                .and(contains("Failed tests:")),
        )
        .stdout(contains("failed 1"));
}

#[test]
fn tool_dir_is_read_from_the_environment() {
    let suite = FakeSuite::new();
    suite.add_test("test_env.ll", "; status: 6\n");
    let bin = suite.bin_dir();

    cbe_diff()
        .env("LLVMToolDir", &bin)
        .arg("run")
        .arg(suite.tests_dir())
        .arg("--interpreter")
        .arg(bin.join("lli"))
        .arg("--gcc")
        .arg(bin.join("gcc"))
        .args(["--color", "never"])
        .assert()
        .success()
        .stdout(contains("PASS: test_env"));
    assert!(suite.calls().iter().any(|c| c.starts_with("llvm-cbe ")));
}

#[test]
fn yaml_config_supplies_the_toolchain() {
    let suite = FakeSuite::new();
    suite.add_test("test_yaml.c", "// status: 25\n");
    let config = suite.write_tool_config();

    cbe_diff()
        .arg("run")
        .arg(suite.tests_dir())
        .arg("--config")
        .arg(&config)
        .args(["--opt-levels", "0", "--color", "never"])
        .assert()
        .success()
        .stdout(contains("PASS: test_yaml[-O0]"));
}

#[test]
fn json_format_is_machine_readable() {
    let suite = FakeSuite::new();
    suite.add_test("test_json.c", "// status: 6\n// translator-warning\n");

    let mut cmd = cbe_diff();
    cmd.arg("run")
        .arg(suite.tests_dir())
        .args(["--opt-levels", "0", "--format", "json"]);
    fake_tools(&mut cmd, &suite);
    let output = cmd.assert().code(1).get_output().stdout.clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let result = &report["results"][0];
    assert_eq!(result["label"], "test_json[-O0]");
    assert_eq!(result["outcome"], "fail");
    assert_eq!(result["kind"], "toolchain-diagnostic");
    assert_eq!(result["stage"], "translate");
    assert_eq!(report["summary"]["failed"], 1);
}

#[test]
fn missing_test_root_is_a_diagnostic() {
    cbe_diff()
        .args(["run", "/definitely/not/a/test/root"])
        .assert()
        .failure()
        .stderr(contains("failed to open test directory").or(contains("cbe_diff::io")));
}

#[test]
fn empty_opt_levels_are_rejected() {
    let suite = FakeSuite::new();
    suite.add_test("test_a.c", "// status: 6\n");

    cbe_diff()
        .arg("run")
        .arg(suite.tests_dir())
        .args(["--opt-levels", ","])
        .assert()
        .failure()
        .stderr(contains("no optimization levels").or(contains("cbe_diff::config")));
    assert!(suite.calls().is_empty());
}
