//! Smoke tests -- verify the binary runs and exits with the documented codes.

use assert_cmd::Command;
use predicates::prelude::*;

/// The binary with CI environment variables cleared, running in `dir`.
fn testpulse(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("testpulse").unwrap();
    cmd.current_dir(dir)
        .env_remove("SLACK_WEBHOOK_URL")
        .env_remove("ALERT_THRESHOLD")
        .env_remove("TESTPULSE_CONFIG")
        .env_remove("GITHUB_SHA")
        .env_remove("GITHUB_REF_NAME")
        .env_remove("GITHUB_RUN_ID")
        .env_remove("GITHUB_REPOSITORY");
    cmd
}

fn write_green_results(dir: &std::path::Path) {
    std::fs::create_dir_all(dir.join("test-results")).unwrap();
    std::fs::write(
        dir.join("test-results/results.json"),
        serde_json::json!({
            "stats": { "startTime": "2026-02-16T14:30:00.000Z", "duration": 1000.0, "expected": 1 },
            "suites": [{
                "file": "smoke.spec.ts",
                "specs": [{
                    "title": "home",
                    "tests": [{ "status": "expected", "results": [{ "duration": 10 }] }]
                }]
            }]
        })
        .to_string(),
    )
    .unwrap();
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("testpulse")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("consecutive-failure tracking"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("testpulse")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("testpulse"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["notify", "archive"] {
        Command::cargo_bin("testpulse")
            .unwrap()
            .args([sub, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_notify_missing_results_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    testpulse(dir.path())
        .arg("notify")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_notify_malformed_results_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("test-results")).unwrap();
    std::fs::write(dir.path().join("test-results/results.json"), "{").unwrap();
    testpulse(dir.path()).arg("notify").assert().code(1);
}

#[test]
fn test_notify_green_run_without_webhook_exits_0() {
    let dir = tempfile::tempdir().unwrap();
    write_green_results(dir.path());
    testpulse(dir.path()).arg("notify").assert().success();

    let summary: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("test-results/summary.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summary["total"], 1);
    assert_eq!(summary["failed"], 0);
    assert_eq!(summary["commitHash"], "local");
    assert!(dir.path().join(".state/failure-state.json").exists());
}

#[test]
fn test_notify_rejects_zero_threshold() {
    let dir = tempfile::tempdir().unwrap();
    write_green_results(dir.path());
    testpulse(dir.path())
        .args(["notify", "--threshold", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("threshold"));
}

#[test]
fn test_archive_missing_source_exits_0() {
    let dir = tempfile::tempdir().unwrap();
    testpulse(dir.path()).arg("archive").assert().success();
    assert!(!dir.path().join("results-history").exists());
}

#[test]
fn test_config_file_paths_are_used() {
    let dir = tempfile::tempdir().unwrap();
    write_green_results(dir.path());
    std::fs::write(
        dir.path().join("testpulse.toml"),
        "[paths]\nsummary_file = \"out/digest.json\"\n",
    )
    .unwrap();
    testpulse(dir.path())
        .args(["--config", "testpulse.toml", "notify"])
        .assert()
        .success();
    assert!(dir.path().join("out/digest.json").exists());
}
