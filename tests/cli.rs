use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CI_VARS: &[&str] = &[
    "CI",
    "CONTINUOUS_INTEGRATION",
    "BUILD_NUMBER",
    "RUN_ID",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "CIRCLECI",
    "TRAVIS",
    "BUILDKITE",
    "TF_BUILD",
    "JENKINS_URL",
    "CI_NODE_INDEX",
    "CI_NODE_TOTAL",
];

fn project(package: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), package).unwrap();
    dir
}

fn trial(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("trial").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG");
    for var in CI_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_rejects_negative_concurrency() {
    let dir = project("{}");
    trial(dir.path())
        .args(["--concurrency", "-1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("nonnegative integer"));
}

#[test]
fn test_rejects_tap_in_watch_mode() {
    let dir = project("{}");
    trial(dir.path())
        .args(["--watch", "--tap"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "The TAP reporter is not available when using watch mode.",
        ));
}

#[test]
fn test_rejects_watch_in_ci() {
    let dir = project("{}");
    trial(dir.path())
        .arg("--watch")
        .env("CI", "true")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Watch mode is not available in CI"));
}

#[test]
fn test_rejects_legacy_configuration() {
    let dir = project(r#"{"trial": {"sources": ["src/**"]}}"#);
    trial(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("'sources' has been removed."));
}

#[test]
fn test_conflicting_configuration_sources() {
    let dir = project(r#"{"trial": {"verbose": true}}"#);
    fs::write(dir.path().join("trial.config.toml"), "verbose = true\n").unwrap();
    trial(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Conflicting configuration in trial.config.toml and package.json",
        ));
}

#[test]
fn test_reset_cache_without_cache() {
    let dir = project("{}");
    trial(dir.path())
        .arg("reset-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("No cache files to remove"));
}

#[test]
fn test_reset_cache_removes_files() {
    let dir = project("{}");
    let cache = dir.path().join("node_modules/.cache/trial");
    fs::create_dir_all(cache.join("babel")).unwrap();
    fs::write(cache.join("babel/a.json"), "{}").unwrap();

    trial(dir.path())
        .arg("reset-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed trial cache files"));

    assert!(cache.is_dir());
    assert_eq!(fs::read_dir(&cache).unwrap().count(), 0);
}

#[cfg(unix)]
#[test]
fn test_reset_cache_failure_reports_cause() {
    use std::os::unix::fs::PermissionsExt;

    let dir = project("{}");
    let cache = dir.path().join("node_modules/.cache/trial");
    let locked = cache.join("locked");
    fs::create_dir_all(&locked).unwrap();
    fs::write(locked.join("a.json"), "{}").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

    // Permission bits do not stop privileged users
    if fs::write(locked.join("writable"), "").is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let assert = trial(dir.path()).arg("reset-cache").assert();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error removing trial cache files in"))
        .stderr(predicate::str::contains("Failed to remove"))
        .stderr(predicate::str::contains("ermission denied"));
    assert!(locked.join("a.json").is_file());
}

#[test]
fn test_reset_cache_ignores_broken_configuration() {
    let dir = project("{ not json");
    trial(dir.path())
        .arg("reset-cache")
        .assert()
        .success()
        .stdout(predicate::str::contains("No cache files to remove"));
}

#[test]
fn test_broken_configuration_is_fatal_for_runs() {
    let dir = project("{ not json");
    trial(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error parsing package.json"));
}

#[test]
fn test_no_test_files() {
    let dir = project("{}");
    fs::create_dir_all(dir.path().join("lib")).unwrap();
    fs::write(dir.path().join("lib/index.js"), "module.exports = 1;\n").unwrap();

    trial(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Couldn't find any files to test"));
}

#[test]
fn test_invalid_environment_variables() {
    let dir = project(r#"{"trial": {"environmentVariables": {"PORT": 3000}}}"#);
    trial(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "The 'environmentVariables' configuration must be an object containing string values.",
        ));
}

#[test]
fn test_debug_rejects_watch() {
    let dir = project("{}");
    trial(dir.path())
        .args(["debug", "--watch", "test/a.js"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Watch mode is not available when debugging.",
        ));
}
