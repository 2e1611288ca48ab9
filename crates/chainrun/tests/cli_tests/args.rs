//! CLI argument tests (no server required).

use super::{chainrun, fixtures_dir};
use predicates::prelude::*;

#[test]
fn test_arg_help() {
    chainrun()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Runs chained HTTP test scenarios"));
}

#[test]
fn test_arg_version() {
    chainrun()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("chainrun"));
}

#[test]
fn test_arg_scenario_required() {
    chainrun().assert().code(2).stderr(predicate::str::contains("SCENARIO"));
}

#[test]
fn test_arg_invalid_format() {
    chainrun()
        .arg(fixtures_dir().join("scenarios/health.json"))
        .args(["--format", "xml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid format"));
}

#[test]
fn test_arg_invalid_timeout() {
    chainrun()
        .arg(fixtures_dir().join("scenarios/health.json"))
        .args(["--timeout", "soon"])
        .assert()
        .code(2);
}

#[test]
fn test_arg_invalid_base_url() {
    chainrun()
        .arg(fixtures_dir().join("scenarios/health.json"))
        .args(["--base-url", "ftp://files.test"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid configuration"));
}
