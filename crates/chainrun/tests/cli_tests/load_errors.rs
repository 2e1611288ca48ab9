//! Errors raised before any request is sent.

use super::{chainrun, fixtures_dir};
use predicates::prelude::*;

#[test]
fn test_missing_scenario_file() {
    chainrun()
        .arg(fixtures_dir().join("scenarios/missing.json"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to resolve scenarios"));
}

#[test]
fn test_directory_without_scenarios() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    chainrun()
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No scenario files found"));
    Ok(())
}

#[test]
fn test_duplicate_step_order_is_rejected() {
    chainrun()
        .arg(fixtures_dir().join("invalid/duplicate-order.json"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load scenario"));
}

#[test]
fn test_invalid_config_file() {
    chainrun()
        .arg(fixtures_dir().join("scenarios/health.json"))
        .arg("--config")
        .arg(fixtures_dir().join("bad-config.yaml"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_missing_config_file() {
    chainrun()
        .arg(fixtures_dir().join("scenarios/health.json"))
        .arg("--config")
        .arg(fixtures_dir().join("nope.yaml"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_missing_catalog_file() {
    chainrun()
        .arg(fixtures_dir().join("scenarios/health.json"))
        .arg("--catalog")
        .arg(fixtures_dir().join("nope.yaml"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load catalog"));
}
