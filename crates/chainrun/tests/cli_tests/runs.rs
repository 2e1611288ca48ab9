//! Full runs against a local mock server.

use super::{chainrun, fixtures_dir};
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::{Value, json};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn mock_login_flow(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST)
            .path("/login")
            .json_body(json!({"username": "demo", "password": "secret"}));
        then.status(200).json_body(json!({"data": {"token": "t-123"}}));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/profile")
            .header("authorization", "Bearer t-123");
        then.status(200).json_body(json!({"errcode": 0, "data": {"name": "demo"}}));
    });
}

#[test]
fn test_table_output_for_passing_run() {
    let server = MockServer::start();
    mock_login_flow(&server);

    chainrun()
        .arg(fixtures_dir().join("scenarios/login-flow.yaml"))
        .args(["--base-url", &server.base_url()])
        .assert()
        .success()
        .stdout(predicate::str::contains("running 2 steps for login-flow"))
        .stdout(predicate::str::contains("step 1 POST"))
        .stdout(predicate::str::contains("/profile ... ok"))
        .stdout(predicate::str::contains("run result: ok. 2 passed; 0 failed"));
}

#[test]
fn test_json_output_for_passing_run() -> TestResult {
    let server = MockServer::start();
    mock_login_flow(&server);

    let output = chainrun()
        .arg(fixtures_dir().join("scenarios/login-flow.yaml"))
        .args(["--base-url", &server.base_url(), "--format", "json"])
        .output()?;

    assert_eq!(output.status.code(), Some(0));
    let report: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["summary"]["passed_steps"], json!(2));
    assert_eq!(report["scenarios"][0]["name"], json!("login-flow"));
    let second = &report["scenarios"][0]["report"]["steps"][1];
    assert_eq!(second["requestHeaders"]["Authorization"], json!("Bearer t-123"));
    assert_eq!(second["extractions"][0]["value"], json!("t-123"));
    Ok(())
}

#[test]
fn test_failed_assertion_exits_with_one() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(200).body("down");
    });

    chainrun()
        .arg(fixtures_dir().join("scenarios/health.json"))
        .args(["--base-url", &server.base_url()])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("---- health::step 1 ----"))
        .stdout(predicate::str::contains("assertion response_contains"))
        .stdout(predicate::str::contains("run result: FAILED"));
}

#[test]
fn test_unreachable_server_exits_with_one() -> TestResult {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let base = format!("http://127.0.0.1:{}", listener.local_addr()?.port());
    drop(listener);

    let output = chainrun()
        .arg(fixtures_dir().join("scenarios/health.json"))
        .args(["--base-url", &base, "--format", "json"])
        .output()?;

    assert_eq!(output.status.code(), Some(1));
    let report: Value = serde_json::from_slice(&output.stdout)?;
    let step = &report["scenarios"][0]["report"]["steps"][0];
    assert_eq!(step["statusCode"], json!("error"));
    assert!(step["errorMessage"].is_string());
    Ok(())
}

#[test]
fn test_directory_runs_every_scenario() -> TestResult {
    let server = MockServer::start();
    mock_login_flow(&server);
    server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(200).json_body(json!({"status": "up"}));
    });

    let output = chainrun()
        .arg(fixtures_dir().join("scenarios"))
        .args(["--base-url", &server.base_url(), "--format", "json"])
        .args(["--parallel", "2"])
        .output()?;

    assert_eq!(output.status.code(), Some(0));
    let report: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["summary"]["total_scenarios"], json!(2));
    assert_eq!(report["scenarios"][0]["name"], json!("health"));
    assert_eq!(report["scenarios"][1]["name"], json!("login-flow"));
    Ok(())
}

#[test]
fn test_filter_without_match_succeeds() {
    chainrun()
        .arg(fixtures_dir().join("scenarios"))
        .args(["--filter", "checkout"])
        .assert()
        .success()
        .stderr(predicate::str::contains("No scenarios match filter 'checkout'"));
}

#[test]
fn test_filter_selects_scenario() {
    let server = MockServer::start();
    let health = server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(200).json_body(json!({"status": "up"}));
    });

    chainrun()
        .arg(fixtures_dir().join("scenarios"))
        .args(["--base-url", &server.base_url(), "--filter", "health"])
        .assert()
        .success()
        .stdout(predicate::str::contains("login-flow").not());

    health.assert();
}

#[test]
fn test_catalog_headers_are_sent() {
    let server = MockServer::start();
    let health = server.mock(|when, then| {
        when.method(GET)
            .path("/health")
            .header("x-api-key", "catalog-key");
        then.status(200).json_body(json!({"status": "up"}));
    });

    chainrun()
        .arg(fixtures_dir().join("scenarios/health.json"))
        .args(["--base-url", &server.base_url()])
        .arg("--catalog")
        .arg(fixtures_dir().join("catalog.yaml"))
        .assert()
        .success();

    health.assert();
}

#[test]
fn test_config_file_supplies_base_url() -> TestResult {
    let server = MockServer::start();
    let health = server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(200).json_body(json!({"status": "up"}));
    });

    let dir = tempfile::tempdir()?;
    let config = dir.path().join("chainrun.config.yaml");
    std::fs::write(
        &config,
        format!("base-url: {}\ntimeout-ms: 2000\n", server.base_url()),
    )?;

    chainrun()
        .current_dir(dir.path())
        .arg(fixtures_dir().join("scenarios/health.json"))
        .assert()
        .success();

    health.assert();
    Ok(())
}

#[test]
fn test_verbose_prints_detail_table() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/health");
        then.status(200).json_body(json!({"status": "up"}));
    });

    chainrun()
        .arg(fixtures_dir().join("scenarios/health.json"))
        .args(["--base-url", &server.base_url(), "--verbose"])
        .assert()
        .success()
        .stdout(predicate::str::contains("=== Detailed Results ==="))
        .stdout(predicate::str::contains("Latency"));
}
