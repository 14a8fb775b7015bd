//! CLI options interaction tests
//!
//! These tests run the `spt` binary and check exit codes and output for
//! flag combinations, configuration errors and complete runs against a mock
//! server.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const ENV_VARS: &[&str] = &[
    "SPEED_SERVER_URL",
    "CONNECTIONS",
    "PROGRESSIVE_DOWNLOAD",
    "WARMUP",
    "UPLOAD_SIZE_MB",
    "PING_COUNT",
    "PING_INTERVAL_MS",
    "TIMEOUT_SECONDS",
    "ENABLE_COLOR",
];

/// Command with the configuration environment cleared, run from an empty directory
fn create_test_cmd(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("spt").unwrap();
    cmd.current_dir(workdir.path());
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

async fn mock_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"pong": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/download-adaptive"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 1024 * 1024]))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"size": 1048576}})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "server": {"name": "mock-speed", "host": "localhost", "platform": "linux", "arch": "x64"},
            "uptime": 300.0
        })))
        .mount(&server)
        .await;

    server
}

#[test]
fn test_help_lists_options() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--connections"))
        .stdout(predicate::str::contains("--no-progressive"))
        .stdout(predicate::str::contains("--json"));
}

#[test]
fn test_version_flag() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_conflicting_color_flags() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--color", "--no-color"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--color"));
}

#[test]
fn test_zero_connections_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--server", "http://127.0.0.1:9/api", "-c", "0", "--no-color"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Connection count must be at least 1"))
        .stderr(predicate::str::contains("Suggestions:"))
        .stderr(predicate::str::contains("Connections must be between 1 and 4"));
}

#[test]
fn test_connections_above_cap_rejected() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--server", "http://127.0.0.1:9/api", "-c", "5", "--no-color"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Connection count"));
}

#[test]
fn test_invalid_server_scheme_rejected() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .args(["--server", "ftp://speed.example.com", "--no-color"])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_env_value_rejected() {
    let dir = TempDir::new().unwrap();
    create_test_cmd(&dir)
        .env("WARMUP", "sometimes")
        .arg("--no-color")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("WARMUP"));
}

#[test]
fn test_dotenv_file_is_read() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(".env"), "CONNECTIONS=99\n").unwrap();

    create_test_cmd(&dir)
        .arg("--no-color")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Connection count"));
}

#[test]
fn test_write_env_example() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("example.env");

    create_test_cmd(&dir)
        .arg("--write-env-example")
        .arg(&target)
        .assert()
        .success();

    let content = std::fs::read_to_string(&target).unwrap();
    assert!(content.contains("SPEED_SERVER_URL="));
    assert!(content.contains("CONNECTIONS="));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_json_run_against_mock_server() {
    let server = mock_server().await;
    let dir = TempDir::new().unwrap();
    let mut cmd = create_test_cmd(&dir);
    cmd.args([
        "--server",
        &format!("{}/api", server.uri()),
        "--no-warmup",
        "--pings",
        "3",
        "--ping-interval",
        "1",
        "--upload-size",
        "1",
        "--json",
    ]);

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap()).await.unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["latency"]["samples_ms"].as_array().unwrap().len(), 3);
    assert!(value["download"]["megabits_per_second"].as_f64().unwrap() > 0.0);
    assert_eq!(value["upload"]["degraded"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_server_info_against_mock_server() {
    let server = mock_server().await;
    let dir = TempDir::new().unwrap();
    let mut cmd = create_test_cmd(&dir);
    cmd.args(["--server", &format!("{}/api", server.uri()), "--server-info", "--no-color"]);

    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap()).await.unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mock-speed"));
    assert!(stdout.contains("5 minutes"));
}

#[test]
fn test_unreachable_server_reports_estimates() {
    let dir = TempDir::new().unwrap();
    let output = create_test_cmd(&dir)
        .args([
            "--server",
            "http://127.0.0.1:9/api",
            "--no-warmup",
            "--pings",
            "1",
            "--timeout",
            "2",
            "--upload-size",
            "1",
            "--json",
        ])
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["download"]["megabits_per_second"], 42.5);
    assert_eq!(value["upload"]["megabits_per_second"], 28.5);
    assert_eq!(value["latency"]["failed"], 1);
}
