//! Configuration system tests
//!
//! Tests configuration loading, validation, and environment overrides
//! through the `tmsn-node config` commands.

mod common;

use std::fs;
use std::path::PathBuf;

use predicates::prelude::*;
use tempfile::TempDir;

use common::fixture_path;

/// Test fixture for configuration testing
struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("node.toml");
        Self { _temp_dir: temp_dir, config_path }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

fn node_cmd() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("tmsn-node").unwrap()
}

// ─────────────────────────────────────────────────────────────────
// Validation Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_minimal_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
id = "solo"
"#,
    );

    node_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid (0 peers, port 7000)"));
}

#[test]
fn test_valid_fixture() {
    node_cmd()
        .args(["config", "validate", "--config"])
        .arg(fixture_path("valid_config.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("3 peers, port 7101"));
}

#[test]
fn test_duplicate_peer_rejected() {
    node_cmd()
        .args(["config", "validate", "--config"])
        .arg(fixture_path("invalid_config.toml"))
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("worker-2"));
}

#[test]
fn test_invalid_backoff_range() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
id = "solo"

[network]
initial_backoff_ms = 5000
max_backoff_ms = 100
"#,
    );

    node_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .code(10);
}

#[test]
fn test_unknown_direction() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[network]
direction = "sideways"
"#,
    );

    node_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .code(10);
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node
id = "broken"
"#,
    );

    node_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .code(10);
}

#[test]
fn test_missing_config_file() {
    node_cmd()
        .args(["config", "validate", "--config", "/nonexistent/tmsn/node.toml"])
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("not found"));
}

// ─────────────────────────────────────────────────────────────────
// Config Show Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_custom() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
id = "custom-node-7"
listen_port = 7555

[network]
outbound_queue_capacity = 64

[[peers]]
identity = "other-node"
address = "10.1.2.3:7555"
"#,
    );

    node_cmd()
        .args(["config", "show", "--config", fixture.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("# node id: custom-node-7"))
        .stdout(predicate::str::contains("7555"))
        .stdout(predicate::str::contains("outbound_queue_capacity = 64"))
        .stdout(predicate::str::contains("10.1.2.3:7555"));
}

// ─────────────────────────────────────────────────────────────────
// Config Init Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_init_creates_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("node.toml");

    node_cmd()
        .args(["config", "init", "--path", config_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file created"));

    assert!(config_path.exists());

    // The generated template must load as is
    node_cmd()
        .args(["config", "validate", "--config", config_path.to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn test_config_init_refuses_overwrite() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[node]\n");

    node_cmd()
        .args(["config", "init", "--path", fixture.path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_init_force_overwrite() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[node]\nid = \"stale-node\"\n");

    node_cmd()
        .args(["config", "init", "--path", fixture.path(), "--force"])
        .assert()
        .success();

    let content = fs::read_to_string(fixture.path()).unwrap();
    assert!(!content.contains("stale-node"));
    assert!(content.contains("[network]"));
}

// ─────────────────────────────────────────────────────────────────
// Environment Variable Override Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_override_node_id() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
id = "from-file"
"#,
    );

    node_cmd()
        .args(["config", "show", "--config", fixture.path()])
        .env("TMSN_NODE_ID", "from-env")
        .assert()
        .success()
        .stdout(predicate::str::contains("# node id: from-env"));
}

#[test]
fn test_env_override_peers() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
id = "a"
"#,
    );

    node_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .env("TMSN_PEERS", "a@127.0.0.1:7000,b@127.0.0.2:7000")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 peers"));
}

#[test]
fn test_env_override_invalid_level() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[node]\nid = \"a\"\n");

    node_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .env("TMSN_LOG_LEVEL", "bogus")
        .assert()
        .failure()
        .code(10);
}

// ─────────────────────────────────────────────────────────────────
// Path Expansion Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_tilde_expansion() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
id = "a"

[logging]
file = "~/tmsn/logs/node.log"
"#,
    );

    let output = node_cmd()
        .args(["config", "show", "--config", fixture.path()])
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("node.log"));
    assert!(!stdout.contains("file = \"~"));
}
