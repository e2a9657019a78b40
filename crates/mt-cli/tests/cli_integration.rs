//! CLI integration tests
//!
//! Runs the `manage` binary with an isolated config file.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Env {
    dir: TempDir,
}

impl Env {
    /// An empty config file, so every section uses its defaults
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "").unwrap();
        Self { dir }
    }

    fn with_config(contents: &str) -> Self {
        let env = Self::new();
        std::fs::write(env.dir.path().join("config.toml"), contents).unwrap();
        env
    }

    fn manage(&self) -> Command {
        let mut cmd = Command::cargo_bin("manage").unwrap();
        cmd.arg("--config").arg(self.dir.path().join("config.toml"));
        cmd
    }
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("manage")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tunnel"))
        .stdout(predicate::str::contains("datastore"))
        .stdout(predicate::str::contains("compose"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("manage")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("manage"));
}

#[test]
fn test_tunnel_help_documents_addr_flag() {
    Command::cargo_bin("manage")
        .unwrap()
        .args(["tunnel", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-L, --addr <SPEC>"));
}

#[test]
fn test_unknown_service_lists_valid_names() {
    Env::new()
        .manage()
        .args(["tunnel", "no-such-service"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no-such-service"))
        .stderr(predicate::str::contains("auth"))
        .stderr(predicate::str::contains("postgres"));
}

#[test]
fn test_malformed_local_spec_fails() {
    Env::new()
        .manage()
        .args(["tunnel", "-L", "8080:auth"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("8080:auth"));
}

#[test]
fn test_long_addr_flag_is_parsed() {
    Env::new()
        .manage()
        .args(["tunnel", "--addr", "8080:auth"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("8080:auth"));
}

#[test]
fn test_conflicting_binds_fail_before_dialing() {
    // Port 1 on localhost is closed; a dial attempt would report it
    Env::with_config("[client]\nserver_address = \"127.0.0.1:1\"\n")
        .manage()
        .args(["tunnel", "-L", "9004:other:1", "auth"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("9004"))
        .stderr(predicate::str::contains("connecting").not());
}

#[test]
fn test_unreachable_server_fails() {
    Env::with_config(
        "[client]\nserver_address = \"127.0.0.1:1\"\nconnect_attempts = 1\n",
    )
    .manage()
    .args(["tunnel", "auth"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("connecting to tunnel server"));
}

#[test]
fn test_list_services() {
    Env::new()
        .manage()
        .args(["tunnel", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("message-bus"))
        .stdout(predicate::str::contains("datastore-writer"));
}

#[test]
fn test_custom_services_replace_builtin() {
    Env::with_config("[client.services]\nweb = \"8080:web:80\"\n")
        .manage()
        .args(["tunnel", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("web:80"))
        .stdout(predicate::str::contains("postgres").not());
}

#[test]
fn test_datastore_set_rejects_invalid_json() {
    Env::new()
        .manage()
        .args(["datastore", "set", "user/1/name", "not json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_datastore_get_rejects_bad_key() {
    Env::new()
        .manage()
        .args(["datastore", "get", "user/1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("user/1"));
}

#[test]
fn test_config_init_and_show() {
    let env = Env::new();
    std::fs::remove_file(env.dir.path().join("config.toml")).unwrap();

    env.manage().args(["config", "init"]).assert().success();
    env.manage()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[client]"))
        .stdout(predicate::str::contains("server_address"));
}

#[test]
fn test_missing_explicit_config_fails() {
    Command::cargo_bin("manage")
        .unwrap()
        .args(["--config", "/nonexistent/manage.toml", "tunnel", "--list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
