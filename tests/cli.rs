use std::io::Write;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::NamedTempFile;

#[test]
fn cli_version() {
    Command::cargo_bin("supervised-pool")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn cli_runs_and_closes() {
    Command::cargo_bin("supervised-pool")
        .unwrap()
        .args(["--workers", "3", "--kill", "1", "--run-ms", "100"])
        .assert()
        .success()
        .stderr(contains("Running 3 workers"))
        .stderr(contains("Killed worker"))
        .stderr(contains("Pool closed"));
}

#[test]
fn cli_reads_config_file() {
    let mut config = NamedTempFile::new().unwrap();
    write!(config, r#"{{"workers": 2, "restart_delay_ms": 5}}"#).unwrap();

    Command::cargo_bin("supervised-pool")
        .unwrap()
        .arg("--config")
        .arg(config.path())
        .args(["--run-ms", "50"])
        .assert()
        .success()
        .stderr(contains("Running 2 workers, restart delay 5ms"));
}

#[test]
fn cli_flags_override_config_file() {
    let mut config = NamedTempFile::new().unwrap();
    write!(config, r#"{{"workers": 2}}"#).unwrap();

    Command::cargo_bin("supervised-pool")
        .unwrap()
        .arg("--config")
        .arg(config.path())
        .args(["--workers", "4", "--run-ms", "20"])
        .assert()
        .success()
        .stderr(contains("Running 4 workers"));
}

#[test]
fn cli_invalid_config() {
    let mut config = NamedTempFile::new().unwrap();
    write!(config, r#"{{"workers": "many"}}"#).unwrap();

    Command::cargo_bin("supervised-pool")
        .unwrap()
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(contains("Serde error"));
}
