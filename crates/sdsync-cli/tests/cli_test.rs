#![allow(clippy::unwrap_used)]
#![allow(missing_docs)]

use assert_cmd::cargo_bin_cmd;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    // Arrange
    let mut cmd = cargo_bin_cmd!("sdsync");

    // Act & Assert
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("dump"))
        .stdout(predicate::str::contains("reset"));
}

#[test]
fn test_sync_help_shows_options() {
    // Arrange
    let mut cmd = cargo_bin_cmd!("sdsync");

    // Act & Assert
    cmd.args(["sync", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--channels"))
        .stdout(predicate::str::contains("--full"));
}

#[test]
fn test_sync_without_credentials_fails() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("sdsync");

    // Act & Assert
    cmd.env_remove("SD_USERNAME")
        .env_remove("SD_PASSWORD")
        .args(["sync", "--dir"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("No credentials"));
}

#[test]
fn test_status_with_invalid_config_fails() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), "[sync\nchannels = 1").unwrap();
    let mut cmd = cargo_bin_cmd!("sdsync");

    // Act & Assert
    cmd.env("SD_USERNAME", "user")
        .env("SD_PASSWORD", "secret")
        .args(["status", "--dir"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse"));
}

#[test]
fn test_reset_creates_database() {
    // Arrange
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("sdsync");

    // Act
    cmd.args(["reset", "--dir"]).arg(dir.path()).assert().success();

    // Assert
    assert!(dir.path().join("sdsync.db").exists());
}

#[test]
fn test_version_includes_revision() {
    // Arrange
    let mut cmd = cargo_bin_cmd!("sdsync");

    // Act & Assert
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sdsync"))
        .stdout(predicate::str::contains("(rev:"));
}
