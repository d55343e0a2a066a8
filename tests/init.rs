mod common;

use common::{chainvault_cmd, init_backup};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn init_writes_config_file() {
    let temp = TempDir::new().unwrap();

    chainvault_cmd(temp.path())
        .args([
            "init",
            "--name",
            "docs",
            "--storage",
            "storage",
            "--archive",
            "archives",
            "--strategy",
            "content-hash",
            "--hash",
            "sha256",
            "--level",
            "6",
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let config = fs::read_to_string(temp.path().join("chainvault.toml")).unwrap();
    assert!(config.contains("[metadata]"));
    assert!(config.contains("version = 1"));
    assert!(config.contains("[backups.docs]"));
    assert!(config.contains("strategy = \"content-hash\""));
    assert!(config.contains("hash_algorithm = \"sha256\""));
    assert!(config.contains("compression = \"deflated\""));
    assert!(config.contains("compression_level = 6"));
    assert!(config.contains("missing_log = \"fail\""));
}

#[test]
fn init_warns_about_missing_storage_dir() {
    let temp = TempDir::new().unwrap();

    chainvault_cmd(temp.path())
        .args([
            "init",
            "--name",
            "docs",
            "--storage",
            "not-there",
            "--archive",
            "archives",
            "--strategy",
            "modification-time",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("does not exist yet"));
}

#[test]
fn init_honors_config_flag() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("storage")).unwrap();

    chainvault_cmd(temp.path())
        .args([
            "--config",
            "other.toml",
            "init",
            "--name",
            "docs",
            "--storage",
            "storage",
            "--archive",
            "archives",
            "--strategy",
            "raw-content",
        ])
        .assert()
        .success();

    assert!(temp.path().join("other.toml").exists());
    assert!(!temp.path().join("chainvault.toml").exists());
}

#[test]
fn init_refuses_duplicate_name() {
    let temp = TempDir::new().unwrap();
    init_backup(temp.path(), &["--strategy", "modification-time"]);

    chainvault_cmd(temp.path())
        .args([
            "init",
            "--name",
            "main",
            "--storage",
            "elsewhere",
            "--archive",
            "archives2",
            "--strategy",
            "modification-time",
        ])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("already exists"));

    let config = fs::read_to_string(temp.path().join("chainvault.toml")).unwrap();
    assert!(!config.contains("elsewhere"));
}

#[test]
fn init_content_hash_requires_hash() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("storage")).unwrap();

    chainvault_cmd(temp.path())
        .args([
            "init",
            "--name",
            "docs",
            "--storage",
            "storage",
            "--archive",
            "archives",
            "--strategy",
            "content-hash",
        ])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("hash_algorithm"));

    assert!(!temp.path().join("chainvault.toml").exists());
}

#[test]
fn init_rejects_out_of_range_level() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("storage")).unwrap();

    chainvault_cmd(temp.path())
        .args([
            "init",
            "--name",
            "docs",
            "--storage",
            "storage",
            "--archive",
            "archives",
            "--strategy",
            "modification-time",
            "--level",
            "42",
        ])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("compression_level 42"));

    assert!(!temp.path().join("chainvault.toml").exists());
}

#[test]
fn init_rejects_unknown_hash() {
    let temp = TempDir::new().unwrap();

    chainvault_cmd(temp.path())
        .args([
            "init",
            "--name",
            "docs",
            "--storage",
            "storage",
            "--archive",
            "archives",
            "--strategy",
            "content-hash",
            "--hash",
            "crc32",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("crc32"));
}

#[test]
fn several_backups_need_a_name() {
    let temp = TempDir::new().unwrap();
    init_backup(temp.path(), &["--strategy", "modification-time"]);
    fs::create_dir(temp.path().join("other")).unwrap();

    chainvault_cmd(temp.path())
        .args([
            "init",
            "--name",
            "other",
            "--storage",
            "other",
            "--archive",
            "other-archives",
            "--strategy",
            "modification-time",
        ])
        .assert()
        .success();

    chainvault_cmd(temp.path())
        .arg("status")
        .assert()
        .code(255)
        .stderr(predicate::str::contains("pick one with --name: main, other"));

    chainvault_cmd(temp.path())
        .args(["status", "--name", "other"])
        .assert()
        .success();

    chainvault_cmd(temp.path())
        .args(["status", "--name", "missing"])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("No backup named \"missing\""));
}

#[test]
fn commands_fail_without_config() {
    let temp = TempDir::new().unwrap();

    chainvault_cmd(temp.path())
        .arg("status")
        .assert()
        .code(255)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn unsupported_config_version_is_reported() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("chainvault.toml"),
        "[metadata]\nversion = 7\n",
    )
    .unwrap();

    chainvault_cmd(temp.path())
        .arg("status")
        .assert()
        .code(255)
        .stderr(predicate::str::contains("Unsupported configuration version: 7"));
}
