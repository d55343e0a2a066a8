use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn configured_dir() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("storage")).unwrap();
    fs::write(temp.path().join("storage/file.txt"), "hello").unwrap();
    fs::write(
        temp.path().join("chainvault.toml"),
        "[metadata]\nversion = 1\n\n[backups.main]\nstorage_dir = \"storage\"\narchive_dir = \"archives\"\nstrategy = \"content-hash\"\nhash_algorithm = \"sha256\"\n",
    )
    .unwrap();
    temp
}

#[test]
fn backup_is_quiet_by_default() {
    let temp = configured_dir();

    cargo_bin_cmd!("chainvault")
        .env_remove("RUST_LOG")
        .arg("-C")
        .arg(temp.path())
        .arg("backup")
        .assert()
        .success()
        .stderr(predicate::str::is_empty());
}

#[test]
fn verbose_shows_info() {
    let temp = configured_dir();

    cargo_bin_cmd!("chainvault")
        .env_remove("RUST_LOG")
        .arg("-v")
        .arg("-C")
        .arg(temp.path())
        .arg("backup")
        .assert()
        .success()
        .stderr(predicate::str::contains("INFO: Archived 1 files"))
        .stderr(predicate::str::contains("DEBUG:").not());
}

#[test]
fn double_verbose_shows_debug() {
    let temp = configured_dir();

    cargo_bin_cmd!("chainvault")
        .env_remove("RUST_LOG")
        .arg("-vv")
        .arg("-C")
        .arg(temp.path())
        .arg("backup")
        .assert()
        .success()
        .stderr(predicate::str::contains("DEBUG:"))
        .stderr(predicate::str::contains("Hashing"));
}

#[test]
fn rust_log_info_is_respected() {
    let temp = configured_dir();

    cargo_bin_cmd!("chainvault")
        .env("RUST_LOG", "info")
        .arg("-C")
        .arg(temp.path())
        .arg("backup")
        .assert()
        .success()
        .stderr(predicate::str::contains("Archived 1 files"));
}

#[test]
fn errors_are_logged_with_prefix() {
    let temp = TempDir::new().unwrap();

    cargo_bin_cmd!("chainvault")
        .env_remove("RUST_LOG")
        .arg("-C")
        .arg(temp.path())
        .arg("status")
        .assert()
        .code(255)
        .stderr(predicate::str::starts_with("ERROR: "));
}

#[test]
fn missing_directory_flag_target_fails() {
    let temp = TempDir::new().unwrap();

    cargo_bin_cmd!("chainvault")
        .env_remove("RUST_LOG")
        .arg("-C")
        .arg(temp.path().join("nope"))
        .arg("status")
        .assert()
        .code(255)
        .stderr(predicate::str::contains("Failed to change directory"));
}
