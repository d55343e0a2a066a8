use assert_cmd::{Command, cargo::cargo_bin_cmd};
use filetime::{FileTime, set_file_mtime};
use std::fs;
use std::path::Path;
use std::process::Output;

/// A `chainvault` command running in `cwd`, with logging at its default level
/// regardless of the caller's environment.
pub fn chainvault_cmd(cwd: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("chainvault");
    cmd.env_remove("RUST_LOG");
    cmd.arg("-C").arg(cwd);
    cmd
}

/// Creates `storage/` in `cwd` and registers a backup named `main` that
/// archives it into `archives/`.
pub fn init_backup(cwd: &Path, extra_args: &[&str]) {
    fs::create_dir_all(cwd.join("storage")).unwrap();
    chainvault_cmd(cwd)
        .args([
            "init",
            "--name",
            "main",
            "--storage",
            "storage",
            "--archive",
            "archives",
        ])
        .args(extra_args)
        .assert()
        .success();
}

// Each integration test file is compiled as its own crate, so helpers that
// only some of them use are unused in the others.
#[allow(dead_code)]
pub fn write_with_mtime(path: &Path, content: &str, seconds: i64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
    set_file_mtime(path, FileTime::from_unix_time(seconds, 0)).unwrap();
}

#[allow(dead_code)]
pub fn status_output(cwd: &Path) -> Output {
    chainvault_cmd(cwd)
        .arg("status")
        .output()
        .expect("failed to run `chainvault status`")
}

#[allow(dead_code)]
pub fn extract_fingerprint(stdout: &[u8]) -> String {
    let output = std::str::from_utf8(stdout).expect("status stdout should be UTF-8");
    output
        .lines()
        .find_map(|line| line.strip_prefix("Fingerprint: "))
        .expect("fingerprint not found in output")
        .to_string()
}

#[allow(dead_code)]
pub fn backup(cwd: &Path) {
    chainvault_cmd(cwd).arg("backup").assert().success();
}
