use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn baloneo() -> Command {
    let mut cmd = Command::cargo_bin("baloneo").expect("binary built");
    cmd.env_remove("BALONEO_CONFIG").env("RUST_LOG", "error");
    cmd
}

#[test]
fn help_lists_commands_from_stdin() {
    baloneo()
        .write_stdin("help\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("支持的命令").and(predicate::str::contains("manifest")));
}

#[test]
fn failures_are_reported_but_not_fatal() {
    let dir = tempdir().unwrap();
    let script = dir.path().join("script.txt");
    fs::write(&script, "click 1 1\nexport out.pdf\n").unwrap();

    baloneo()
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("[错误]"));

    baloneo().arg("--strict").arg(&script).assert().code(2);
}

#[test]
fn missing_script_fails() {
    baloneo()
        .arg("/nonexistent/script.txt")
        .assert()
        .failure()
        .stderr(predicate::str::contains("无法读取脚本"));
}

#[test]
fn broken_config_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[render]\nzoom = -1.0\n").unwrap();

    baloneo()
        .arg("--config")
        .arg(&config)
        .write_stdin("status\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("尚未打开文档"));
}
