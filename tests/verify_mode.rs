// SPDX-License-Identifier: MIT OR Apache-2.0

//! `verify` mode: drift classification against the latest recorded state.

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
}

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path().join("root");
    let src = dir.path().join("src");
    fs::create_dir_all(&root).expect("mkdir root");
    fs::create_dir_all(src.join("docs")).expect("mkdir src");
    write_file(
        &root.join("backup_config.txt"),
        format!(
            "# test profile\n{}/\njpg,jpeg,mp3,mp4\ndocs/\n",
            src.display()
        )
        .as_bytes(),
    );
    (dir, root, src)
}

fn incbak(mode: &str, root: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("incbak"));
    cmd.arg(mode).arg(root);
    cmd
}

fn verify_json(root: &Path) -> Value {
    let assert = incbak("verify", root)
        .args(["--format", "json"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8 stdout");
    serde_json::from_str(&stdout).expect("verify json")
}

#[test]
fn clean_tree_verifies_clean() {
    let (_dir, root, src) = setup();
    write_file(&src.join("docs/a.txt"), b"hello\n");
    write_file(&src.join("docs/img.jpg"), &[3u8; 256]);
    incbak("empty", &root).assert().success();

    incbak("verify", &root)
        .assert()
        .success()
        .stdout(contains("all 2 files verified"));
}

#[test]
fn file_created_after_the_backup_is_untracked() {
    let (_dir, root, src) = setup();
    write_file(&src.join("docs/a.txt"), b"hello\n");
    incbak("empty", &root).assert().success();

    // ctime must land in a later second than the generation directory
    std::thread::sleep(std::time::Duration::from_secs(2));
    write_file(&src.join("docs/new.txt"), b"added later\n");

    let report = verify_json(&root);
    assert_eq!(report["untracked"], serde_json::json!(["docs/new.txt"]));
    assert_eq!(report["unknown"], serde_json::json!([]));
    assert_eq!(report["missing"], serde_json::json!([]));
}

#[test]
fn tampered_and_removed_files_are_classified() {
    let (_dir, root, src) = setup();
    write_file(&src.join("docs/a.txt"), b"hello\n");
    write_file(&src.join("docs/b.txt"), b"stable\n");
    incbak("empty", &root).assert().success();

    write_file(&src.join("docs/a.txt"), b"tampered\n");
    fs::remove_file(src.join("docs/b.txt")).expect("remove");

    let report = verify_json(&root);
    assert_eq!(report["mismatched"], serde_json::json!(["docs/a.txt"]));
    assert_eq!(report["missing"], serde_json::json!(["docs/b.txt"]));
    assert_eq!(report["checked"], 2);
}

#[test]
fn verify_without_generations_fails() {
    let (_dir, root, _src) = setup();
    incbak("verify", &root).assert().failure();
}
