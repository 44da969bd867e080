// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end manifest behavior through the binary, using `empty` mode so
//! no archiver is needed.

use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
}

/// Backup root with a profile pointing at a sibling source tree.
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

fn generations(root: &Path) -> Vec<String> {
    let mut ids: Vec<String> = fs::read_dir(root.join("archive"))
        .expect("read archive dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
        .collect();
    ids.sort();
    ids
}

fn manifest(root: &Path, id: &str) -> String {
    fs::read_to_string(root.join("archive").join(id).join("fileinfo.txt")).expect("read manifest")
}

#[test]
fn initial_backup_records_adds_with_partition_flags() {
    let (_dir, root, src) = setup();
    write_file(&src.join("docs/a.txt"), b"hello\n");
    write_file(&src.join("docs/img.jpg"), &[0u8; 1024]);

    incbak("empty", &root).assert().success();

    let ids = generations(&root);
    assert_eq!(ids.len(), 1);
    let manifest = manifest(&root, &ids[0]);
    let mut lines = manifest.lines();
    assert!(lines.next().expect("header").starts_with('#'));

    let records: Vec<&str> = lines.collect();
    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|l| l.starts_with(",\"docs/a.txt\",")
        && l.contains(",C,")
        && l.ends_with("5891B5B522D5DF086D0FF0B110FBD9D21BB4FC7163AF34D08286A2E846F6BE03")));
    assert!(records
        .iter()
        .any(|l| l.starts_with(",\"docs/img.jpg\",") && l.contains(",N,")));
}

#[test]
fn unchanged_tree_produces_no_new_generation() {
    let (_dir, root, src) = setup();
    write_file(&src.join("docs/a.txt"), b"hello\n");

    incbak("empty", &root).assert().success();
    incbak("empty", &root)
        .assert()
        .success()
        .stdout(contains("Nothing to back up."));

    assert_eq!(generations(&root).len(), 1);
}

#[test]
fn rename_is_recorded_as_a_single_move() {
    let (_dir, root, src) = setup();
    write_file(&src.join("docs/a.txt"), b"hello\n");
    incbak("empty", &root).assert().success();

    fs::create_dir_all(src.join("docs/sub")).expect("mkdir");
    fs::rename(src.join("docs/a.txt"), src.join("docs/sub/a.txt")).expect("rename");
    incbak("empty", &root).assert().success();

    let ids = generations(&root);
    assert_eq!(ids.len(), 2);
    let records: Vec<String> = manifest(&root, &ids[1])
        .lines()
        .skip(1)
        .map(str::to_string)
        .collect();
    assert_eq!(records.len(), 1, "expected exactly one MOVE record: {records:?}");
    assert!(records[0].starts_with("\"docs/a.txt\",\"docs/sub/a.txt\","));
    assert!(records[0]
        .ends_with("5891B5B522D5DF086D0FF0B110FBD9D21BB4FC7163AF34D08286A2E846F6BE03"));
}

#[test]
fn delete_then_readd_rebinds_the_newest_generation() {
    let (_dir, root, src) = setup();
    write_file(&src.join("docs/a.txt"), b"hello\n");
    incbak("empty", &root).assert().success();

    fs::remove_file(src.join("docs/a.txt")).expect("remove");
    incbak("empty", &root).assert().success();

    write_file(&src.join("docs/a.txt"), b"reborn\n");
    incbak("empty", &root).assert().success();

    let ids = generations(&root);
    assert_eq!(ids.len(), 3);
    assert!(manifest(&root, &ids[1]).contains("\"docs/a.txt\",,-1,"));

    // the reconstructed view maps the path to the newest generation
    incbak("list", &root)
        .assert()
        .success()
        .stdout(contains(format!("docs/a.txt,{},C,", ids[2])));
}

#[test]
fn reject_patterns_keep_files_out_of_the_manifest() {
    let (_dir, root, src) = setup();
    write_file(
        &root.join("backup_config.txt"),
        format!(
            "{}/\njpg\ndocs/,\\.tmp$\n",
            src.display()
        )
        .as_bytes(),
    );
    write_file(&src.join("docs/keep.txt"), b"keep\n");
    write_file(&src.join("docs/drop.tmp"), b"drop\n");

    incbak("empty", &root).assert().success();

    let ids = generations(&root);
    let manifest = manifest(&root, &ids[0]);
    assert!(manifest.contains("docs/keep.txt"));
    assert!(!manifest.contains("docs/drop.tmp"));
}
