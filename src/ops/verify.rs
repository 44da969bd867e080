// SPDX-License-Identifier: MIT OR Apache-2.0

//! Verifier: re-hash the live tree against the latest reconstructed state.
//!
//! Classification of drift:
//! - **mismatched** — live bytes differ from the recorded digest;
//! - **missing** — recorded in the backup, absent from the live tree;
//! - **untracked** — on disk but not in the state, created after the last
//!   backup (ctime newer than the latest generation);
//! - **unknown** — on disk but not in the state and older than the last
//!   backup: corruption or configuration drift.

use anyhow::{bail, Context, Result};
use colored::{Color, Colorize};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::catalog::state::BackupState;
use crate::catalog::Catalog;
use crate::cli::OutputFormat;
use crate::hashing;
use crate::output;
use crate::scanner;

use super::RunContext;

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct VerifyReport {
    pub checked: usize,
    pub mismatched: Vec<String>,
    pub missing: Vec<String>,
    pub untracked: Vec<String>,
    pub unknown: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.mismatched.is_empty()
            && self.missing.is_empty()
            && self.untracked.is_empty()
            && self.unknown.is_empty()
    }
}

pub fn run(ctx: &RunContext) -> Result<()> {
    let catalog = Catalog::discover(&ctx.archive_dir, None)
        .with_context(|| format!("cannot enumerate {}", ctx.archive_dir.display()))?;
    let Some((_, latest_time)) = catalog.latest() else {
        bail!("no generations to verify against");
    };
    let state = BackupState::fold(&catalog, &ctx.archive_dir)?;
    let fresh = scanner::scan(&ctx.profile)?;

    let report = check(&state, &fresh, &ctx.profile.source_root, latest_time);

    match ctx.format {
        OutputFormat::Json => output::print_json(&report)?,
        OutputFormat::Text => print_text(&report, ctx.silent),
    }
    Ok(())
}

fn check(
    state: &BackupState,
    fresh: &BTreeMap<String, i64>,
    source_root: &Path,
    latest_time: i64,
) -> VerifyReport {
    let mut current: BTreeSet<String> = fresh.keys().cloned().collect();
    let mut report = VerifyReport {
        checked: state.len(),
        ..VerifyReport::default()
    };

    for (path, record) in &state.files {
        current.remove(path);
        match hashing::hash_file(&source_root.join(path)) {
            Ok(sha) if sha == record.sha => {}
            Ok(_) => report.mismatched.push(path.clone()),
            Err(e) => {
                if is_not_found(&e) {
                    report.missing.push(path.clone());
                } else {
                    tracing::warn!("cannot verify {path}: {e:#}");
                }
            }
        }
    }

    for path in current {
        let newer = ctime_secs(&source_root.join(&path)).map_or(false, |t| t > latest_time);
        if newer {
            report.untracked.push(path);
        } else {
            report.unknown.push(path);
        }
    }
    report
}

fn is_not_found(e: &anyhow::Error) -> bool {
    e.root_cause()
        .downcast_ref::<std::io::Error>()
        .map_or(false, |io| io.kind() == std::io::ErrorKind::NotFound)
}

#[cfg(unix)]
fn ctime_secs(path: &Path) -> Option<i64> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|m| m.ctime())
}

#[cfg(not(unix))]
fn ctime_secs(path: &Path) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let t = meta.created().or_else(|_| meta.modified()).ok()?;
    t.duration_since(std::time::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs() as i64)
}

fn print_text(report: &VerifyReport, silent: bool) {
    if report.is_clean() {
        println!(
            "{} all {} files verified",
            "✓".green(),
            report.checked
        );
        return;
    }
    output::print_group(
        "mismatched hash",
        Color::Red,
        &report.mismatched,
        usize::MAX,
        silent,
    );
    output::print_group(
        "missing (exist only in backup)",
        Color::Red,
        &report.missing,
        usize::MAX,
        silent,
    );
    output::print_group(
        "unknown (exist only on disk)",
        Color::Yellow,
        &report.unknown,
        usize::MAX,
        silent,
    );
    if !report.untracked.is_empty() {
        println!(
            "{} files added after the last backup (untracked)",
            report.untracked.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::state::FileRecord;

    fn state_entry(state: &mut BackupState, path: &str, sha: [u8; 32]) {
        state.files.insert(
            path.to_string(),
            FileRecord {
                mtime: 1000,
                sha,
                archive: "0000000000".to_string(),
                compressed: true,
                origin: None,
            },
        );
    }

    #[test]
    fn classifies_mismatch_missing_untracked_and_unknown() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("good.txt"), b"good").expect("write");
        std::fs::write(dir.path().join("bad.txt"), b"tampered").expect("write");
        std::fs::write(dir.path().join("extra.txt"), b"extra").expect("write");

        let good_sha = hashing::hash_file(&dir.path().join("good.txt")).expect("hash");
        let mut state = BackupState::default();
        state_entry(&mut state, "good.txt", good_sha);
        state_entry(&mut state, "bad.txt", [1; 32]);
        state_entry(&mut state, "gone.txt", [2; 32]);

        let fresh: BTreeMap<String, i64> = [
            ("good.txt".to_string(), 0),
            ("bad.txt".to_string(), 0),
            ("extra.txt".to_string(), 0),
        ]
        .into();

        // last backup far in the past: extra.txt counts as untracked
        let report = check(&state, &fresh, dir.path(), 0);
        assert_eq!(report.mismatched, vec!["bad.txt"]);
        assert_eq!(report.missing, vec!["gone.txt"]);
        assert_eq!(report.untracked, vec!["extra.txt"]);
        assert!(report.unknown.is_empty());

        // last backup in the future: the same file is unknown
        let report = check(&state, &fresh, dir.path(), i64::MAX);
        assert_eq!(report.unknown, vec!["extra.txt"]);
        assert!(report.untracked.is_empty());
    }

    #[test]
    fn clean_tree_reports_clean() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), b"bytes").expect("write");
        let sha = hashing::hash_file(&dir.path().join("a.txt")).expect("hash");
        let mut state = BackupState::default();
        state_entry(&mut state, "a.txt", sha);

        let fresh: BTreeMap<String, i64> = [("a.txt".to_string(), 0)].into();
        let report = check(&state, &fresh, dir.path(), 0);
        assert!(report.is_clean());
        assert_eq!(report.checked, 1);
    }
}
