// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem scanner producing `{canonical path -> mtime}` for the
//! configured trees.
//!
//! Each configured entry is walked under its own reject patterns. Stop
//! folders (including every other configured entry) are never descended, so
//! nested entries are visited exactly once. Symlinks are neither followed
//! nor recorded. Permission problems are logged and skipped; they never
//! abort the scan.

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::config::BackupProfile;
use crate::paths;

/// Scan every configured tree of the profile, rooted at its source root.
///
/// Keys are canonical paths relative to the source root; values are mtimes
/// truncated to unix seconds (the resolution of the manifest format).
pub fn scan(profile: &BackupProfile) -> Result<BTreeMap<String, i64>> {
    let mut mtimes = BTreeMap::new();
    for (entry, patterns) in &profile.trees {
        let rejects = compile_patterns(patterns)
            .with_context(|| format!("invalid reject pattern for entry {entry}"))?;
        let before = mtimes.len();
        scan_entry(
            &profile.source_root,
            entry,
            &rejects,
            &profile.stop_folders,
            &mut mtimes,
        );
        tracing::debug!("{} files in {entry}", mtimes.len() - before);
    }
    Ok(mtimes)
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("bad regex '{p}'")))
        .collect()
}

fn scan_entry(
    root: &Path,
    entry: &str,
    rejects: &[Regex],
    stop_folders: &BTreeSet<String>,
    mtimes: &mut BTreeMap<String, i64>,
) {
    let abs = root.join(entry);

    // An entry with no reject patterns may name a single regular file.
    if rejects.is_empty() && !abs.is_dir() {
        match std::fs::symlink_metadata(&abs) {
            Ok(meta) if meta.file_type().is_file() => {
                if let Some(mtime) = mtime_secs(&meta) {
                    mtimes.insert(entry.to_string(), mtime);
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("configured path not found: {entry}");
            }
            Err(e) => {
                tracing::warn!("cannot stat {entry}: {e}");
            }
        }
        return;
    }

    let walker = WalkDir::new(&abs).follow_links(false).into_iter();
    let walker = walker.filter_entry(|e| {
        if e.depth() == 0 {
            return true;
        }
        let Some(rel) = relative_key(root, e.path()) else {
            return false;
        };
        if rejects.iter().any(|re| re.is_match(&rel)) {
            return false;
        }
        !(e.file_type().is_dir() && stop_folders.contains(&rel))
    });

    for item in walker {
        let entry_info = match item {
            Ok(entry_info) => entry_info,
            Err(e) => {
                tracing::warn!("scan error under {entry}: {e}");
                continue;
            }
        };
        if entry_info.file_type().is_symlink() || !entry_info.file_type().is_file() {
            continue;
        }
        let Some(rel) = relative_key(root, entry_info.path()) else {
            continue;
        };
        match entry_info.metadata() {
            Ok(meta) => {
                if let Some(mtime) = mtime_secs(&meta) {
                    mtimes.insert(rel, mtime);
                }
            }
            Err(e) => {
                tracing::warn!("cannot stat {rel}: {e}");
            }
        }
    }
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let key = paths::normalize(&rel.to_string_lossy());
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

fn mtime_secs(meta: &std::fs::Metadata) -> Option<i64> {
    let modified = meta.modified().ok()?;
    match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => Some(d.as_secs() as i64),
        Err(e) => Some(-(e.duration().as_secs() as i64)),
    }
}
