// SPDX-License-Identifier: MIT OR Apache-2.0

//! Difference detector: classify a fresh scan against the reconstructed
//! prior state, with content-hash-based move detection.

use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::catalog::state::BackupState;
use crate::hashing;

/// A fresh mtime older than the recorded one by more than this is a change.
/// Coarse-resolution filesystems can report an older mtime for an untouched
/// file after a copy or a timezone shift.
pub const TOLERANCE_OLDER_SECS: i64 = 2;

/// A fresh mtime newer than the recorded one by more than this is a change.
pub const TOLERANCE_NEWER_SECS: i64 = 1;

/// Classified changes of one backup run.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Newly appearing paths with their content digest.
    pub added: BTreeMap<String, [u8; 32]>,
    /// Paths present before and after whose mtime moved beyond tolerance.
    pub updated: Vec<String>,
    /// Paths that disappeared.
    pub deleted: Vec<String>,
    /// `(source, destination)` pairs whose bytes are identical.
    pub moved: Vec<(String, String)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.moved.is_empty()
    }
}

fn mtime_changed(prior: i64, fresh: i64) -> bool {
    prior - fresh > TOLERANCE_OLDER_SECS || fresh - prior > TOLERANCE_NEWER_SECS
}

/// Compare the prior state against a fresh scan.
///
/// Every added path is hashed (relative to `source_root`); a path whose
/// hash cannot be computed is dropped from the add set. A deleted path
/// whose recorded digest matches an added path's digest is reclassified as
/// a move; ties resolve to the first match in lexicographic order.
pub fn compute(
    state: &BackupState,
    fresh: &BTreeMap<String, i64>,
    source_root: &Path,
) -> ChangeSet {
    let mut changes = ChangeSet::default();

    let mut add_candidates = Vec::new();
    for (path, mtime) in fresh {
        match state.files.get(path) {
            None => add_candidates.push(path.clone()),
            Some(record) => {
                if mtime_changed(record.mtime, *mtime) {
                    changes.updated.push(path.clone());
                }
            }
        }
    }

    changes.added = hash_added(&add_candidates, source_root);

    for path in state.files.keys() {
        if !fresh.contains_key(path) {
            changes.deleted.push(path.clone());
        }
    }

    detect_moves(state, &mut changes);
    changes
}

fn hash_added(candidates: &[String], source_root: &Path) -> BTreeMap<String, [u8; 32]> {
    let bar = ProgressBar::new(candidates.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("hashing {pos}/{len} added files")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut added = BTreeMap::new();
    for path in candidates {
        match hashing::hash_file(&source_root.join(path)) {
            Ok(sha) => {
                added.insert(path.clone(), sha);
            }
            Err(e) => {
                tracing::debug!("dropping unreadable added file {path}: {e:#}");
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    added
}

/// Pair deletions with additions that carry the same digest.
fn detect_moves(state: &BackupState, changes: &mut ChangeSet) {
    let mut by_sha: HashMap<[u8; 32], Vec<String>> = HashMap::new();
    for (path, sha) in &changes.added {
        by_sha.entry(*sha).or_default().push(path.clone());
    }

    let mut surviving_deletes = Vec::new();
    for src in changes.deleted.drain(..) {
        let sha = state.files[&src].sha;
        let dst = by_sha.get_mut(&sha).and_then(|dsts| {
            if dsts.is_empty() {
                None
            } else {
                Some(dsts.remove(0))
            }
        });
        match dst {
            Some(dst) => {
                tracing::debug!("moved file {src} -> {dst}");
                changes.added.remove(&dst);
                changes.moved.push((src, dst));
            }
            None => surviving_deletes.push(src),
        }
    }
    changes.deleted = surviving_deletes;
}
