// SPDX-License-Identifier: MIT OR Apache-2.0

//! Restore planner: per generation, which entries to extract from which
//! archive, and where renamed files must be moved after extraction.
//!
//! Direct entries (stored path == logical path) extract straight into the
//! working directory. Redirected entries extract their stored path into the
//! staging area and are then moved to the logical path. `list` mode prints
//! the plan instead of executing it.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

use crate::archiver::{Archiver, ExtractMode, Overwrite};
use crate::catalog::manifest::format_mtime;
use crate::catalog::state::BackupState;
use crate::catalog::{self, Catalog};
use crate::cli::OutputFormat;
use crate::output;
use crate::workdir::{self, Workdir};

use super::{move_file, RunContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Extract into the current working directory.
    Extract,
    /// Print what would be extracted.
    ListOnly,
}

/// Extraction work for one generation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct GenerationPlan {
    pub direct_compressed: Vec<String>,
    pub direct_store: Vec<String>,
    /// `(logical path, stored path)` pairs needing post-extraction moves.
    pub redirected_compressed: Vec<(String, String)>,
    pub redirected_store: Vec<(String, String)>,
}

impl GenerationPlan {
    pub fn is_empty(&self) -> bool {
        self.direct_compressed.is_empty()
            && self.direct_store.is_empty()
            && self.redirected_compressed.is_empty()
            && self.redirected_store.is_empty()
    }
}

/// Live entries whose bytes generation `id` holds, bucketed by payload
/// archive and by whether the stored path still matches the logical path.
pub fn plan_generation(
    state: &BackupState,
    id: &str,
    filter: &BTreeSet<String>,
) -> GenerationPlan {
    let mut plan = GenerationPlan::default();
    for (path, record) in &state.files {
        if record.archive != id {
            continue;
        }
        if !filter.is_empty() && !filter.contains(path) {
            continue;
        }
        match (&record.origin, record.compressed) {
            (None, true) => plan.direct_compressed.push(path.clone()),
            (None, false) => plan.direct_store.push(path.clone()),
            (Some(origin), true) => plan
                .redirected_compressed
                .push((path.clone(), origin.clone())),
            (Some(origin), false) => plan.redirected_store.push((path.clone(), origin.clone())),
        }
    }
    plan
}

#[derive(Debug, Serialize)]
struct ListRow {
    path: String,
    generation: String,
    flag: char,
    mtime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<String>,
}

pub fn run(ctx: &RunContext, mode: ReportMode) -> Result<()> {
    let catalog = Catalog::discover(&ctx.archive_dir, ctx.recovery_time)
        .with_context(|| format!("cannot enumerate {}", ctx.archive_dir.display()))?;
    let state = BackupState::fold(&catalog, &ctx.archive_dir)?;

    match mode {
        ReportMode::ListOnly => print_report(ctx, &catalog, &state),
        ReportMode::Extract => extract_all(ctx, &catalog, &state),
    }
}

fn print_report(ctx: &RunContext, catalog: &Catalog, state: &BackupState) -> Result<()> {
    let mut rows = Vec::new();
    for id in catalog.ids() {
        let plan = plan_generation(state, id, &ctx.recovery_files);
        let direct = plan
            .direct_compressed
            .into_iter()
            .map(|p| (p, true, None))
            .chain(plan.direct_store.into_iter().map(|p| (p, false, None)));
        let redirected = plan
            .redirected_compressed
            .into_iter()
            .map(|(p, o)| (p, true, Some(o)))
            .chain(
                plan.redirected_store
                    .into_iter()
                    .map(|(p, o)| (p, false, Some(o))),
            );
        for (path, compressed, origin) in direct.chain(redirected) {
            let mtime = state.files[&path].mtime;
            rows.push(ListRow {
                path,
                generation: id.to_string(),
                flag: if compressed { 'C' } else { 'N' },
                mtime: format_mtime(mtime),
                origin,
            });
        }
    }

    match ctx.format {
        OutputFormat::Json => output::print_json(&rows)?,
        OutputFormat::Text => {
            for row in &rows {
                match &row.origin {
                    Some(origin) => println!(
                        "{},{},{},{},{}",
                        row.path, row.generation, row.flag, row.mtime, origin
                    ),
                    None => println!("{},{},{},{}", row.path, row.generation, row.flag, row.mtime),
                }
            }
        }
    }
    Ok(())
}

fn extract_all(ctx: &RunContext, catalog: &Catalog, state: &BackupState) -> Result<()> {
    let cwd = std::env::current_dir().context("cannot resolve current directory")?;
    println!("Restoring into {}", cwd.display());

    let archiver = Archiver::locate(ctx.settings.archiver.as_deref(), ctx.password.clone())?;
    let workdir = Workdir::create(ctx.settings.workdir.as_deref())?;
    let staging = workdir.staging()?;
    let overwrite = if ctx.overwrite {
        Overwrite::Replace
    } else {
        Overwrite::Skip
    };

    for id in catalog.ids() {
        let plan = plan_generation(state, id, &ctx.recovery_files);
        if plan.is_empty() {
            continue;
        }

        let direct = [
            (plan.direct_compressed, true, "rc"),
            (plan.direct_store, false, "rn"),
        ];
        for (bucket, compressed, prefix) in direct {
            if bucket.is_empty() {
                continue;
            }
            let Some(archive) = existing_archive(ctx, id, compressed) else {
                continue;
            };
            let list_file = workdir.list_file(prefix, id);
            workdir::write_list_file(&list_file, &bucket)?;
            if let Err(e) = archiver.extract_list(
                &archive,
                &list_file,
                ExtractMode::FullPath,
                overwrite,
                None,
                &cwd,
            ) {
                tracing::error!("generation {id}: {e:#}");
            }
        }

        let redirected = [
            (plan.redirected_compressed, true, "rcm"),
            (plan.redirected_store, false, "rnm"),
        ];
        for (bucket, compressed, prefix) in redirected {
            if bucket.is_empty() {
                continue;
            }
            let Some(archive) = existing_archive(ctx, id, compressed) else {
                continue;
            };
            let origins: Vec<String> = bucket.iter().map(|(_, origin)| origin.clone()).collect();
            let list_file = workdir.list_file(prefix, id);
            workdir::write_list_file(&list_file, &origins)?;
            match archiver.extract_list(
                &archive,
                &list_file,
                ExtractMode::FullPath,
                overwrite,
                Some(&staging),
                &cwd,
            ) {
                Ok(()) => relocate(&staging, &bucket, &cwd),
                Err(e) => tracing::error!("generation {id}: {e:#}"),
            }
        }
    }

    report_unmoved(&staging);
    Ok(())
}

fn existing_archive(ctx: &RunContext, id: &str, compressed: bool) -> Option<std::path::PathBuf> {
    let archive = catalog::archive_volume(&ctx.archive_dir, id, compressed);
    if archive.is_file() {
        Some(archive)
    } else {
        println!("{} not found, skipping", archive.display());
        None
    }
}

/// Move staged files to their logical paths, creating intermediate
/// directories. A file missing from the staging tree is reported, not
/// fatal.
fn relocate(staging: &Path, bucket: &[(String, String)], cwd: &Path) {
    for (logical, origin) in bucket {
        let src = staging.join(origin);
        let dst = cwd.join(logical);
        if let Some(parent) = dst.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!("cannot create {}: {e}", parent.display());
                continue;
            }
        }
        match move_file(&src, &dst) {
            Ok(()) => tracing::debug!("relocated {origin} -> {logical}"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                println!("missing in staging: {origin} (wanted at {logical})");
            }
            Err(e) => tracing::error!("cannot move {origin} -> {logical}: {e}"),
        }
    }
}

fn report_unmoved(staging: &Path) {
    let leftovers: Vec<String> = WalkDir::new(staging)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().display().to_string())
        .collect();
    if !leftovers.is_empty() {
        tracing::error!("unmoved files left in staging: {leftovers:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::state::FileRecord;

    fn record(archive: &str, compressed: bool, origin: Option<&str>) -> FileRecord {
        FileRecord {
            mtime: 1000,
            sha: [0; 32],
            archive: archive.to_string(),
            compressed,
            origin: origin.map(str::to_string),
        }
    }

    #[test]
    fn buckets_split_by_payload_and_origin() {
        let mut state = BackupState::default();
        state.files.insert("a.txt".into(), record("0000000000", true, None));
        state.files.insert("b.jpg".into(), record("0000000000", false, None));
        state
            .files
            .insert("c.txt".into(), record("0000000000", true, Some("old/c.txt")));
        state.files.insert("d.txt".into(), record("0000000001", true, None));

        let plan = plan_generation(&state, "0000000000", &BTreeSet::new());
        assert_eq!(plan.direct_compressed, vec!["a.txt"]);
        assert_eq!(plan.direct_store, vec!["b.jpg"]);
        assert_eq!(
            plan.redirected_compressed,
            vec![("c.txt".to_string(), "old/c.txt".to_string())]
        );
        assert!(plan.redirected_store.is_empty());

        let later = plan_generation(&state, "0000000001", &BTreeSet::new());
        assert_eq!(later.direct_compressed, vec!["d.txt"]);
    }

    #[test]
    fn filter_restricts_the_plan() {
        let mut state = BackupState::default();
        state.files.insert("a.txt".into(), record("0000000000", true, None));
        state.files.insert("b.txt".into(), record("0000000000", true, None));

        let filter: BTreeSet<String> = ["b.txt".to_string()].into();
        let plan = plan_generation(&state, "0000000000", &filter);
        assert_eq!(plan.direct_compressed, vec!["b.txt"]);
    }
}
