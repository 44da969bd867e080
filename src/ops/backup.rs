// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backup driver: scan, diff against the reconstructed state, write the
//! new generation's manifest, and archive its payload.
//!
//! `empty` mode stops after the manifest; it records the current state of
//! the tree without storing any bytes.

use anyhow::{bail, Context, Result};
use chrono::Local;
use colored::Color;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use crate::archiver::{Archiver, Compression};
use crate::catalog::manifest::{self, ManifestRecord};
use crate::catalog::state::BackupState;
use crate::catalog::{self, Catalog, COMP_ARCHIVE, MANIFEST_FILE, NOCOMP_ARCHIVE};
use crate::diff::{self, ChangeSet};
use crate::output;
use crate::scanner;
use crate::workdir::{self, Workdir};

use super::RunContext;

pub fn run(ctx: &RunContext, archive_payload: bool) -> Result<()> {
    let scan_started = Instant::now();
    let fresh = scanner::scan(&ctx.profile)?;
    println!(
        "Scanned {} files in {:.2} s",
        fresh.len(),
        scan_started.elapsed().as_secs_f64()
    );

    let catalog = Catalog::discover(&ctx.archive_dir, None)
        .with_context(|| format!("cannot enumerate {}", ctx.archive_dir.display()))?;
    let state = BackupState::fold(&catalog, &ctx.archive_dir)?;
    let changes = diff::compute(&state, &fresh, &ctx.profile.source_root);
    if changes.is_empty() {
        println!("Nothing to back up.");
        return Ok(());
    }

    let date = Local::now().format("%Y%m%d").to_string();
    let id = catalog.next_id(&date)?;
    let gen_dir = catalog::generation_dir(&ctx.archive_dir, &id);
    std::fs::create_dir_all(&gen_dir)
        .with_context(|| format!("cannot create generation {id}"))?;
    tracing::info!("created generation {id}");

    let records = build_records(ctx, &changes, &fresh);
    manifest::write(&gen_dir.join(MANIFEST_FILE), &records)?;

    let archive_ok = if archive_payload {
        archive_payloads(ctx, &id, &gen_dir, &records)?
    } else {
        true
    };

    print_summary(ctx, &changes);

    if !archive_ok {
        if ctx.delete_on_fail {
            std::fs::remove_dir_all(&gen_dir)
                .with_context(|| format!("cannot remove failed generation {id}"))?;
            bail!("archiver failed; generation {id} removed");
        }
        bail!("archiver failed; partial generation {id} retained");
    }
    Ok(())
}

/// Assemble the manifest in ADD, UPDATE, DELETE, MOVE order.
///
/// Updated and moved files are re-hashed here, at manifest-write time; a
/// file that cannot be read any more is logged and dropped from the
/// manifest.
fn build_records(
    ctx: &RunContext,
    changes: &ChangeSet,
    fresh: &BTreeMap<String, i64>,
) -> Vec<ManifestRecord> {
    let root = &ctx.profile.source_root;
    let mut records = Vec::new();

    for (path, sha) in &changes.added {
        let Some(&mtime) = fresh.get(path) else {
            continue;
        };
        records.push(ManifestRecord::Add {
            path: path.clone(),
            mtime,
            compressed: ctx.profile.is_compressible(path),
            sha: *sha,
        });
    }

    for path in &changes.updated {
        let Some(&mtime) = fresh.get(path) else {
            continue;
        };
        match crate::hashing::hash_file(&root.join(path)) {
            Ok(sha) => records.push(ManifestRecord::Update {
                path: path.clone(),
                mtime,
                compressed: ctx.profile.is_compressible(path),
                sha,
            }),
            Err(e) => tracing::warn!("dropping updated file {path} from manifest: {e:#}"),
        }
    }

    for path in &changes.deleted {
        records.push(ManifestRecord::Delete {
            path: path.clone(),
            compressed: ctx.profile.is_compressible(path),
        });
    }

    for (from, to) in &changes.moved {
        let Some(&mtime) = fresh.get(to) else {
            continue;
        };
        match crate::hashing::hash_file(&root.join(to)) {
            Ok(sha) => records.push(ManifestRecord::Move {
                from: from.clone(),
                to: to.clone(),
                mtime,
                compressed: ctx.profile.is_compressible(from),
                sha,
            }),
            Err(e) => tracing::warn!("dropping moved file {to} from manifest: {e:#}"),
        }
    }

    records
}

/// Paths whose bytes this generation must store: ADD and UPDATE records.
/// DELETE and MOVE reference bytes already held by earlier generations.
fn partition(records: &[ManifestRecord]) -> (Vec<String>, Vec<String>) {
    let mut compressed = Vec::new();
    let mut store_only = Vec::new();
    for record in records {
        if let ManifestRecord::Add {
            path,
            compressed: c,
            ..
        }
        | ManifestRecord::Update {
            path,
            compressed: c,
            ..
        } = record
        {
            if *c {
                compressed.push(path.clone());
            } else {
                store_only.push(path.clone());
            }
        }
    }
    (compressed, store_only)
}

fn archive_payloads(
    ctx: &RunContext,
    id: &str,
    gen_dir: &Path,
    records: &[ManifestRecord],
) -> Result<bool> {
    let (compressed, store_only) = partition(records);
    if compressed.is_empty() && store_only.is_empty() {
        return Ok(true);
    }

    let archiver = Archiver::locate(ctx.settings.archiver.as_deref(), ctx.password.clone())?;
    let workdir = Workdir::create(ctx.settings.workdir.as_deref())?;
    let mut ok = true;

    let partitions = [
        (compressed, "bc", COMP_ARCHIVE, Compression::Fast),
        (store_only, "bn", NOCOMP_ARCHIVE, Compression::Store),
    ];
    for (paths, prefix, archive_name, level) in partitions {
        if paths.is_empty() {
            continue;
        }
        println!("archiving {} files into {archive_name}", paths.len());
        let list_file = workdir.list_file(prefix, id);
        workdir::write_list_file(&list_file, &paths)?;
        if let Err(e) = archiver.create(
            &gen_dir.join(archive_name),
            level,
            &list_file,
            &ctx.profile.source_root,
        ) {
            tracing::error!("{e:#}");
            ok = false;
        }
    }
    Ok(ok)
}

fn print_summary(ctx: &RunContext, changes: &ChangeSet) {
    let cap = ctx.settings.print_max_files();
    let added: Vec<String> = changes.added.keys().cloned().collect();
    let moved: Vec<String> = changes
        .moved
        .iter()
        .map(|(from, to)| format!("{from} -> {to}"))
        .collect();
    output::print_group("added", Color::Green, &added, cap, ctx.silent);
    output::print_group("updated", Color::Yellow, &changes.updated, cap, ctx.silent);
    output::print_group("deleted", Color::Red, &changes.deleted, cap, ctx.silent);
    output::print_group("moved", Color::Cyan, &moved, cap, ctx.silent);
}
