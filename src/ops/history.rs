// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-file version extraction.
//!
//! For each requested logical path, every generation that stored its bytes
//! (an ADD or UPDATE record; moves store nothing) is extracted flattened
//! and filed under `<path>/<generation id>` in the current directory.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::archiver::{Archiver, Overwrite};
use crate::catalog::manifest::{self, ManifestRecord};
use crate::catalog::{self, Catalog, MANIFEST_FILE};
use crate::errors::CatalogError;

use super::{move_file, RunContext};

pub fn run(ctx: &RunContext) -> Result<()> {
    if ctx.recovery_files.is_empty() {
        bail!("history mode needs --recovery-files");
    }

    let catalog = Catalog::discover(&ctx.archive_dir, None)
        .with_context(|| format!("cannot enumerate {}", ctx.archive_dir.display()))?;
    let archiver = Archiver::locate(ctx.settings.archiver.as_deref(), ctx.password.clone())?;
    let cwd = std::env::current_dir().context("cannot resolve current directory")?;
    println!("Writing versions into {}", cwd.display());

    for path in &ctx.recovery_files {
        std::fs::create_dir_all(cwd.join(path))
            .with_context(|| format!("cannot create version directory {path}"))?;
    }

    for id in catalog.ids() {
        let manifest_path = catalog::generation_dir(&ctx.archive_dir, id).join(MANIFEST_FILE);
        let records =
            manifest::read(&manifest_path).map_err(|source| CatalogError::UnreadableManifest {
                generation: id.to_string(),
                source,
            })?;

        for record in records {
            let (path, compressed) = match &record {
                ManifestRecord::Add {
                    path, compressed, ..
                }
                | ManifestRecord::Update {
                    path, compressed, ..
                } => (path, *compressed),
                _ => continue,
            };
            if !ctx.recovery_files.contains(path) {
                continue;
            }

            let archive = catalog::archive_volume(&ctx.archive_dir, id, compressed);
            if !archive.is_file() {
                println!("{} not found, skipping", archive.display());
                continue;
            }
            if let Err(e) = archiver.extract_one(&archive, path, Overwrite::Replace, &cwd) {
                tracing::error!("generation {id}: {e:#}");
                continue;
            }

            let Some(base) = Path::new(path).file_name() else {
                continue;
            };
            let dst = cwd.join(path).join(id);
            match move_file(&cwd.join(base), &dst) {
                Ok(()) => println!("{path} @ {id}"),
                Err(e) => tracing::error!("cannot file version {id} of {path}: {e}"),
            }
        }
    }
    Ok(())
}
