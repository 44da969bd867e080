// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operation drivers, one module per CLI mode, plus the resolved run
//! context they all consume.

pub mod backup;
pub mod history;
pub mod restore;
pub mod verify;

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::catalog::{self, manifest};
use crate::cli::{Cli, Mode, OutputFormat};
use crate::config::{BackupProfile, Settings, DEFAULT_PROFILE_FILE};
use crate::paths;

/// Everything an operation needs, resolved once from the CLI.
///
/// Configuration and state are carried explicitly; nothing in the pipeline
/// reads process-global mutable state or changes the working directory.
pub struct RunContext {
    /// Canonicalized backup root (holds the profile and `archive/`).
    pub root: PathBuf,
    pub archive_dir: PathBuf,
    pub profile: BackupProfile,
    pub settings: Settings,
    pub password: Option<String>,
    /// Catalog cut-off for restore/list, unix seconds.
    pub recovery_time: Option<i64>,
    /// Filter set of canonical paths; empty means everything.
    pub recovery_files: BTreeSet<String>,
    pub overwrite: bool,
    pub delete_on_fail: bool,
    pub silent: bool,
    pub format: OutputFormat,
}

impl RunContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let root = cli
            .root
            .canonicalize()
            .with_context(|| format!("backup root {} not found", cli.root.display()))?;
        let archive_dir = root.join(catalog::ARCHIVE_DIR);
        std::fs::create_dir_all(&archive_dir)
            .with_context(|| format!("cannot create {}", archive_dir.display()))?;

        let settings = Settings::load_for_root(&root);

        let profile_files: Vec<PathBuf> = if cli.config_file.is_empty() {
            vec![root.join(DEFAULT_PROFILE_FILE)]
        } else {
            cli.config_file
                .iter()
                .map(|f| {
                    let path = Path::new(f);
                    if path.is_absolute() {
                        path.to_path_buf()
                    } else {
                        root.join(path)
                    }
                })
                .collect()
        };
        for file in &profile_files {
            tracing::info!("using profile {}", file.display());
        }
        let profile = BackupProfile::load(&profile_files)?;

        let recovery_time = match &cli.restore_time {
            Some(s) if matches!(cli.mode, Mode::Restore | Mode::List) => Some(
                manifest::parse_mtime(s)
                    .with_context(|| format!("--restore-time '{s}' is not YYYY/MM/DD-HH:MM:SS"))?,
            ),
            Some(_) => {
                tracing::warn!("--restore-time only applies to restore and list; ignored");
                None
            }
            None => None,
        };
        if cli.overwrite && cli.mode != Mode::Restore {
            tracing::warn!("--overwrite only applies to restore; ignored");
        }
        if cli.full_path && cli.mode != Mode::Restore {
            tracing::warn!("--full-path only applies to restore; ignored");
        }

        Ok(Self {
            root,
            archive_dir,
            profile,
            settings,
            password: cli.password.clone(),
            recovery_time,
            recovery_files: expand_recovery_files(&cli.recovery_files)?,
            overwrite: cli.overwrite,
            delete_on_fail: cli.delete_on_fail,
            silent: cli.silent,
            format: cli.format,
        })
    }
}

/// Expand `-f` values: a `@listfile` argument contributes one canonical
/// path per non-empty line of the referenced file.
fn expand_recovery_files(values: &[String]) -> Result<BTreeSet<String>> {
    let mut files = BTreeSet::new();
    for value in values {
        if let Some(list_path) = value.strip_prefix('@') {
            let content = std::fs::read_to_string(list_path)
                .with_context(|| format!("cannot read recovery file list {list_path}"))?;
            files.extend(
                content
                    .lines()
                    .filter(|l| !l.is_empty())
                    .map(paths::normalize),
            );
        } else {
            files.insert(paths::normalize(value));
        }
    }
    Ok(files)
}

/// Move a file across directories, falling back to copy + remove when the
/// rename crosses filesystems (the staging area usually lives on tmpfs).
pub(crate) fn move_file(src: &Path, dst: &Path) -> std::io::Result<()> {
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(e),
        Err(_) => {
            std::fs::copy(src, dst)?;
            std::fs::remove_file(src)
        }
    }
}
