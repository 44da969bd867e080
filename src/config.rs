// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backup profile and tool settings.
//!
//! The profile (`backup_config.txt` in the backup root) is line-oriented
//! text: `#` comments and blank lines are dropped, the first payload line is
//! the source tree root, the second the comma-separated list of extensions
//! that are archived without compression, and every remaining line is
//! `subpath,reject_regex,...`. Tool settings are TOML, loaded from
//! `.incbakrc.toml` in the backup root or `~/.config/incbak/config.toml`.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::paths;

/// Profile file looked up in the backup root when `-c` is not given.
pub const DEFAULT_PROFILE_FILE: &str = "backup_config.txt";

/// A reject pattern equal to one of these promotes its entry to a stop
/// folder: the subtree is never entered.
const STOP_PATTERNS: [&str; 2] = [".+", ".*"];

/// Parsed backup profile.
///
/// `trees` maps each scannable root-relative entry to its reject patterns.
/// `stop_folders` holds every configured entry path; during traversal of one
/// entry the scanner refuses to descend into any other, so nested entries
/// are scanned exactly once, under their own reject rules.
#[derive(Debug, Clone, Default)]
pub struct BackupProfile {
    pub source_root: PathBuf,
    pub nocompress_ext: Vec<String>,
    pub trees: BTreeMap<String, Vec<String>>,
    pub stop_folders: BTreeSet<String>,
}

impl BackupProfile {
    /// Load and merge profile files in order; later files override the
    /// source root and extension list and override colliding tree entries.
    pub fn load(files: &[PathBuf]) -> Result<Self> {
        let mut source_root = None;
        let mut nocompress = Vec::new();
        let mut trees = BTreeMap::new();

        for file in files {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read profile {}", file.display()))?;
            parse_profile(&content, &mut source_root, &mut nocompress, &mut trees)
                .with_context(|| format!("invalid profile {}", file.display()))?;
        }

        let Some(source_root) = source_root else {
            bail!("no profile file defines a source root");
        };

        let stop_folders: BTreeSet<String> = trees.keys().cloned().collect();
        trees.retain(|_, patterns: &mut Vec<String>| {
            !(patterns.len() == 1 && STOP_PATTERNS.contains(&patterns[0].as_str()))
        });

        Ok(Self {
            source_root: PathBuf::from(source_root),
            nocompress_ext: nocompress,
            trees,
            stop_folders,
        })
    }

    /// Whether a path's bytes go into the compressed archive.
    pub fn is_compressible(&self, path: &str) -> bool {
        let ext = paths::extension_lower(path);
        !self.nocompress_ext.iter().any(|e| e == &ext)
    }

    /// Manifest flag char for a path.
    pub fn compress_flag(&self, path: &str) -> char {
        if self.is_compressible(path) {
            'C'
        } else {
            'N'
        }
    }
}

fn parse_profile(
    content: &str,
    source_root: &mut Option<String>,
    nocompress: &mut Vec<String>,
    trees: &mut BTreeMap<String, Vec<String>>,
) -> Result<()> {
    let payload: Vec<&str> = content
        .lines()
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();
    if payload.len() < 2 {
        bail!("profile needs a source root line and an extension line");
    }

    *source_root = Some(payload[0].to_string());
    *nocompress = payload[1]
        .split(',')
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
        .collect();

    for line in &payload[2..] {
        let mut fields = line.split(',');
        let entry = paths::normalize(fields.next().unwrap_or(""));
        if entry.is_empty() {
            continue;
        }
        let patterns: Vec<String> = fields
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .collect();
        tracing::debug!("profile entry {entry}: {patterns:?}");
        trees.insert(entry, patterns);
    }
    Ok(())
}

/// Tool settings (TOML), all optional with defaulting accessors.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Archiver binary override (default: `7z` found on PATH).
    pub archiver: Option<String>,
    /// Scratch directory base override (default: the system temp dir).
    pub workdir: Option<PathBuf>,
    /// Maximum per-kind file names printed in the backup summary.
    pub print_max_files: Option<usize>,
}

impl Settings {
    /// Load settings for a backup root.
    ///
    /// Precedence (highest to lowest):
    /// 1. `<root>/.incbakrc.toml`
    /// 2. `~/.config/incbak/config.toml`
    pub fn load_for_root(root: &Path) -> Self {
        let local = root.join(".incbakrc.toml");
        if let Some(settings) = Self::load_from_path(&local) {
            return settings;
        }

        if let Some(home) = dirs::home_dir() {
            let path = home.join(".config").join("incbak").join("config.toml");
            if let Some(settings) = Self::load_from_path(&path) {
                return settings;
            }
        }

        Self::default()
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(settings) => Some(settings),
            Err(e) => {
                eprintln!("Warning: failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Summary print cap (defaults to 100).
    pub fn print_max_files(&self) -> usize {
        self.print_max_files.unwrap_or(100)
    }
}
