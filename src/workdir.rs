// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-run scratch directory.
//!
//! Holds the file lists handed to the archiver and, during restore, the
//! staging area into which renamed files are extracted before being moved
//! to their logical paths. Removed when the run ends.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub struct Workdir {
    path: PathBuf,
}

impl Workdir {
    /// Create the scratch directory under `base` (the system temp dir when
    /// not configured). The name carries the pid so concurrent runs against
    /// different roots cannot collide.
    pub fn create(base: Option<&Path>) -> Result<Self> {
        let base = base
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        let path = base.join(format!("incbak-work-{}", std::process::id()));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create workdir {}", path.display()))?;
        Ok(Self { path })
    }

    /// Staging area for redirected (renamed-file) extraction.
    pub fn staging(&self) -> Result<PathBuf> {
        let dir = self.path.join("staging");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// Path of a per-generation archiver file list, e.g. `bc_<id>.txt`.
    pub fn list_file(&self, prefix: &str, generation: &str) -> PathBuf {
        self.path.join(format!("{prefix}_{generation}.txt"))
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!("leaving workdir {} behind: {e}", self.path.display());
        }
    }
}

/// Write one archiver file list, one quoted path per line.
pub fn write_list_file(path: &Path, entries: &[String]) -> Result<()> {
    let mut body = String::new();
    for entry in entries {
        body.push_str(&crate::paths::quote(entry));
        body.push('\n');
    }
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}
