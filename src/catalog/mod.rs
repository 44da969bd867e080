// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation catalog: the append-only sequence of backup generations under
//! `<root>/archive/`, each a 10-digit `YYYYMMDDNN` directory holding a
//! manifest and up to two archive payloads.

pub mod manifest;
pub mod state;

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::errors::CatalogError;

/// Archive directory name under the backup root.
pub const ARCHIVE_DIR: &str = "archive";

/// Manifest file name inside each generation directory.
pub const MANIFEST_FILE: &str = "fileinfo.txt";

/// Compressed payload archive name.
pub const COMP_ARCHIVE: &str = "comp_arch.7z";

/// Store-only payload archive name.
pub const NOCOMP_ARCHIVE: &str = "nocomp_arch.7z";

/// Extension of the first split volume, the one handed to the extractor.
pub const FIRST_VOLUME_EXT: &str = ".001";

static GENERATION_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{10}$").expect("static pattern"));

/// Known generations, id -> directory mtime in unix seconds.
///
/// Iteration order is ascending by id, which is creation order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    generations: BTreeMap<String, i64>,
}

impl Catalog {
    /// Enumerate generation directories, keeping those with mtime at or
    /// before `cutoff` when one is given.
    pub fn discover(archive_dir: &Path, cutoff: Option<i64>) -> std::io::Result<Self> {
        let mut generations = BTreeMap::new();
        for entry in std::fs::read_dir(archive_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !GENERATION_ID.is_match(name) || !entry.path().is_dir() {
                continue;
            }
            let mtime = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            if cutoff.map_or(true, |limit| mtime <= limit) {
                tracing::debug!("generation {name} at {mtime}");
                generations.insert(name.to_string(), mtime);
            }
        }
        Ok(Self { generations })
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    /// Generation ids in ascending (creation) order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.generations.keys().map(String::as_str)
    }

    /// Most recent generation and its directory mtime.
    pub fn latest(&self) -> Option<(&str, i64)> {
        self.generations
            .iter()
            .next_back()
            .map(|(id, t)| (id.as_str(), *t))
    }

    /// Smallest free id for the given `YYYYMMDD` date.
    pub fn next_id(&self, date: &str) -> Result<String, CatalogError> {
        for seq in 0..100 {
            let id = format!("{date}{seq:02}");
            if !self.generations.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(CatalogError::DateExhausted {
            date: date.to_string(),
        })
    }
}

/// Directory of one generation.
pub fn generation_dir(archive_dir: &Path, id: &str) -> PathBuf {
    archive_dir.join(id)
}

/// Path of one generation's first archive volume.
pub fn archive_volume(archive_dir: &Path, id: &str, compressed: bool) -> PathBuf {
    let name = if compressed { COMP_ARCHIVE } else { NOCOMP_ARCHIVE };
    generation_dir(archive_dir, id).join(format!("{name}{FIRST_VOLUME_EXT}"))
}
