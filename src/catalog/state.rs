// SPDX-License-Identifier: MIT OR Apache-2.0

//! State reconstructor: folds an ordered prefix of generation manifests
//! into the live view of the backed-up tree.
//!
//! Every live path maps to exactly one record. A record knows which
//! generation physically holds its bytes (`archive`), in which of the two
//! payload archives (`compressed`), and under which stored path if the file
//! has been renamed since it was stored (`origin`, `None` while the logical
//! path and the stored path coincide).

use std::collections::BTreeMap;
use std::path::Path;

use super::manifest::{self, ManifestRecord};
use super::{Catalog, MANIFEST_FILE};
use crate::errors::CatalogError;

/// Live attributes of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub mtime: i64,
    pub sha: [u8; 32],
    /// Generation id whose archive holds the bytes.
    pub archive: String,
    /// Compressed vs store-only payload of that generation.
    pub compressed: bool,
    /// Stored path inside the archive when it differs from the logical path.
    pub origin: Option<String>,
}

/// The live view after folding generations in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct BackupState {
    pub files: BTreeMap<String, FileRecord>,
}

impl BackupState {
    /// Fold every generation of the catalog.
    pub fn fold(catalog: &Catalog, archive_dir: &Path) -> Result<Self, CatalogError> {
        let mut state = Self::default();
        for id in catalog.ids() {
            let path = super::generation_dir(archive_dir, id).join(MANIFEST_FILE);
            let records =
                manifest::read(&path).map_err(|source| CatalogError::UnreadableManifest {
                    generation: id.to_string(),
                    source,
                })?;
            state.apply(id, &records)?;
        }
        Ok(state)
    }

    /// Apply one generation's records on top of the current state.
    ///
    /// MOVE and DELETE must reference a live path; anything else means the
    /// catalog is corrupt and the fold stops.
    pub fn apply(&mut self, generation: &str, records: &[ManifestRecord]) -> Result<(), CatalogError> {
        for record in records {
            match record {
                ManifestRecord::Add {
                    path,
                    mtime,
                    compressed,
                    sha,
                }
                | ManifestRecord::Update {
                    path,
                    mtime,
                    compressed,
                    sha,
                } => {
                    self.files.insert(
                        path.clone(),
                        FileRecord {
                            mtime: *mtime,
                            sha: *sha,
                            archive: generation.to_string(),
                            compressed: *compressed,
                            origin: None,
                        },
                    );
                }
                ManifestRecord::Move { from, to, mtime, .. } => {
                    let source =
                        self.files
                            .remove(from)
                            .ok_or_else(|| CatalogError::MissingPath {
                                generation: generation.to_string(),
                                path: from.clone(),
                            })?;
                    let origin = source.origin.unwrap_or_else(|| from.clone());
                    // a rename chain that lands back on the stored path
                    // needs no redirection at restore time
                    let origin = if origin == *to { None } else { Some(origin) };
                    self.files.insert(
                        to.clone(),
                        FileRecord {
                            mtime: *mtime,
                            sha: source.sha,
                            archive: source.archive,
                            compressed: source.compressed,
                            origin,
                        },
                    );
                }
                ManifestRecord::Delete { path, .. } => {
                    self.files
                        .remove(path)
                        .ok_or_else(|| CatalogError::MissingPath {
                            generation: generation.to_string(),
                            path: path.clone(),
                        })?;
                }
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(path: &str, mtime: i64, sha: u8) -> ManifestRecord {
        ManifestRecord::Add {
            path: path.to_string(),
            mtime,
            compressed: true,
            sha: [sha; 32],
        }
    }

    fn mv(from: &str, to: &str, mtime: i64) -> ManifestRecord {
        ManifestRecord::Move {
            from: from.to_string(),
            to: to.to_string(),
            mtime,
            compressed: true,
            sha: [0; 32],
        }
    }

    #[test]
    fn move_inherits_storage_and_tracks_origin() {
        let mut state = BackupState::default();
        state.apply("0000000000", &[add("a.txt", 100, 7)]).expect("g0");
        state.apply("0000000001", &[mv("a.txt", "sub/a.txt", 200)]).expect("g1");

        assert!(!state.files.contains_key("a.txt"));
        let rec = &state.files["sub/a.txt"];
        assert_eq!(rec.archive, "0000000000");
        assert_eq!(rec.sha, [7; 32]);
        assert_eq!(rec.origin.as_deref(), Some("a.txt"));
        assert_eq!(rec.mtime, 200);
    }

    #[test]
    fn move_chain_back_to_stored_path_clears_origin() {
        let mut state = BackupState::default();
        state.apply("0000000000", &[add("a.txt", 100, 7)]).expect("g0");
        state.apply("0000000001", &[mv("a.txt", "b.txt", 200)]).expect("g1");
        state.apply("0000000002", &[mv("b.txt", "c.txt", 300)]).expect("g2");
        assert_eq!(state.files["c.txt"].origin.as_deref(), Some("a.txt"));

        state.apply("0000000003", &[mv("c.txt", "a.txt", 400)]).expect("g3");
        let rec = &state.files["a.txt"];
        assert_eq!(rec.origin, None);
        assert_eq!(rec.archive, "0000000000");
    }

    #[test]
    fn delete_then_add_is_a_fresh_entry() {
        let mut state = BackupState::default();
        state.apply("0000000000", &[add("a.txt", 100, 7)]).expect("g0");
        state
            .apply(
                "0000000001",
                &[ManifestRecord::Delete {
                    path: "a.txt".to_string(),
                    compressed: true,
                }],
            )
            .expect("g1");
        assert!(state.is_empty());

        state.apply("0000000002", &[add("a.txt", 500, 9)]).expect("g2");
        let rec = &state.files["a.txt"];
        assert_eq!(rec.archive, "0000000002");
        assert_eq!(rec.sha, [9; 32]);
        assert_eq!(rec.origin, None);
    }

    #[test]
    fn update_rebinds_the_archive_generation() {
        let mut state = BackupState::default();
        state.apply("0000000000", &[add("a.txt", 100, 7)]).expect("g0");
        state
            .apply(
                "0000000001",
                &[ManifestRecord::Update {
                    path: "a.txt".to_string(),
                    mtime: 200,
                    compressed: true,
                    sha: [8; 32],
                }],
            )
            .expect("g1");
        assert_eq!(state.files["a.txt"].archive, "0000000001");
        assert_eq!(state.files["a.txt"].sha, [8; 32]);
    }

    #[test]
    fn dangling_move_or_delete_is_fatal() {
        let mut state = BackupState::default();
        let err = state
            .apply("0000000005", &[mv("ghost.txt", "x.txt", 100)])
            .expect_err("dangling move");
        assert!(matches!(err, CatalogError::MissingPath { .. }));

        let err = state
            .apply(
                "0000000005",
                &[ManifestRecord::Delete {
                    path: "ghost.txt".to_string(),
                    compressed: true,
                }],
            )
            .expect_err("dangling delete");
        assert!(matches!(err, CatalogError::MissingPath { .. }));
    }
}
