// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain errors that must stop a run.
//!
//! Most failures in this tool are soft: the scanner, the manifest reader and
//! the restore planner log and keep going. The variants here are the ones
//! that mean the archive root itself can no longer be trusted.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// A MOVE or DELETE record referenced a path that is not live at that
    /// point of the fold. The manifest chain is corrupt.
    #[error("generation {generation}: record references unknown path '{path}'")]
    MissingPath { generation: String, path: String },

    /// A generation directory exists but its manifest cannot be read.
    #[error("generation {generation}: cannot read manifest: {source}")]
    UnreadableManifest {
        generation: String,
        #[source]
        source: std::io::Error,
    },

    /// All 100 per-day sequence numbers are taken.
    #[error("no free generation id left for date {date}")]
    DateExhausted { date: String },
}
