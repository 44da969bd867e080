// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// incbak - incremental deduplicating backup
///
/// Backs up the configured source tree into timestamped archive
/// generations under `<root>/archive/`, recording only the changes since
/// the previous generation, and restores any recorded point in time.
#[derive(Parser, Debug)]
#[command(name = "incbak")]
#[command(
    author,
    version,
    about,
    long_about = None,
    after_help = "Quickstart:\n  incbak backup /mnt/usbdisk\n  incbak list /mnt/usbdisk\n  incbak restore /mnt/usbdisk -t 2024/03/05-14:30:00\n\nThe backup root holds backup_config.txt and the archive/ directory."
)]
pub struct Cli {
    /// Operation mode
    #[arg(value_enum)]
    pub mode: Mode,

    /// Backup root directory
    pub root: PathBuf,

    /// Password passed through to the archiver
    #[arg(short, long)]
    pub password: Option<String>,

    /// Point in time YYYY/MM/DD-HH:MM:SS (local) to restore or list
    #[arg(short = 't', long)]
    pub restore_time: Option<String>,

    /// Profile file(s); later files override earlier ones
    #[arg(short, long = "config-file", num_args = 1..)]
    pub config_file: Vec<String>,

    /// Overwrite existing files when restoring
    #[arg(long)]
    pub overwrite: bool,

    /// Extract with full stored paths when restoring
    #[arg(long)]
    pub full_path: bool,

    /// Remove the new generation directory when the archiver fails
    #[arg(long)]
    pub delete_on_fail: bool,

    /// Suppress per-file listings in summaries
    #[arg(long)]
    pub silent: bool,

    /// Seconds to wait before a successful exit
    #[arg(short, long)]
    pub wait_sec: Option<f64>,

    /// Files to restore, list or version (values, or @listfile)
    #[arg(short = 'f', long = "recovery-files", num_args = 1..)]
    pub recovery_files: Vec<String>,

    /// Output format for list and verify reports
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Operation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Record changes and archive the new or modified files
    Backup,
    /// Record changes without archiving any bytes
    Empty,
    /// Extract a point-in-time snapshot into the current directory
    Restore,
    /// Report what a restore would extract
    List,
    /// Extract every recorded version of the given files
    History,
    /// Re-hash the live tree against the latest recorded state
    Verify,
}

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
