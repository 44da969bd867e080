// SPDX-License-Identifier: MIT OR Apache-2.0

//! 7-Zip subprocess wrapper.
//!
//! The archive container is entirely the archiver's business: creation,
//! 1 GiB volume splitting, extraction and password protection all happen in
//! the child process. This module only assembles command lines and
//! classifies exit status.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

#[cfg(windows)]
const DEFAULT_BINARY: &str = "C:/Program Files/7-Zip/7z.exe";
#[cfg(not(windows))]
const DEFAULT_BINARY: &str = "7z";

const VOLUME_SPLIT: &str = "-v1g";

/// Compression level of an archive payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// `-mx1`, for the compressible partition.
    Fast,
    /// `-mx0`, for the store-only partition.
    Store,
}

impl Compression {
    fn flag(self) -> &'static str {
        match self {
            Self::Fast => "-mx1",
            Self::Store => "-mx0",
        }
    }
}

/// How extracted entries land on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// `x`: keep stored directory structure.
    FullPath,
    /// `e`: flatten to file names.
    Flatten,
}

impl ExtractMode {
    fn command(self) -> &'static str {
        match self {
            Self::FullPath => "x",
            Self::Flatten => "e",
        }
    }
}

/// What to do when an extracted file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    /// `-aos`: keep the existing file.
    Skip,
    /// `-aoa`: replace it.
    Replace,
}

impl Overwrite {
    fn flag(self) -> &'static str {
        match self {
            Self::Skip => "-aos",
            Self::Replace => "-aoa",
        }
    }
}

/// A located archiver binary plus the pass-through password, if any.
#[derive(Debug, Clone)]
pub struct Archiver {
    binary: PathBuf,
    password: Option<String>,
}

impl Archiver {
    /// Locate the archiver: an explicit override from the settings file, or
    /// the platform default resolved on PATH.
    pub fn locate(override_binary: Option<&str>, password: Option<String>) -> Result<Self> {
        let candidate = override_binary.unwrap_or(DEFAULT_BINARY);
        let binary = if Path::new(candidate).is_file() {
            PathBuf::from(candidate)
        } else {
            which::which(candidate)
                .with_context(|| format!("archiver '{candidate}' not found on PATH"))?
        };
        Ok(Self { binary, password })
    }

    /// Add the files named in `list_file` (one quoted path per line,
    /// relative to `cwd`) to `archive`, splitting into 1 GiB volumes.
    pub fn create(
        &self,
        archive: &Path,
        level: Compression,
        list_file: &Path,
        cwd: &Path,
    ) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(cwd)
            .arg("a")
            .arg(archive)
            .arg(level.flag())
            .arg(VOLUME_SPLIT)
            .arg(format!("@{}", list_file.display()));
        self.push_password(&mut cmd);
        self.run(cmd, "archive creation")
    }

    /// Extract the files named in `list_file` from `archive` into `cwd`,
    /// or into `out_dir` when given.
    pub fn extract_list(
        &self,
        archive: &Path,
        list_file: &Path,
        mode: ExtractMode,
        overwrite: Overwrite,
        out_dir: Option<&Path>,
        cwd: &Path,
    ) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(cwd)
            .arg(mode.command())
            .arg(archive)
            .arg(format!("@{}", list_file.display()))
            .arg(overwrite.flag());
        self.push_password(&mut cmd);
        if let Some(dir) = out_dir {
            cmd.arg(format!("-o{}", dir.display()));
        }
        self.run(cmd, "extraction")
    }

    /// Extract a single stored entry, flattened to its file name.
    pub fn extract_one(
        &self,
        archive: &Path,
        stored_path: &str,
        overwrite: Overwrite,
        cwd: &Path,
    ) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(cwd)
            .arg(ExtractMode::Flatten.command())
            .arg(archive)
            .arg(overwrite.flag());
        self.push_password(&mut cmd);
        cmd.arg(stored_path);
        self.run(cmd, "extraction")
    }

    fn push_password(&self, cmd: &mut Command) {
        if let Some(pw) = &self.password {
            cmd.arg(format!("-p{pw}"));
        }
    }

    fn run(&self, mut cmd: Command, what: &str) -> Result<()> {
        let output = cmd
            .output()
            .with_context(|| format!("failed to run {}", self.binary.display()))?;
        // the archiver's chatter (and occasionally non-UTF-8 file names in
        // it) is never a reason to fail
        tracing::debug!("{}", String::from_utf8_lossy(&output.stdout));
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{what} failed ({}): {}", output.status, stderr.trim());
        }
        Ok(())
    }
}
