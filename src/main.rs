// SPDX-License-Identifier: MIT OR Apache-2.0

//! incbak - incremental deduplicating backup tool
//!
//! Each run against a backup root appends at most one generation: a change
//! manifest plus a compressed and a store-only archive produced by 7-Zip.
//! Restore folds the manifests back into a point-in-time snapshot.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use incbak::cli::{Cli, Mode};
use incbak::ops::{self, RunContext};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let wait_sec = cli.wait_sec;

    run(cli)?;

    if let Some(secs) = wait_sec {
        if secs > 0.0 {
            std::thread::sleep(std::time::Duration::from_secs_f64(secs));
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let ctx = RunContext::from_cli(&cli)?;
    match cli.mode {
        Mode::Backup => ops::backup::run(&ctx, true),
        Mode::Empty => ops::backup::run(&ctx, false),
        Mode::Restore => ops::restore::run(&ctx, ops::restore::ReportMode::Extract),
        Mode::List => ops::restore::run(&ctx, ops::restore::ReportMode::ListOnly),
        Mode::History => ops::history::run(&ctx),
        Mode::Verify => ops::verify::run(&ctx),
    }
}
