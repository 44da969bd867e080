// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report printing helpers shared by the ops modules.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

/// Print a serializable report as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a colored group header and its items, collapsing to a count when
/// the group is larger than `cap` (or when listings are silenced).
pub fn print_group(header: &str, color: colored::Color, items: &[String], cap: usize, silent: bool) {
    if items.is_empty() {
        return;
    }
    println!("{}", header.color(color));
    if silent || items.len() > cap {
        println!("  {} files", items.len());
    } else {
        for item in items {
            println!("  {item}");
        }
    }
}
