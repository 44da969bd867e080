// SPDX-License-Identifier: MIT OR Apache-2.0

//! Change-manifest codec.
//!
//! One manifest per generation (`fileinfo.txt`), text, one record per line,
//! five comma-separated fields: previous path, new path, mtime, compress
//! flag, sha256. Paths are double-quoted and may themselves contain commas;
//! the reader re-joins tokens until it sees the closing quote. The first
//! line is a comment. A line that does not yield five fields is skipped.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, TimeZone};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::hashing;
use crate::paths;

/// Manifest mtime format, local time.
pub const MTIME_FORMAT: &str = "%Y/%m/%d-%H:%M:%S";

/// Sentinel mtime field of a DELETE record.
const DELETED_MTIME: &str = "-1";

/// Sentinel sha field of a DELETE record.
const DELETED_SHA: &str = "00";

/// One change record.
///
/// The record kinds are distinguished on the wire by which path fields are
/// present: ADD has no previous path, DELETE no new path, MOVE two distinct
/// paths, UPDATE the same path twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestRecord {
    Add {
        path: String,
        mtime: i64,
        compressed: bool,
        sha: [u8; 32],
    },
    Update {
        path: String,
        mtime: i64,
        compressed: bool,
        sha: [u8; 32],
    },
    Delete {
        path: String,
        compressed: bool,
    },
    Move {
        from: String,
        to: String,
        mtime: i64,
        compressed: bool,
        sha: [u8; 32],
    },
}

/// Encode an mtime for a manifest field or a report row.
pub fn format_mtime(mtime: i64) -> String {
    match Local.timestamp_opt(mtime, 0).single() {
        Some(t) => t.format(MTIME_FORMAT).to_string(),
        None => DELETED_MTIME.to_string(),
    }
}

/// Decode a manifest mtime field or a `--restore-time` argument.
pub fn parse_mtime(s: &str) -> Option<i64> {
    let naive = NaiveDateTime::parse_from_str(s, MTIME_FORMAT).ok()?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|t| t.timestamp())
}

/// Read a manifest file leniently: unparseable lines are dropped.
pub fn read(path: &Path) -> std::io::Result<Vec<ManifestRecord>> {
    let content = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in content.lines().skip(1) {
        match parse_line(line) {
            Some(record) => records.push(record),
            None if line.is_empty() => {}
            None => tracing::debug!("skipping manifest line: {line}"),
        }
    }
    Ok(records)
}

/// Write a manifest. Records are emitted in the order given; the driver
/// orders them ADD, UPDATE, DELETE, MOVE.
pub fn write(path: &Path, records: &[ManifestRecord]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(
        out,
        "# previous path (blank if added),new path (blank if deleted),last modified,C=compress/N=store,sha256"
    )?;
    for record in records {
        writeln!(out, "{}", encode_line(record))?;
    }
    out.flush()?;
    Ok(())
}

fn encode_line(record: &ManifestRecord) -> String {
    let flag = |compressed: bool| if compressed { 'C' } else { 'N' };
    match record {
        ManifestRecord::Add {
            path,
            mtime,
            compressed,
            sha,
        } => format!(
            ",{},{},{},{}",
            paths::quote(path),
            format_mtime(*mtime),
            flag(*compressed),
            hashing::to_hex(sha)
        ),
        ManifestRecord::Update {
            path,
            mtime,
            compressed,
            sha,
        } => {
            let quoted = paths::quote(path);
            format!(
                "{quoted},{quoted},{},{},{}",
                format_mtime(*mtime),
                flag(*compressed),
                hashing::to_hex(sha)
            )
        }
        ManifestRecord::Delete { path, compressed } => format!(
            "{},,{DELETED_MTIME},{},{DELETED_SHA}",
            paths::quote(path),
            flag(*compressed)
        ),
        ManifestRecord::Move {
            from,
            to,
            mtime,
            compressed,
            sha,
        } => format!(
            "{},{},{},{},{}",
            paths::quote(from),
            paths::quote(to),
            format_mtime(*mtime),
            flag(*compressed),
            hashing::to_hex(sha)
        ),
    }
}

fn parse_line(line: &str) -> Option<ManifestRecord> {
    let fields = split_fields(line)?;
    let oldp = paths::normalize(&fields[0]);
    let newp = paths::normalize(&fields[1]);
    let compressed = fields[3].eq_ignore_ascii_case("C");

    if !oldp.is_empty() && !newp.is_empty() && oldp != newp {
        return Some(ManifestRecord::Move {
            from: oldp,
            to: newp,
            mtime: parse_mtime(&fields[2])?,
            compressed,
            sha: hashing::from_hex(&fields[4])?,
        });
    }
    if !newp.is_empty() {
        let record = if oldp.is_empty() {
            ManifestRecord::Add {
                path: newp,
                mtime: parse_mtime(&fields[2])?,
                compressed,
                sha: hashing::from_hex(&fields[4])?,
            }
        } else {
            ManifestRecord::Update {
                path: newp,
                mtime: parse_mtime(&fields[2])?,
                compressed,
                sha: hashing::from_hex(&fields[4])?,
            }
        };
        return Some(record);
    }
    if !oldp.is_empty() {
        return Some(ManifestRecord::Delete {
            path: oldp,
            compressed,
        });
    }
    None
}

/// Split a record line into at least five fields, re-joining commas inside
/// the two quoted path fields.
fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut tokens: std::collections::VecDeque<&str> = line.split(',').collect();
    if tokens.len() < 5 {
        return None;
    }
    let mut fields = Vec::with_capacity(5);
    for _ in 0..2 {
        let mut field = tokens.pop_front()?.to_string();
        while !field.is_empty() && !field.ends_with('"') {
            field.push(',');
            field.push_str(tokens.pop_front()?);
        }
        fields.push(field);
    }
    if tokens.len() < 3 {
        return None;
    }
    fields.extend(tokens.into_iter().map(String::from));
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn mtime_codec_round_trips_whole_seconds() {
        let t = parse_mtime("2024/03/05-14:30:00").expect("parse");
        assert_eq!(format_mtime(t), "2024/03/05-14:30:00");
        assert_eq!(parse_mtime("-1"), None);
        assert_eq!(parse_mtime("not a time"), None);
    }

    #[test]
    fn comma_in_path_survives_the_codec() {
        let record = ManifestRecord::Move {
            from: "docs/a, draft.txt".to_string(),
            to: "docs/b, final.txt".to_string(),
            mtime: parse_mtime("2024/01/02-03:04:05").expect("parse"),
            compressed: true,
            sha: sha(0x5A),
        };
        let parsed = parse_line(&encode_line(&record)).expect("parse line");
        assert_eq!(parsed, record);
    }

    #[test]
    fn delete_uses_sentinels() {
        let line = encode_line(&ManifestRecord::Delete {
            path: "old.txt".to_string(),
            compressed: false,
        });
        assert_eq!(line, "\"old.txt\",,-1,N,00");
        assert_eq!(
            parse_line(&line),
            Some(ManifestRecord::Delete {
                path: "old.txt".to_string(),
                compressed: false,
            })
        );
    }

    #[test]
    fn add_and_update_are_distinguished_by_the_previous_field() {
        let add = parse_line(",\"new.txt\",2024/01/02-03:04:05,C,AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
            .expect("parse add");
        assert!(matches!(add, ManifestRecord::Add { .. }));

        let update = parse_line("\"new.txt\",\"new.txt\",2024/01/02-03:04:05,C,AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA")
            .expect("parse update");
        assert!(matches!(update, ManifestRecord::Update { .. }));
    }

    #[test]
    fn short_and_garbled_lines_are_skipped() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("a,b,c"), None);
        assert_eq!(parse_line(",\"x.txt\",garbled,C,00"), None);
        // unterminated quote swallows the rest of the line
        assert_eq!(parse_line("\"a,b,c,d,e"), None);
    }

    #[test]
    fn written_file_reads_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fileinfo.txt");
        let records = vec![
            ManifestRecord::Add {
                path: "a.txt".to_string(),
                mtime: parse_mtime("2024/01/02-03:04:05").expect("parse"),
                compressed: true,
                sha: sha(1),
            },
            ManifestRecord::Delete {
                path: "b.jpg".to_string(),
                compressed: false,
            },
        ];
        write(&path, &records).expect("write");
        assert_eq!(read(&path).expect("read"), records);
    }
}
