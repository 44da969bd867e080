// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming SHA-256 over file contents.
//!
//! The 32-byte digest is the identity of a file's bytes everywhere in the
//! tool: move detection, manifests, and verification all compare digests.
//! Manifests encode it as uppercase hex.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 64 * 1024;

/// Digest of a file's bytes.
pub fn hash_file(path: &Path) -> Result<[u8; 32]> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let read = reader
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hasher.finalize().into())
}

/// Uppercase hex encoding used in manifest records.
pub fn to_hex(digest: &[u8; 32]) -> String {
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

/// Decode a manifest hex field. Case-insensitive.
pub fn from_hex(hex: &str) -> Option<[u8; 32]> {
    if hex.len() != 64 {
        return None;
    }
    let mut digest = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let s = std::str::from_utf8(chunk).ok()?;
        digest[i] = u8::from_str_radix(s, 16).ok()?;
    }
    Some(digest)
}
