// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical path form used for all state keys and manifest comparisons.
//!
//! Canonical means: forward-slash separators, no trailing separator, no
//! surrounding double quotes. An entry that is empty after stripping is
//! treated as absent (manifests encode ADD/DELETE with an empty side).

/// Normalize a raw path string to canonical form.
pub fn normalize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let mut path = strip_quotes(raw).replace('\\', "/");
    while path.ends_with('/') {
        path.pop();
    }
    path
}

/// Strip one pair of surrounding double quotes, if present.
pub fn strip_quotes(s: &str) -> &str {
    if s.len() > 2 && s.starts_with('"') {
        if s.ends_with('"') {
            return &s[1..s.len() - 1];
        }
        tracing::error!("unbalanced double quote in {s}");
    }
    s
}

/// Wrap a path in double quotes unless it already is.
pub fn quote(s: &str) -> String {
    if s.starts_with('"') {
        s.to_string()
    } else {
        format!("\"{s}\"")
    }
}

/// Lowercased final extension of a path, quote-tolerant.
///
/// `"photo.JPG"` and `photo.JPG` both yield `jpg`. A path without a dot
/// yields the whole file name, matching how the non-compress extension list
/// is applied.
pub fn extension_lower(path: &str) -> String {
    let mut ext = path
        .rsplit('.')
        .next()
        .unwrap_or(path)
        .to_ascii_lowercase();
    if ext.ends_with('"') {
        ext.pop();
    }
    ext
}
