//! Path algebra for colon-delimited store paths
//!
//! A path is one or more segments separated by `:`, each segment naming one
//! key lookup in one store's entry table. Splitting and joining are pure and
//! do no normalization: no trimming, no case folding, no collapsing of
//! repeated separators. Empty segments are invalid keys and are rejected by
//! [`validate`] before any store operation touches them.

use crate::error::{Result, StoreError};

/// Segment separator for store paths
pub const SEPARATOR: char = ':';

/// Split a path into its ordered segments
///
/// `split("")` yields a single empty segment, which [`validate`] rejects.
///
/// # Examples
/// ```
/// use gatestore::path::split;
///
/// assert_eq!(split("a:b:c"), vec!["a", "b", "c"]);
/// assert_eq!(split("a"), vec!["a"]);
/// ```
pub fn split(path: &str) -> Vec<&str> {
    path.split(SEPARATOR).collect()
}

/// Join segments back into a path
pub fn join<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    let mut first = true;
    for segment in segments {
        if !first {
            out.push(SEPARATOR);
        }
        out.push_str(segment);
        first = false;
    }
    out
}

/// Split a path and reject empty segments
///
/// The empty path (and any path with a zero-length segment, e.g. `"a::b"`)
/// fails with [`StoreError::InvalidPath`]. Callers rely on the returned
/// vector holding at least one segment.
pub fn validate(path: &str) -> Result<Vec<&str>> {
    let segments = split(path);
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(StoreError::InvalidPath(format!(
            "'{path}' contains an empty segment"
        )));
    }
    Ok(segments)
}
