//! Coarse memoization of computed results.
//!
//! A full stratified pass re-estimates a baseline for every (jurisdiction,
//! age-group, week) combination, so the result blob is kept on disk and
//! reused while fresh. The engine stays idempotent whether or not a cache
//! file is present; a stale, missing, or unreadable blob just means
//! recomputing.

use anyhow::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Loads a cached value from `path` if the file is younger than `max_age`.
/// Any failure (missing file, stale, undecodable) returns `None`.
pub fn load_fresh<T: DeserializeOwned>(path: &Path, max_age: Duration) -> Option<T> {
    let age = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())?;

    if age > max_age {
        debug!(path = %path.display(), age_secs = age.as_secs(), "cache is stale");
        return None;
    }

    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => {
            info!(path = %path.display(), "reusing cached results");
            Some(value)
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "ignoring undecodable cache");
            None
        }
    }
}

/// Writes `value` to `path` as JSON, replacing any previous blob.
pub fn store<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    std::fs::write(path, body)?;
    debug!(path = %path.display(), "cached results");
    Ok(())
}
