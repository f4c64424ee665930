//! Fingerprint-gated atomic JSON writes
//!
//! A document is serialized into a temp file next to its target and renamed
//! over it, so readers see either the old file or the new one. The state
//! index records the fingerprint of the last successful write; an identical
//! document is skipped without touching the filesystem.

use parlay_common::{fingerprint, ParlayError, Result};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::debug;

use crate::state::StateIndex;

/// Result of a single write request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Stored fingerprint already matches; nothing touched
    Skipped,
}

#[derive(Clone)]
pub struct AtomicFileWriter {
    index: StateIndex,
}

impl AtomicFileWriter {
    pub fn new(index: StateIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &StateIndex {
        &self.index
    }

    /// Write `document` to `path` unless its content is already recorded there.
    ///
    /// Filesystem failures surface as `WriteFailure` and leave the recorded
    /// fingerprint untouched. State index failures propagate as-is.
    pub fn write(&self, path: &Path, document: &Value) -> Result<WriteOutcome> {
        let digest = fingerprint(document);
        let key = path_key(path);

        if self.index.get_file_fingerprint(&key)?.as_ref() == Some(&digest) {
            debug!(path = %path.display(), "Content unchanged, skipping write");
            return Ok(WriteOutcome::Skipped);
        }

        replace_file(path, document)?;

        self.index
            .upsert_file_fingerprint(&key, &digest, modified_secs(path))?;

        debug!(path = %path.display(), fingerprint = %digest, "Wrote document");
        Ok(WriteOutcome::Written)
    }
}

/// Key under which a path's fingerprint is recorded
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn replace_file(path: &Path, document: &Value) -> Result<()> {
    let failure = |e: &dyn std::fmt::Display| ParlayError::write_failure(path, e);

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| failure(&e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ParlayError::write_failure(path, "path has no file name"))?;

    // Dropping the temp file on any early return removes it
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| failure(&e))?;

    serde_json::to_writer_pretty(&mut tmp, document).map_err(|e| failure(&e))?;
    tmp.write_all(b"\n").map_err(|e| failure(&e))?;
    tmp.as_file().sync_all().map_err(|e| failure(&e))?;

    tmp.persist(path).map_err(|e| failure(&e.error))?;
    Ok(())
}

fn modified_secs(path: &Path) -> Option<f64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
}
