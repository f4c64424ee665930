//! Common types used across Parlay

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// File name reserved for the manifest inside each dated snapshot folder
pub const MANIFEST_FILE_NAME: &str = "_manifest.json";

/// Date format of snapshot folder names
pub const SNAPSHOT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Which stores receive a routed document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// Primary store only, overwriting prior content
    #[default]
    Replace,
    /// Current dated snapshot folder only
    Snapshot,
    /// Both stores, each independently fingerprint-gated
    Both,
}

impl WritePolicy {
    pub fn writes_primary(self) -> bool {
        matches!(self, WritePolicy::Replace | WritePolicy::Both)
    }

    pub fn writes_snapshot(self) -> bool {
        matches!(self, WritePolicy::Snapshot | WritePolicy::Both)
    }
}

impl std::str::FromStr for WritePolicy {
    type Err = crate::ParlayError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(WritePolicy::Replace),
            "snapshot" => Ok(WritePolicy::Snapshot),
            "both" => Ok(WritePolicy::Both),
            other => Err(crate::ParlayError::Config(format!(
                "Invalid write policy '{}' (expected replace, snapshot or both)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WritePolicy::Replace => write!(f, "replace"),
            WritePolicy::Snapshot => write!(f, "snapshot"),
            WritePolicy::Both => write!(f, "both"),
        }
    }
}

/// Describes one dated snapshot folder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotManifest {
    /// Calendar day the folder represents
    pub date: NaiveDate,
    /// Top-level entity groups covered by the snapshot
    pub source_ids: Vec<String>,
    /// File names written into the folder, in write order
    pub files: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl SnapshotManifest {
    pub fn new(date: NaiveDate, source_ids: Vec<String>, files: Vec<String>) -> Self {
        let mut manifest = Self {
            date,
            source_ids: Vec::new(),
            files: Vec::new(),
            generated_at: Utc::now(),
        };
        extend_unique(&mut manifest.source_ids, source_ids);
        extend_unique(&mut manifest.files, files);
        manifest
    }

    /// Fold a later same-day run into this manifest.
    ///
    /// The date is fixed; file and source lists only grow, keeping the order
    /// in which names were first recorded.
    pub fn merge(&mut self, later: SnapshotManifest) {
        extend_unique(&mut self.source_ids, later.source_ids);
        extend_unique(&mut self.files, later.files);
        self.generated_at = later.generated_at.max(self.generated_at);
    }
}

fn extend_unique(into: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}
