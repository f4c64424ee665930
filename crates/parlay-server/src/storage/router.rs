//! Routes logical documents to the primary store and the dated snapshot store

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use parlay_common::types::SNAPSHOT_DATE_FORMAT;
use parlay_common::{Result, WritePolicy};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

use super::writer::{AtomicFileWriter, WriteOutcome};
use crate::config::StorageConfig;

/// Logical name of the cross-group display document
pub const DISPLAY_DOCUMENT: &str = "player_display.json";

/// Calendar day in `tz`
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

#[derive(Clone)]
pub struct WritePolicyRouter {
    writer: AtomicFileWriter,
    primary_root: PathBuf,
    snapshot_root: PathBuf,
    display_path: PathBuf,
    policy: WritePolicy,
    snapshots_enabled: bool,
    tz: Tz,
}

impl WritePolicyRouter {
    pub fn new(writer: AtomicFileWriter, storage: &StorageConfig, tz: Tz) -> Self {
        Self {
            writer,
            primary_root: storage.json_dir.clone(),
            snapshot_root: storage.snapshot_dir.clone(),
            display_path: storage.display_path.clone(),
            policy: storage.write_policy,
            snapshots_enabled: storage.snapshot_enable,
            tz,
        }
    }

    pub fn writer(&self) -> &AtomicFileWriter {
        &self.writer
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    pub fn primary_root(&self) -> &Path {
        &self.primary_root
    }

    pub fn snapshot_root(&self) -> &Path {
        &self.snapshot_root
    }

    pub fn display_path(&self) -> &Path {
        &self.display_path
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn today(&self) -> NaiveDate {
        today_in(self.tz)
    }

    /// Whether routed documents reach the snapshot store at all
    pub fn snapshots_active(&self) -> bool {
        self.snapshots_enabled && self.policy.writes_snapshot()
    }

    pub fn primary_path(&self, logical_name: &str) -> PathBuf {
        self.primary_root.join(logical_name)
    }

    pub fn snapshot_folder(&self, date: NaiveDate) -> PathBuf {
        self.snapshot_root
            .join(date.format(SNAPSHOT_DATE_FORMAT).to_string())
    }

    /// Route into today's folder; returns only the paths actually written
    pub fn route(&self, logical_name: &str, document: &Value) -> Result<Vec<PathBuf>> {
        self.route_for_date(self.today(), logical_name, document)
    }

    /// Write `document` into every store the policy selects.
    ///
    /// Each store is attempted even when another one fails; the paths that
    /// were written are returned on success, and the first failure otherwise.
    pub fn route_for_date(
        &self,
        date: NaiveDate,
        logical_name: &str,
        document: &Value,
    ) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        if logical_name == DISPLAY_DOCUMENT {
            self.write_into(&self.display_path, document, &mut written)?;
            return Ok(written);
        }

        let mut targets = Vec::with_capacity(2);
        if self.policy.writes_primary() {
            targets.push(self.primary_path(logical_name));
        }
        if self.snapshots_active() {
            targets.push(self.snapshot_folder(date).join(logical_name));
        }

        let mut first_error = None;
        for path in targets {
            if let Err(e) = self.write_into(&path, document, &mut written) {
                if e.is_fatal_to_pass() {
                    return Err(e);
                }
                warn!(path = %path.display(), error = %e, "Store write failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    fn write_into(&self, path: &Path, document: &Value, written: &mut Vec<PathBuf>) -> Result<()> {
        if self.writer.write(path, document)? == WriteOutcome::Written {
            written.push(path.to_path_buf());
        }
        Ok(())
    }

    /// Dated snapshot folders in ascending date order
    pub fn dated_snapshot_folders(&self) -> Result<Vec<(NaiveDate, PathBuf)>> {
        if !self.snapshot_root.is_dir() {
            return Ok(Vec::new());
        }

        let mut folders = Vec::new();
        for entry in std::fs::read_dir(&self.snapshot_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Ok(date) = NaiveDate::parse_from_str(&name, SNAPSHOT_DATE_FORMAT) {
                folders.push((date, entry.path()));
            }
        }

        folders.sort_by_key(|(date, _)| *date);
        Ok(folders)
    }

    /// Directories holding the current version of documents, most
    /// authoritative first.
    ///
    /// Stores the policy writes come first. Snapshot folders are searched
    /// newest first, from today back, so a document left untouched since an
    /// earlier day is still found. A store the policy no longer writes is the
    /// last resort.
    pub fn read_layers(&self) -> Vec<PathBuf> {
        let mut layers = Vec::new();
        if self.policy.writes_primary() {
            layers.push(self.primary_root.clone());
        }

        if self.snapshots_active() {
            let today = self.today();
            let folders = self.dated_snapshot_folders().unwrap_or_else(|e| {
                warn!(root = %self.snapshot_root.display(), error = %e, "Cannot list snapshot folders");
                Vec::new()
            });
            layers.extend(
                folders
                    .into_iter()
                    .rev()
                    .filter(|(date, _)| *date <= today)
                    .map(|(_, path)| path),
            );
        }

        if !self.policy.writes_primary() {
            layers.push(self.primary_root.clone());
        }
        layers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::state::StateIndex;
    use serde_json::json;
    use tempfile::TempDir;

    fn router(dir: &Path, policy: WritePolicy, enabled: bool) -> WritePolicyRouter {
        let storage = StorageConfig {
            json_dir: dir.join("json"),
            snapshot_dir: dir.join("json/snapshots"),
            display_path: dir.join("player_display.json"),
            state_db_path: dir.join("state.sqlite"),
            player_info_path: None,
            write_policy: policy,
            snapshot_enable: enabled,
            snapshot_retention_days: 7,
        };
        let writer = AtomicFileWriter::new(StateIndex::open_in_memory().unwrap());
        WritePolicyRouter::new(writer, &storage, chrono_tz::UTC)
    }

    #[test]
    fn test_replace_never_creates_snapshot_folder() {
        let dir = TempDir::new().unwrap();
        let router = router(dir.path(), WritePolicy::Replace, true);

        let written = router.route("g_stats.json", &json!([1])).unwrap();
        assert_eq!(written, vec![dir.path().join("json/g_stats.json")]);
        assert!(!dir.path().join("json/snapshots").exists());
    }

    #[test]
    fn test_snapshot_policy_requires_enable_switch() {
        let dir = TempDir::new().unwrap();
        let router = router(dir.path(), WritePolicy::Snapshot, false);

        assert!(router.route("g_stats.json", &json!([1])).unwrap().is_empty());
        assert!(!dir.path().join("json").exists());
    }

    #[test]
    fn test_both_gates_each_store_independently() {
        let dir = TempDir::new().unwrap();
        let router = router(dir.path(), WritePolicy::Both, true);
        let day1 = NaiveDate::from_ymd_opt(2025, 9, 14).unwrap();
        let day2 = day1.succ_opt().unwrap();

        let first = router.route_for_date(day1, "g_stats.json", &json!([1])).unwrap();
        assert_eq!(first.len(), 2);

        // Same content the next day: primary unchanged, snapshot first-seen
        let second = router.route_for_date(day2, "g_stats.json", &json!([1])).unwrap();
        assert_eq!(
            second,
            vec![dir.path().join("json/snapshots/2025-09-15/g_stats.json")]
        );
    }

    #[test]
    fn test_both_attempts_snapshot_when_primary_fails() {
        let dir = TempDir::new().unwrap();
        let router = router(dir.path(), WritePolicy::Both, true);
        let day = NaiveDate::from_ymd_opt(2025, 9, 14).unwrap();

        let blocked = dir.path().join("json/g_stats.json");
        std::fs::create_dir_all(blocked.join("inner")).unwrap();

        let err = router.route_for_date(day, "g_stats.json", &json!([1])).unwrap_err();
        assert!(matches!(err, parlay_common::ParlayError::WriteFailure { .. }));

        let snapshot = dir.path().join("json/snapshots/2025-09-14/g_stats.json");
        assert!(snapshot.is_file());
        assert!(router
            .writer()
            .index()
            .get_file_fingerprint(&snapshot.to_string_lossy())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_read_layers_follow_policy() {
        let dir = TempDir::new().unwrap();
        let primary = dir.path().join("json");
        let snapshots = dir.path().join("json/snapshots");
        let today = today_in(chrono_tz::UTC);
        let yesterday = today.pred_opt().unwrap();
        let tomorrow = today.succ_opt().unwrap();
        for date in [yesterday, today, tomorrow] {
            std::fs::create_dir_all(snapshots.join(date.format(SNAPSHOT_DATE_FORMAT).to_string()))
                .unwrap();
        }
        let folder = |date: NaiveDate| snapshots.join(date.format(SNAPSHOT_DATE_FORMAT).to_string());

        assert_eq!(
            router(dir.path(), WritePolicy::Replace, true).read_layers(),
            vec![primary.clone()]
        );
        assert_eq!(
            router(dir.path(), WritePolicy::Both, true).read_layers(),
            vec![primary.clone(), folder(today), folder(yesterday)]
        );
        assert_eq!(
            router(dir.path(), WritePolicy::Snapshot, true).read_layers(),
            vec![folder(today), folder(yesterday), primary.clone()]
        );
        assert_eq!(
            router(dir.path(), WritePolicy::Snapshot, false).read_layers(),
            vec![primary]
        );
    }

    #[test]
    fn test_display_document_bypasses_policy() {
        let dir = TempDir::new().unwrap();
        let router = router(dir.path(), WritePolicy::Snapshot, true);

        let written = router.route(DISPLAY_DOCUMENT, &json!([])).unwrap();
        assert_eq!(written, vec![dir.path().join("player_display.json")]);
        assert!(router.route(DISPLAY_DOCUMENT, &json!([])).unwrap().is_empty());
    }
}
