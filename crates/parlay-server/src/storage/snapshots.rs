//! Dated snapshot folders: retention cleanup and per-day manifests

use chrono::NaiveDate;
use parlay_common::types::{MANIFEST_FILE_NAME, SNAPSHOT_DATE_FORMAT};
use parlay_common::{Result, SnapshotManifest};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::router::WritePolicyRouter;
use super::writer::path_key;

/// Outcome of one retention sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub folders_deleted: u64,
    pub bytes_reclaimed: u64,
}

#[derive(Clone)]
pub struct SnapshotLifecycleManager {
    router: WritePolicyRouter,
    enabled: bool,
    retention_days: u32,
}

impl SnapshotLifecycleManager {
    pub fn new(router: WritePolicyRouter, enabled: bool, retention_days: u32) -> Self {
        Self {
            router,
            enabled,
            retention_days,
        }
    }

    pub fn root(&self) -> &Path {
        self.router.snapshot_root()
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Remove folders older than the configured window, relative to today
    pub fn cleanup_expired(&self) -> Result<CleanupReport> {
        self.cleanup_expired_as_of(self.router.today(), self.retention_days)
    }

    /// Remove dated folders strictly before `today - retention_days`.
    ///
    /// Anything whose name is not a `YYYY-MM-DD` date is left alone.
    pub fn cleanup_expired_as_of(&self, today: NaiveDate, retention_days: u32) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let root = self.root();

        if !self.enabled || !root.is_dir() {
            return Ok(report);
        }

        let cutoff = today - chrono::Duration::days(i64::from(retention_days));

        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(date) = NaiveDate::parse_from_str(&name, SNAPSHOT_DATE_FORMAT) else {
                continue;
            };
            if date >= cutoff {
                continue;
            }

            let path = entry.path();
            let bytes = folder_size(&path);
            std::fs::remove_dir_all(&path)?;

            let prefix = format!("{}{}", path_key(&path), std::path::MAIN_SEPARATOR);
            let forgotten = self.router.writer().index().forget_prefix(&prefix)?;

            info!(folder = %name, bytes, forgotten, "Removed expired snapshot folder");
            report.folders_deleted += 1;
            report.bytes_reclaimed += bytes;
        }

        Ok(report)
    }

    /// Write (or extend) the manifest of the folder for `date`
    pub fn write_manifest(
        &self,
        date: NaiveDate,
        source_ids: Vec<String>,
        files: Vec<String>,
    ) -> Result<PathBuf> {
        let path = self.router.snapshot_folder(date).join(MANIFEST_FILE_NAME);
        let fresh = SnapshotManifest::new(date, source_ids, files);

        let manifest = match read_manifest(&path) {
            Some(mut existing) if existing.date == date => {
                existing.merge(fresh);
                existing
            },
            _ => fresh,
        };

        let document = serde_json::to_value(&manifest)?;
        self.router.writer().write(&path, &document)?;
        Ok(path)
    }

    /// Most recent dated folder, if any
    pub fn latest_folder(&self) -> Result<Option<(NaiveDate, PathBuf)>> {
        Ok(self.dated_folders()?.pop())
    }

    /// Dated folders in ascending date order
    pub fn dated_folders(&self) -> Result<Vec<(NaiveDate, PathBuf)>> {
        self.router.dated_snapshot_folders()
    }

    pub fn manifest_for(&self, date: NaiveDate) -> Option<SnapshotManifest> {
        read_manifest(&self.router.snapshot_folder(date).join(MANIFEST_FILE_NAME))
    }
}

fn read_manifest(path: &Path) -> Option<SnapshotManifest> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<SnapshotManifest>(&raw) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable snapshot manifest");
            None
        },
    }
}

/// Total size of regular files under `path`
pub fn folder_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}
