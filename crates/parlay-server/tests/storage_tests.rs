//! Document store integration tests
//!
//! Fingerprint-gated writes, policy routing across both stores and snapshot
//! retention, all against a temp directory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod helpers;

use chrono::{Duration, NaiveDate};
use helpers::{router, storage_config};
use parlay_common::{fingerprint, ParlayError, WritePolicy};
use parlay_server::storage::{SnapshotLifecycleManager, WriteOutcome};
use serde_json::json;
use tempfile::TempDir;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[test]
fn test_retention_deletes_only_folders_past_window() {
    let dir = TempDir::new().unwrap();
    let storage = storage_config(dir.path(), WritePolicy::Snapshot, true);
    let router = router(&storage);
    let manager = SnapshotLifecycleManager::new(router.clone(), true, 7);

    let today = date("2025-06-20");
    for i in 1..=10i64 {
        let folder = router.snapshot_folder(today - Duration::days(i));
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("data.json"), vec![b'x'; (i * 10) as usize]).unwrap();
    }
    let notes = storage.snapshot_dir.join("notes");
    std::fs::create_dir_all(&notes).unwrap();
    std::fs::write(notes.join("readme.txt"), b"keep me").unwrap();

    let report = manager.cleanup_expired_as_of(today, 7).unwrap();

    // 2025-06-12, 06-11 and 06-10 are strictly before the cutoff 06-13
    assert_eq!(report.folders_deleted, 3);
    assert_eq!(report.bytes_reclaimed, 80 + 90 + 100);
    assert!(notes.exists());
    assert!(router.snapshot_folder(date("2025-06-13")).exists());
    assert!(!router.snapshot_folder(date("2025-06-12")).exists());

    let remaining: Vec<NaiveDate> = manager
        .dated_folders()
        .unwrap()
        .into_iter()
        .map(|(day, _)| day)
        .collect();
    assert_eq!(remaining.len(), 7);
    assert_eq!(remaining.first(), Some(&date("2025-06-13")));
}

#[test]
fn test_retention_is_noop_when_disabled() {
    let dir = TempDir::new().unwrap();
    let storage = storage_config(dir.path(), WritePolicy::Snapshot, false);
    let router = router(&storage);
    let manager = SnapshotLifecycleManager::new(router.clone(), false, 7);

    let old = router.snapshot_folder(date("2000-01-01"));
    std::fs::create_dir_all(&old).unwrap();

    let report = manager.cleanup_expired_as_of(date("2025-06-20"), 7).unwrap();
    assert_eq!(report.folders_deleted, 0);
    assert!(old.exists());
}

#[test]
fn test_writer_skips_identical_content_and_survives_stray_temp() {
    let dir = TempDir::new().unwrap();
    let storage = storage_config(dir.path(), WritePolicy::Replace, false);
    let router = router(&storage);
    let writer = router.writer();

    // Left behind by an interrupted earlier write
    std::fs::create_dir_all(&storage.json_dir).unwrap();
    std::fs::write(storage.json_dir.join(".stats.json.abc123.tmp"), b"{").unwrap();

    let path = storage.json_dir.join("stats.json");
    assert_eq!(writer.write(&path, &json!({"k": 1})).unwrap(), WriteOutcome::Written);
    assert_eq!(writer.write(&path, &json!({"k": 1})).unwrap(), WriteOutcome::Skipped);
    assert_eq!(writer.write(&path, &json!({"k": 2})).unwrap(), WriteOutcome::Written);

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, json!({"k": 2}));
}

#[test]
fn test_writer_failure_records_nothing() {
    let dir = TempDir::new().unwrap();
    let storage = storage_config(dir.path(), WritePolicy::Replace, false);
    let router = router(&storage);

    let path = storage.json_dir.join("blocked.json");
    std::fs::create_dir_all(path.join("inner")).unwrap();

    let err = router.writer().write(&path, &json!([1, 2])).unwrap_err();
    assert!(matches!(err, ParlayError::WriteFailure { .. }));
    assert!(router
        .writer()
        .index()
        .get_file_fingerprint(&path.to_string_lossy())
        .unwrap()
        .is_none());
}

#[cfg(unix)]
#[test]
fn test_failed_replace_keeps_previous_document() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let storage = storage_config(dir.path(), WritePolicy::Replace, false);
    let router = router(&storage);
    let writer = router.writer();

    let path = storage.json_dir.join("stats.json");
    let v1 = json!({"rows": [1, 2, 3]});
    writer.write(&path, &v1).unwrap();

    let set_mode = |mode: u32| {
        std::fs::set_permissions(&storage.json_dir, std::fs::Permissions::from_mode(mode)).unwrap()
    };
    set_mode(0o555);

    // Privileged users ignore directory permissions; nothing to observe then
    let check = storage.json_dir.join(".writable");
    if std::fs::write(&check, b"").is_ok() {
        let _ = std::fs::remove_file(&check);
        set_mode(0o755);
        return;
    }

    let result = writer.write(&path, &json!({"rows": [4]}));
    set_mode(0o755);

    assert!(matches!(result, Err(ParlayError::WriteFailure { .. })));

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, v1);
    assert_eq!(
        writer
            .index()
            .get_file_fingerprint(&path.to_string_lossy())
            .unwrap(),
        Some(fingerprint(&v1))
    );

    let leftovers: Vec<_> = std::fs::read_dir(&storage.json_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {:?}", leftovers);

    // Once writable again the new content goes through
    assert_eq!(writer.write(&path, &json!({"rows": [4]})).unwrap(), WriteOutcome::Written);
}

#[test]
fn test_retention_forgets_file_records_of_removed_folders() {
    let dir = TempDir::new().unwrap();
    let storage = storage_config(dir.path(), WritePolicy::Snapshot, true);
    let router = router(&storage);
    let manager = SnapshotLifecycleManager::new(router.clone(), true, 7);

    let today = date("2025-06-20");
    let old = today - Duration::days(30);
    let recent = today - Duration::days(1);
    router.route_for_date(old, "g_points.json", &json!({"a": 1})).unwrap();
    router.route_for_date(recent, "g_points.json", &json!({"a": 1})).unwrap();
    let index = router.writer().index();
    assert_eq!(index.counts().unwrap().files, 2);

    let report = manager.cleanup_expired_as_of(today, 7).unwrap();
    assert_eq!(report.folders_deleted, 1);

    let old_key = router.snapshot_folder(old).join("g_points.json");
    let recent_key = router.snapshot_folder(recent).join("g_points.json");
    assert!(index.get_file_fingerprint(&old_key.to_string_lossy()).unwrap().is_none());
    assert!(index.get_file_fingerprint(&recent_key.to_string_lossy()).unwrap().is_some());
    assert_eq!(index.counts().unwrap().files, 1);

    // A rerun for that date writes again instead of trusting a stale record
    assert_eq!(
        router.route_for_date(old, "g_points.json", &json!({"a": 1})).unwrap(),
        vec![old_key]
    );
}

#[test]
fn test_both_policy_gates_each_store_independently() {
    let dir = TempDir::new().unwrap();
    let storage = storage_config(dir.path(), WritePolicy::Both, true);
    let router = router(&storage);
    let doc = json!({"round": 1});

    let day1 = date("2025-06-19");
    let day2 = date("2025-06-20");

    let first = router.route_for_date(day1, "g_points.json", &doc).unwrap();
    assert_eq!(
        first,
        vec![
            storage.json_dir.join("g_points.json"),
            router.snapshot_folder(day1).join("g_points.json"),
        ]
    );

    // Primary unchanged, new day: only the snapshot copy is written
    let second = router.route_for_date(day2, "g_points.json", &doc).unwrap();
    assert_eq!(second, vec![router.snapshot_folder(day2).join("g_points.json")]);

    let third = router.route_for_date(day2, "g_points.json", &doc).unwrap();
    assert!(third.is_empty());
}

#[test]
fn test_replace_policy_never_creates_snapshot_folders() {
    let dir = TempDir::new().unwrap();
    let storage = storage_config(dir.path(), WritePolicy::Replace, true);
    let router = router(&storage);

    let written = router.route("g_points.json", &json!({})).unwrap();
    assert_eq!(written, vec![storage.json_dir.join("g_points.json")]);
    assert!(!storage.snapshot_dir.exists());
}

#[test]
fn test_snapshot_policy_requires_enable_switch() {
    let dir = TempDir::new().unwrap();
    let storage = storage_config(dir.path(), WritePolicy::Snapshot, false);
    let router = router(&storage);

    let written = router.route("g_points.json", &json!({})).unwrap();
    assert!(written.is_empty());
    assert!(!storage.json_dir.join("g_points.json").exists());
    assert!(!storage.snapshot_dir.exists());
}

#[test]
fn test_manifest_and_latest_folder() {
    let dir = TempDir::new().unwrap();
    let storage = storage_config(dir.path(), WritePolicy::Snapshot, true);
    let router = router(&storage);
    let manager = SnapshotLifecycleManager::new(router.clone(), true, 7);

    manager
        .write_manifest(date("2025-06-19"), vec!["g".into()], vec!["g_points.json".into()])
        .unwrap();
    manager
        .write_manifest(date("2025-06-20"), vec!["g".into()], vec!["g_points.json".into()])
        .unwrap();
    manager
        .write_manifest(date("2025-06-20"), vec!["h".into()], vec!["h_points.json".into()])
        .unwrap();

    let (latest, _) = manager.latest_folder().unwrap().unwrap();
    assert_eq!(latest, date("2025-06-20"));

    let manifest = manager.manifest_for(latest).unwrap();
    assert_eq!(manifest.source_ids, vec!["g", "h"]);
    assert_eq!(manifest.files, vec!["g_points.json", "h_points.json"]);
}
