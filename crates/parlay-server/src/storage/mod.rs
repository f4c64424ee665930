//! On-disk document store
//!
//! The primary store is a flat directory of JSON documents keyed by logical
//! name. Dated snapshot folders mirror the same names under
//! `<snapshot_root>/<YYYY-MM-DD>/`.

pub mod router;
pub mod snapshots;
pub mod writer;

pub use router::{today_in, WritePolicyRouter, DISPLAY_DOCUMENT};
pub use snapshots::{folder_size, CleanupReport, SnapshotLifecycleManager};
pub use writer::{AtomicFileWriter, WriteOutcome};

use parlay_common::WritePolicy;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::warn;

use crate::config::StorageConfig;

/// Read side of the store as seen during one refresh pass.
///
/// Lookups consult documents produced earlier in the pass, then the
/// router's read layers: the stores the policy writes, and dated snapshot
/// folders newest first. A document unchanged since an earlier day is
/// therefore still visible under the `Snapshot` policy.
pub struct StoreView<'a> {
    router: &'a WritePolicyRouter,
    pass_cache: &'a HashMap<String, Value>,
}

impl<'a> StoreView<'a> {
    pub fn new(router: &'a WritePolicyRouter, pass_cache: &'a HashMap<String, Value>) -> Self {
        Self { router, pass_cache }
    }

    pub fn read(&self, logical_name: &str) -> Option<Value> {
        if let Some(doc) = self.pass_cache.get(logical_name) {
            return Some(doc.clone());
        }

        self.router
            .read_layers()
            .iter()
            .find_map(|dir| read_json(&dir.join(logical_name)))
    }

    /// Logical names ending in `suffix` across the pass and every read
    /// layer, sorted
    pub fn names_with_suffix(&self, suffix: &str) -> Vec<String> {
        let mut names: BTreeSet<String> = self
            .pass_cache
            .keys()
            .filter(|name| name.ends_with(suffix))
            .cloned()
            .collect();

        for dir in self.router.read_layers() {
            names.extend(json_file_names(&dir).into_iter().filter(|n| n.ends_with(suffix)));
        }

        names.into_iter().collect()
    }
}

/// Parse a JSON document from disk; missing or unreadable files yield `None`
pub fn read_json(path: &Path) -> Option<Value> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unparsable JSON document");
            None
        },
    }
}

/// Names of `*.json` regular files directly inside `dir`
pub fn json_file_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".json"))
        .collect();
    names.sort();
    names
}

/// Storage counters for the status query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageStats {
    pub write_policy: WritePolicy,
    pub snapshots_enabled: bool,
    pub snapshot_retention_days: u32,
    pub json_dir_file_count: u64,
    pub json_dir_bytes: u64,
    pub snapshot_dir_bytes: u64,
}

pub fn storage_stats(storage: &StorageConfig) -> StorageStats {
    let names = json_file_names(&storage.json_dir);
    let json_dir_bytes = names
        .iter()
        .filter_map(|name| std::fs::metadata(storage.json_dir.join(name)).ok())
        .map(|meta| meta.len())
        .sum();

    let snapshot_dir_bytes = if storage.snapshot_enable && storage.snapshot_dir.is_dir() {
        folder_size(&storage.snapshot_dir)
    } else {
        0
    };

    StorageStats {
        write_policy: storage.write_policy,
        snapshots_enabled: storage.snapshot_enable,
        snapshot_retention_days: storage.snapshot_retention_days,
        json_dir_file_count: names.len() as u64,
        json_dir_bytes,
        snapshot_dir_bytes,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::state::StateIndex;
    use serde_json::json;
    use tempfile::TempDir;

    fn storage(dir: &Path, policy: WritePolicy) -> StorageConfig {
        StorageConfig {
            json_dir: dir.join("json"),
            snapshot_dir: dir.join("snapshots"),
            display_path: dir.join("player_display.json"),
            state_db_path: dir.join("state.sqlite"),
            player_info_path: None,
            write_policy: policy,
            snapshot_enable: true,
            snapshot_retention_days: 7,
        }
    }

    #[test]
    fn test_view_layers_under_snapshot_policy() {
        let dir = TempDir::new().unwrap();
        let config = storage(dir.path(), WritePolicy::Snapshot);
        let router = WritePolicyRouter::new(
            AtomicFileWriter::new(StateIndex::open_in_memory().unwrap()),
            &config,
            chrono_tz::UTC,
        );

        router.route("a_stats.json", &json!(["snapshot"])).unwrap();
        std::fs::create_dir_all(&config.json_dir).unwrap();
        std::fs::write(config.json_dir.join("b_stats.json"), "[\"primary\"]").unwrap();

        let mut cache = HashMap::new();
        cache.insert("c_stats.json".to_string(), json!(["cache"]));
        let view = StoreView::new(&router, &cache);

        assert_eq!(view.read("a_stats.json"), Some(json!(["snapshot"])));
        assert_eq!(view.read("b_stats.json"), Some(json!(["primary"])));
        assert_eq!(view.read("c_stats.json"), Some(json!(["cache"])));
        assert_eq!(view.read("d_stats.json"), None);
        assert_eq!(
            view.names_with_suffix("_stats.json"),
            vec!["a_stats.json", "b_stats.json", "c_stats.json"]
        );
    }

    #[test]
    fn test_view_falls_back_to_earlier_snapshot_before_stale_primary() {
        let dir = TempDir::new().unwrap();
        let config = storage(dir.path(), WritePolicy::Snapshot);
        let router = WritePolicyRouter::new(
            AtomicFileWriter::new(StateIndex::open_in_memory().unwrap()),
            &config,
            chrono_tz::UTC,
        );
        let today = router.today();

        // Left over from an earlier `replace` run
        std::fs::create_dir_all(&config.json_dir).unwrap();
        std::fs::write(config.json_dir.join("g_stats.json"), "[\"stale\"]").unwrap();

        let two_days_ago = today - chrono::Duration::days(2);
        router
            .route_for_date(two_days_ago, "g_stats.json", &json!(["older"]))
            .unwrap();
        router
            .route_for_date(today.pred_opt().unwrap(), "g_stats.json", &json!(["yesterday"]))
            .unwrap();
        router
            .route_for_date(two_days_ago, "h_stats.json", &json!(["only-old"]))
            .unwrap();

        let cache = HashMap::new();
        let view = StoreView::new(&router, &cache);
        assert_eq!(view.read("g_stats.json"), Some(json!(["yesterday"])));
        assert_eq!(view.read("h_stats.json"), Some(json!(["only-old"])));
        assert_eq!(view.names_with_suffix("_stats.json"), vec!["g_stats.json", "h_stats.json"]);

        router.route("g_stats.json", &json!(["today"])).unwrap();
        assert_eq!(view.read("g_stats.json"), Some(json!(["today"])));
    }

    #[test]
    fn test_storage_stats_counts_json_only() {
        let dir = TempDir::new().unwrap();
        let config = storage(dir.path(), WritePolicy::Replace);
        std::fs::create_dir_all(config.json_dir.join("nested")).unwrap();
        std::fs::write(config.json_dir.join("a.json"), "[1]").unwrap();
        std::fs::write(config.json_dir.join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir_all(config.snapshot_dir.join("2025-09-14")).unwrap();
        std::fs::write(config.snapshot_dir.join("2025-09-14/a.json"), "[1, 2]").unwrap();

        let stats = storage_stats(&config);
        assert_eq!(stats.json_dir_file_count, 1);
        assert_eq!(stats.json_dir_bytes, 3);
        assert_eq!(stats.snapshot_dir_bytes, 6);
    }
}
