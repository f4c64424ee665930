//! Test helpers for parlay-server integration tests
//!
//! - An in-process [`EntitySource`] whose entities and failures tests control
//! - An aggregate builder that records which groupings it was asked for
//! - Storage and orchestrator wiring rooted in a temp directory

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use parlay_common::{ParlayError, Result, WritePolicy};
use parlay_ingest::{
    DiscoveredEntity, EntitySource, Extraction, OutputDocument, RawContent, SubEntity,
};
use parlay_server::config::StorageConfig;
use parlay_server::pipeline::{AggregateBuilder, RefreshOrchestrator};
use parlay_server::state::StateIndex;
use parlay_server::storage::{
    AtomicFileWriter, SnapshotLifecycleManager, StoreView, WritePolicyRouter,
};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Entities are `(id, content)` pairs; each entity produces `<group>_<id>.json`
/// in grouping `<group>_<id>`, with its content as the body.
#[derive(Default)]
pub struct FakeSource {
    entities: Mutex<Vec<(String, Value)>>,
    failing: Mutex<HashSet<String>>,
    /// Entities whose fetch reports the state index as unavailable
    fatal: Mutex<HashSet<String>>,
    /// Every entity extends one shared `<group>_all.json` document
    merging: AtomicBool,
    extractions: AtomicUsize,
}

impl FakeSource {
    pub fn new(entities: &[(&str, Value)]) -> Arc<Self> {
        let source = Self::default();
        source.set_all(entities);
        Arc::new(source)
    }

    pub fn set_all(&self, entities: &[(&str, Value)]) {
        *self.entities.lock().unwrap() = entities
            .iter()
            .map(|(id, content)| (id.to_string(), content.clone()))
            .collect();
    }

    pub fn set(&self, id: &str, content: Value) {
        let mut entities = self.entities.lock().unwrap();
        match entities.iter_mut().find(|(known, _)| known == id) {
            Some(entry) => entry.1 = content,
            None => entities.push((id.to_string(), content)),
        }
    }

    pub fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn heal(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
        self.fatal.lock().unwrap().remove(id);
    }

    pub fn fail_fatally(&self, id: &str) {
        self.fatal.lock().unwrap().insert(id.to_string());
    }

    pub fn merge_into_one_document(&self) {
        self.merging.store(true, Ordering::SeqCst);
    }

    pub fn extractions(&self) -> usize {
        self.extractions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EntitySource for FakeSource {
    fn group_slug(&self, group: &str) -> String {
        group.to_string()
    }

    async fn discover(&self, _group: &str) -> Result<Vec<DiscoveredEntity>> {
        let entities = self.entities.lock().unwrap().clone();
        Ok(entities
            .into_iter()
            .map(|(id, _)| {
                let url = format!("https://stats.example/{}", id);
                DiscoveredEntity::new(id, url)
            })
            .collect())
    }

    async fn fetch(&self, entity: &DiscoveredEntity) -> Result<RawContent> {
        if self.fatal.lock().unwrap().contains(&entity.id) {
            return Err(ParlayError::persistence("database is locked"));
        }
        if self.failing.lock().unwrap().contains(&entity.id) {
            return Err(ParlayError::TransientFetch {
                url: entity.url.clone(),
                attempts: 5,
                message: "503 Service Unavailable".to_string(),
            });
        }

        let content = self
            .entities
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| *id == entity.id)
            .map(|(_, content)| content.clone())
            .unwrap_or(Value::Null);

        Ok(RawContent::new(vec![content.to_string()]))
    }

    fn context_name(&self, group: &str, entity: &DiscoveredEntity) -> String {
        if self.merging.load(Ordering::SeqCst) {
            format!("{}_all.json", group)
        } else {
            format!("{}_{}.json", group, entity.id)
        }
    }

    fn extract(
        &self,
        group: &str,
        entity: &DiscoveredEntity,
        raw: &RawContent,
        prior: Option<&Value>,
    ) -> Result<Extraction> {
        self.extractions.fetch_add(1, Ordering::SeqCst);
        let body: Value = serde_json::from_str(&raw.parts[0])?;

        if self.merging.load(Ordering::SeqCst) {
            let mut merged = match prior {
                Some(Value::Object(rows)) => rows.clone(),
                _ => Map::new(),
            };
            merged.insert(entity.id.clone(), body.clone());

            return Ok(Extraction {
                documents: vec![OutputDocument {
                    logical_name: self.context_name(group, entity),
                    grouping: format!("{}_all", group),
                    body: Value::Object(merged),
                }],
                sub_entities: vec![SubEntity { index: 1, body }],
            });
        }

        Ok(Extraction {
            documents: vec![OutputDocument {
                logical_name: self.context_name(group, entity),
                grouping: format!("{}_{}", group, entity.id),
                body: body.clone(),
            }],
            sub_entities: vec![SubEntity { index: 1, body }],
        })
    }
}

/// Writes `<grouping>_agg.json` wrapping the grouping's document, and
/// remembers every grouping it was asked to build
#[derive(Default)]
pub struct CountingAggregator {
    built: Mutex<Vec<String>>,
}

impl CountingAggregator {
    pub fn built(&self) -> Vec<String> {
        self.built.lock().unwrap().clone()
    }

    pub fn reset(&self) {
        self.built.lock().unwrap().clear();
    }
}

impl AggregateBuilder for CountingAggregator {
    fn build(&self, grouping: &str, view: &StoreView<'_>) -> Result<Vec<OutputDocument>> {
        self.built.lock().unwrap().push(grouping.to_string());
        let input = view.read(&format!("{}.json", grouping)).unwrap_or(Value::Null);

        Ok(vec![OutputDocument {
            logical_name: format!("{}_agg.json", grouping),
            grouping: grouping.to_string(),
            body: json!({ "input": input }),
        }])
    }
}

pub fn storage_config(dir: &Path, policy: WritePolicy, snapshot_enable: bool) -> StorageConfig {
    StorageConfig {
        json_dir: dir.join("json"),
        snapshot_dir: dir.join("json/snapshots"),
        display_path: dir.join("player_display.json"),
        state_db_path: dir.join("data/state.sqlite"),
        player_info_path: None,
        write_policy: policy,
        snapshot_enable,
        snapshot_retention_days: 7,
    }
}

pub fn router(storage: &StorageConfig) -> WritePolicyRouter {
    let index = StateIndex::open(&storage.state_db_path).unwrap();
    WritePolicyRouter::new(AtomicFileWriter::new(index), storage, chrono_tz::UTC)
}

pub struct Harness {
    pub storage: StorageConfig,
    pub source: Arc<FakeSource>,
    pub aggregator: Arc<CountingAggregator>,
    pub orchestrator: RefreshOrchestrator,
}

pub fn harness(dir: &Path, policy: WritePolicy, snapshot_enable: bool, entities: &[(&str, Value)]) -> Harness {
    let storage = storage_config(dir, policy, snapshot_enable);
    let router = router(&storage);
    let snapshots = SnapshotLifecycleManager::new(
        router.clone(),
        storage.snapshot_enable,
        storage.snapshot_retention_days,
    );

    let source = FakeSource::new(entities);
    let aggregator = Arc::new(CountingAggregator::default());
    let orchestrator = RefreshOrchestrator::new(source.clone(), router, snapshots, 4)
        .with_aggregate(aggregator.clone());

    Harness {
        storage,
        source,
        aggregator,
        orchestrator,
    }
}
