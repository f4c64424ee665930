//! One refresh pass over an entity group, and the daily full refresh
//!
//! A pass discovers the group's entities, fetches them concurrently, then
//! walks them in discovery order: unchanged entities are skipped, changed ones
//! are extracted and routed to the store. Aggregates are rebuilt only for the
//! groupings that changed entities fed.
//!
//! Error handling follows the error's kind. A fetch or extraction failure
//! skips that entity. A write failure leaves the entity's recorded
//! fingerprint alone so the next pass retries it. Only an unavailable state
//! index aborts the pass.

use futures::stream::{self, StreamExt};
use parlay_common::types::MANIFEST_FILE_NAME;
use parlay_common::{fingerprint, Result};
use parlay_ingest::{DiscoveredEntity, EntitySource, OutputDocument, RawContent};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::aggregates::AggregateBuilder;
use super::grouping::belongs_to_group;
use crate::storage::{
    json_file_names, read_json, CleanupReport, SnapshotLifecycleManager, StoreView, WriteOutcome, WritePolicyRouter,
};

/// What one pass over one group did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub group: String,
    /// Entities whose new content was fully applied
    pub changed: usize,
    /// Paths actually written, in write order
    pub written: Vec<PathBuf>,
    /// Entities dropped because fetch or extraction failed
    pub skipped_entities: usize,
    pub failed_writes: usize,
    pub sub_entities_changed: usize,
    /// Groupings whose aggregates were rebuilt
    pub recomputed: Vec<String>,
}

impl PassReport {
    fn new(group: &str) -> Self {
        Self {
            group: group.to_string(),
            ..Default::default()
        }
    }
}

/// What a full refresh over several groups did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullRefreshReport {
    pub changed: usize,
    pub written: Vec<PathBuf>,
    pub cleanup: CleanupReport,
    /// The groups' JSON documents present in today's snapshot folder,
    /// sorted, manifest excluded
    pub snapshot_files: Vec<String>,
    pub manifest: Option<PathBuf>,
}

impl FullRefreshReport {
    pub fn anything_changed(&self) -> bool {
        self.changed > 0 || !self.written.is_empty()
    }
}

/// Per-pass scratch state
struct PassState {
    report: PassReport,
    /// Documents routed during this pass, by logical name
    produced: HashMap<String, Value>,
    touched: Vec<String>,
}

pub struct RefreshOrchestrator {
    source: Arc<dyn EntitySource>,
    router: WritePolicyRouter,
    snapshots: SnapshotLifecycleManager,
    aggregates: Vec<Arc<dyn AggregateBuilder>>,
    fetch_concurrency: usize,
}

impl RefreshOrchestrator {
    pub fn new(
        source: Arc<dyn EntitySource>,
        router: WritePolicyRouter,
        snapshots: SnapshotLifecycleManager,
        fetch_concurrency: usize,
    ) -> Self {
        Self {
            source,
            router,
            snapshots,
            aggregates: Vec::new(),
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    pub fn with_aggregate(mut self, builder: Arc<dyn AggregateBuilder>) -> Self {
        self.aggregates.push(builder);
        self
    }

    pub fn router(&self) -> &WritePolicyRouter {
        &self.router
    }

    pub fn snapshots(&self) -> &SnapshotLifecycleManager {
        &self.snapshots
    }

    pub fn group_slug(&self, group: &str) -> String {
        self.source.group_slug(group)
    }

    /// Run one incremental pass over `group`
    #[instrument(name = "refresh_pass", skip(self))]
    pub async fn refresh_once(&self, group: &str) -> Result<PassReport> {
        let mut pass = PassState {
            report: PassReport::new(group),
            produced: HashMap::new(),
            touched: Vec::new(),
        };

        if group.trim().is_empty() {
            debug!("No group configured, nothing to refresh");
            return Ok(pass.report);
        }

        let entities = self.source.discover(group).await?;
        if entities.is_empty() {
            info!("Discovery returned no entities");
            return Ok(pass.report);
        }

        let source = &self.source;
        let fetched: Vec<(DiscoveredEntity, Result<RawContent>)> = stream::iter(entities)
            .map(|entity| async move {
                let raw = source.fetch(&entity).await;
                (entity, raw)
            })
            .buffered(self.fetch_concurrency)
            .collect()
            .await;

        for (entity, raw) in fetched {
            let raw = match raw {
                Ok(raw) => raw,
                Err(e) if e.is_fatal_to_pass() => return Err(e),
                Err(e) => {
                    warn!(entity = %entity.id, url = %entity.url, error = %e, "Fetch failed, skipping entity");
                    pass.report.skipped_entities += 1;
                    continue;
                },
            };
            self.process_entity(group, &entity, &raw, &mut pass)?;
        }

        self.recompute_aggregates(&mut pass)?;

        let report = pass.report;
        info!(
            changed = report.changed,
            written = report.written.len(),
            skipped = report.skipped_entities,
            failed_writes = report.failed_writes,
            "Refresh pass complete"
        );
        Ok(report)
    }

    fn process_entity(
        &self,
        group: &str,
        entity: &DiscoveredEntity,
        raw: &RawContent,
        pass: &mut PassState,
    ) -> Result<()> {
        let index = self.router.writer().index();
        let digest = raw.fingerprint();
        let status = entity.status_or_unknown();

        let previous = index.get_entity_state(&entity.id)?;
        if previous.map(|s| s.last_fingerprint) == Some(digest.clone()) {
            debug!(entity = %entity.id, "Unchanged");
            index.upsert_entity_state(&entity.id, &entity.url, &digest, status)?;
            return Ok(());
        }

        let context_name = self.source.context_name(group, entity);
        let prior = StoreView::new(&self.router, &pass.produced).read(&context_name);

        let extraction = match self.source.extract(group, entity, raw, prior.as_ref()) {
            Ok(extraction) => extraction,
            Err(e) if e.is_fatal_to_pass() => return Err(e),
            Err(e) => {
                warn!(entity = %entity.id, error = %e, "Extraction failed, skipping entity");
                pass.report.skipped_entities += 1;
                return Ok(());
            },
        };

        let mut all_written = true;
        for document in extraction.documents {
            let grouping = document.grouping.clone();
            all_written &= self.write_document(document, pass)?;
            if !grouping.is_empty() && !pass.touched.contains(&grouping) {
                pass.touched.push(grouping);
            }
        }

        if !all_written {
            warn!(entity = %entity.id, "Keeping previous fingerprint after failed write");
            return Ok(());
        }

        for sub in &extraction.sub_entities {
            let sub_digest = fingerprint(&sub.body);
            let known = index
                .get_sub_entity_state(&entity.id, sub.index)?
                .map(|s| s.last_fingerprint);
            if known.as_ref() != Some(&sub_digest) {
                pass.report.sub_entities_changed += 1;
            }
            index.upsert_sub_entity_state(&entity.id, sub.index, &sub_digest)?;
        }

        index.upsert_entity_state(&entity.id, &entity.url, &digest, status)?;
        pass.report.changed += 1;
        info!(entity = %entity.id, stage = ?entity.stage, "Entity changed");
        Ok(())
    }

    /// Route one document; `Ok(false)` on a non-fatal write failure
    fn write_document(&self, document: OutputDocument, pass: &mut PassState) -> Result<bool> {
        match self.router.route(&document.logical_name, &document.body) {
            Ok(paths) => {
                pass.report.written.extend(paths);
                pass.produced.insert(document.logical_name, document.body);
                Ok(true)
            },
            Err(e) if e.is_fatal_to_pass() => Err(e),
            Err(e) => {
                warn!(document = %document.logical_name, error = %e, "Write failed");
                pass.report.failed_writes += 1;
                Ok(false)
            },
        }
    }

    fn recompute_aggregates(&self, pass: &mut PassState) -> Result<()> {
        if pass.touched.is_empty() {
            return Ok(());
        }

        let touched = std::mem::take(&mut pass.touched);
        for grouping in &touched {
            for builder in &self.aggregates {
                let built = {
                    let view = StoreView::new(&self.router, &pass.produced);
                    builder.build(grouping, &view)
                };
                self.write_built(built, pass)?;
            }
        }

        for builder in &self.aggregates {
            let built = {
                let view = StoreView::new(&self.router, &pass.produced);
                builder.build_global(&view)
            };
            self.write_built(built, pass)?;
        }

        pass.report.recomputed = touched;
        Ok(())
    }

    fn write_built(&self, built: Result<Vec<OutputDocument>>, pass: &mut PassState) -> Result<()> {
        let documents = match built {
            Ok(documents) => documents,
            Err(e) if e.is_fatal_to_pass() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Aggregate build failed");
                return Ok(());
            },
        };

        for document in documents {
            self.write_document(document, pass)?;
        }
        Ok(())
    }

    /// Retention cleanup, a pass per group, then today's snapshot copy and
    /// manifest when snapshots are active
    #[instrument(skip(self, groups), fields(groups = groups.len()))]
    pub async fn full_refresh(&self, groups: &[String]) -> Result<FullRefreshReport> {
        let mut report = FullRefreshReport {
            cleanup: self.snapshots.cleanup_expired()?,
            ..Default::default()
        };

        if report.cleanup.folders_deleted > 0 {
            info!(
                folders = report.cleanup.folders_deleted,
                bytes = report.cleanup.bytes_reclaimed,
                "Cleaned up old snapshot folders"
            );
        }

        for group in groups {
            match self.refresh_once(group).await {
                Ok(pass) => {
                    report.changed += pass.changed;
                    report.written.extend(pass.written);
                },
                Err(e) if e.is_fatal_to_pass() => return Err(e),
                Err(e) => warn!(group = %group, error = %e, "Group refresh failed"),
            }
        }

        if self.router.snapshots_active() {
            let slugs: Vec<String> = groups.iter().map(|g| self.source.group_slug(g)).collect();
            let today = self.router.today();
            let folder = self.router.snapshot_folder(today);

            // Under `snapshot` the primary store is not kept current
            if self.router.policy().writes_primary() {
                self.copy_to_snapshot(&slugs, &folder, &mut report)?;
            }

            report.snapshot_files = json_file_names(&folder)
                .into_iter()
                .filter(|name| name != MANIFEST_FILE_NAME)
                .filter(|name| slugs.iter().any(|slug| belongs_to_group(name, slug)))
                .collect();

            let manifest = self
                .snapshots
                .write_manifest(today, slugs, report.snapshot_files.clone())?;
            report.manifest = Some(manifest);
        }

        info!(
            changed = report.changed,
            files_written = report.written.len(),
            policy = %self.router.policy(),
            snapshots = self.router.snapshots_active(),
            "Daily refresh complete"
        );
        Ok(report)
    }

    /// Copy the groups' primary documents into `folder`
    fn copy_to_snapshot(
        &self,
        slugs: &[String],
        folder: &Path,
        report: &mut FullRefreshReport,
    ) -> Result<()> {
        let primary = self.router.primary_root();

        let Ok(entries) = std::fs::read_dir(primary) else {
            return Ok(());
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| slugs.iter().any(|slug| belongs_to_group(name, slug)))
            .collect();
        names.sort();

        for name in names {
            if !name.ends_with(".json") {
                warn!(file = %name, "Skipping non-JSON file in snapshot copy");
                continue;
            }
            let Some(document) = read_json(&primary.join(&name)) else {
                continue;
            };

            let target = folder.join(&name);
            match self.router.writer().write(&target, &document) {
                Ok(WriteOutcome::Written) => report.written.push(target),
                Ok(WriteOutcome::Skipped) => {},
                Err(e) if e.is_fatal_to_pass() => return Err(e),
                Err(e) => warn!(file = %name, error = %e, "Snapshot copy failed"),
            }
        }

        Ok(())
    }
}
