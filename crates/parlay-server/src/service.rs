//! Refresh service: the orchestrator plus notifications and run statistics
//!
//! Shared behind `Arc` by the HTTP layer, both background loops and the
//! one-shot CLI commands.

use anyhow::Context;
use chrono::{DateTime, Utc};
use parlay_common::Result;
use parlay_ingest::http::{HttpClient, HttpClientConfig};
use parlay_ingest::vlr::VlrSource;
use parlay_ingest::EntitySource;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::info;

use crate::config::{Config, StorageConfig};
use crate::events::{Broadcaster, EventToken};
use crate::pipeline::{load_roster, FullRefreshReport, PassReport, PointsAggregator, RefreshOrchestrator};
use crate::state::{StateCounts, StateIndex};
use crate::storage::{
    storage_stats, AtomicFileWriter, CleanupReport, SnapshotLifecycleManager, StorageStats,
    WritePolicyRouter,
};

/// Counters kept across passes for the status query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub last_daily_run: Option<DateTime<Utc>>,
    /// Paths written since startup
    pub files_written: u64,
    pub last_pass_at: Option<DateTime<Utc>>,
    pub last_changed: usize,
}

/// Payload of `GET /api/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub poll_seconds: u64,
    #[serde(flatten)]
    pub storage: StorageStats,
    pub last_daily_run: Option<DateTime<Utc>>,
    pub files_written: u64,
    pub last_pass_at: Option<DateTime<Utc>>,
    pub last_changed: usize,
    pub state_index: StateCounts,
    pub subscribers: usize,
}

pub struct RefreshService {
    orchestrator: RefreshOrchestrator,
    broadcaster: Broadcaster,
    storage: StorageConfig,
    poll_seconds: u64,
    stats: Mutex<RunStats>,
}

impl RefreshService {
    pub fn new(
        orchestrator: RefreshOrchestrator,
        broadcaster: Broadcaster,
        storage: StorageConfig,
        poll_seconds: u64,
    ) -> Self {
        Self {
            orchestrator,
            broadcaster,
            storage,
            poll_seconds,
            stats: Mutex::new(RunStats::default()),
        }
    }

    /// Wire the production stack: state index on disk, event-site source,
    /// points aggregator
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = HttpClient::new(HttpClientConfig {
            concurrency: config.refresh.concurrency,
            max_attempts: config.refresh.fetch_max_attempts,
            ..Default::default()
        })?;
        let source: Arc<dyn EntitySource> = Arc::new(VlrSource::new(http)?);

        Self::with_source(config, source)
    }

    /// Same wiring as [`from_config`](Self::from_config) around any source
    pub fn with_source(config: &Config, source: Arc<dyn EntitySource>) -> anyhow::Result<Self> {
        let storage = &config.storage;
        let index = StateIndex::open(&storage.state_db_path).with_context(|| {
            format!("Failed to open state index at {}", storage.state_db_path.display())
        })?;

        let router = WritePolicyRouter::new(AtomicFileWriter::new(index), storage, config.schedule.tz()?);
        let snapshots = SnapshotLifecycleManager::new(
            router.clone(),
            storage.snapshot_enable,
            storage.snapshot_retention_days,
        );

        let aggregator = match &storage.player_info_path {
            Some(path) => PointsAggregator::with_roster(
                load_roster(path)
                    .with_context(|| format!("Failed to load roster {}", path.display()))?,
            ),
            None => PointsAggregator::new(),
        };

        let orchestrator = RefreshOrchestrator::new(source, router, snapshots, config.refresh.concurrency)
            .with_aggregate(Arc::new(aggregator));

        info!(
            policy = %storage.write_policy,
            snapshots = storage.snapshots_active(),
            json_dir = %storage.json_dir.display(),
            "Refresh service ready"
        );

        Ok(Self::new(
            orchestrator,
            Broadcaster::default(),
            storage.clone(),
            config.refresh.poll_seconds,
        ))
    }

    pub fn orchestrator(&self) -> &RefreshOrchestrator {
        &self.orchestrator
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    pub fn snapshots(&self) -> &SnapshotLifecycleManager {
        self.orchestrator.snapshots()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventToken> {
        self.broadcaster.subscribe()
    }

    /// One pass; notifies subscribers when anything changed
    pub async fn refresh_once(&self, group: &str) -> Result<PassReport> {
        let report = self.orchestrator.refresh_once(group).await?;

        self.record(|stats| {
            stats.files_written += report.written.len() as u64;
            stats.last_pass_at = Some(Utc::now());
            stats.last_changed = report.changed;
        });

        if report.changed > 0 {
            self.broadcaster.emit(EventToken::PointsUpdated);
        }
        Ok(report)
    }

    pub async fn full_refresh(&self, groups: &[String]) -> Result<FullRefreshReport> {
        let report = self.orchestrator.full_refresh(groups).await?;

        self.record(|stats| {
            stats.files_written += report.written.len() as u64;
            stats.last_daily_run = Some(Utc::now());
            stats.last_changed = report.changed;
        });

        if report.anything_changed() {
            self.broadcaster.emit(EventToken::PointsUpdated);
            self.broadcaster.emit(EventToken::DailySnapshot);
        }
        Ok(report)
    }

    pub fn cleanup(&self) -> Result<CleanupReport> {
        self.snapshots().cleanup_expired()
    }

    pub fn run_stats(&self) -> RunStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn status(&self) -> Result<StatusReport> {
        let run = self.run_stats();
        Ok(StatusReport {
            poll_seconds: self.poll_seconds,
            storage: storage_stats(&self.storage),
            last_daily_run: run.last_daily_run,
            files_written: run.files_written,
            last_pass_at: run.last_pass_at,
            last_changed: run.last_changed,
            state_index: self.orchestrator.router().writer().index().counts()?,
            subscribers: self.broadcaster.subscriber_count(),
        })
    }

    fn record(&self, update: impl FnOnce(&mut RunStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        }
    }
}
