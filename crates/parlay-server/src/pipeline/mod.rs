//! Refresh pipeline: change detection, routing and aggregate recomputation

pub mod aggregates;
pub mod grouping;
pub mod orchestrator;

pub use aggregates::{load_roster, AggregateBuilder, PointsAggregator, Roster};
pub use grouping::{belongs_to_group, group_prefixes};
pub use orchestrator::{FullRefreshReport, PassReport, RefreshOrchestrator};
