//! Parlay Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental refresh of event statistics into a JSON document store.
//!
//! # Overview
//!
//! - **State index**: SQLite record of the last fingerprint seen per entity,
//!   sub-entity and output file
//! - **Storage**: fingerprint-gated atomic writes, write-policy routing and
//!   dated snapshot folders with retention
//! - **Pipeline**: discover, fetch, compare, write, then recompute the
//!   aggregates of touched groupings only
//! - **Service**: run statistics and push notifications around the pipeline
//! - **Scheduling**: the poller and the daily full-refresh loops
//! - **API**: read-only HTTP endpoints and a server-sent event stream
//!
//! # Example
//!
//! ```no_run
//! use parlay_server::{config::Config, service::RefreshService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let service = RefreshService::from_config(&config)?;
//!     let report = service
//!         .refresh_once("https://www.vlr.gg/event/2283/valorant-champions-2025")
//!         .await?;
//!     println!("{} changed, {} files written", report.changed, report.written.len());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod middleware;
pub mod pipeline;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod storage;
