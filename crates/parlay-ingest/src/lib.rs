//! Parlay Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! The remote side of the refresh pipeline: a rate-limited HTTP client, the
//! [`EntitySource`] seam and the event-site scraper that implements it,
//! plus the per-map record model and its scoring rules.
//!
//! # Example
//!
//! ```no_run
//! use parlay_ingest::http::{HttpClient, HttpClientConfig};
//! use parlay_ingest::source::EntitySource;
//! use parlay_ingest::vlr::VlrSource;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = VlrSource::new(HttpClient::new(HttpClientConfig::default())?)?;
//!     let matches = source
//!         .discover("https://www.vlr.gg/event/2283/valorant-champions-2025")
//!         .await?;
//!     println!("{} matches", matches.len());
//!     Ok(())
//! }
//! ```

pub mod http;
pub mod models;
pub mod scoring;
pub mod source;
pub mod vlr;

pub use models::PlayerMapRecord;
pub use scoring::calc_score;
pub use source::{DiscoveredEntity, EntitySource, Extraction, OutputDocument, RawContent, SubEntity};
