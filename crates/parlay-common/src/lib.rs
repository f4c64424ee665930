//! Parlay Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Parlay project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Parlay workspace members:
//!
//! - **Error Handling**: The [`ParlayError`] taxonomy and [`Result`] alias
//! - **Fingerprints**: Order-independent content digests for change detection
//! - **Types**: Write policy and snapshot manifest
//! - **Logging**: Centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use parlay_common::fingerprint::fingerprint;
//! use serde_json::json;
//!
//! let before = fingerprint(&json!({"score": 5, "name": "A1"}));
//! let after = fingerprint(&json!({"name": "A1", "score": 5}));
//! assert_eq!(before, after);
//! ```

pub mod error;
pub mod fingerprint;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ParlayError, Result};
pub use fingerprint::{fingerprint, Fingerprint};
pub use types::{SnapshotManifest, WritePolicy};
