//! The seam between the refresh pipeline and a remote data source
//!
//! A source knows how to list the entities of a group, fetch one entity's raw
//! content and turn that content into output documents. The pipeline owns
//! change detection and persistence; the source never touches the store.

use async_trait::async_trait;
use parlay_common::{fingerprint, Fingerprint, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One remote entity as reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredEntity {
    /// Stable external identifier
    pub id: String,
    pub url: String,
    pub stage: Option<String>,
    pub status: Option<String>,
}

impl DiscoveredEntity {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            stage: None,
            status: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Lifecycle string recorded in the state index
    pub fn status_or_unknown(&self) -> &str {
        self.status.as_deref().unwrap_or("unknown")
    }
}

/// Raw fetched content of one entity, as an ordered list of parts
/// (e.g. several pages making up one match)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawContent {
    pub parts: Vec<String>,
}

impl RawContent {
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let parts = self.parts.iter().cloned().map(Value::String).collect();
        fingerprint(&Value::Array(parts))
    }
}

/// A document to be routed to the store under `logical_name`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputDocument {
    pub logical_name: String,
    /// Aggregate grouping the document feeds (e.g. `champions-2025_playoffs`)
    pub grouping: String,
    pub body: Value,
}

/// An ordered child of an entity that is fingerprinted on its own
#[derive(Debug, Clone, PartialEq)]
pub struct SubEntity {
    pub index: u32,
    pub body: Value,
}

/// Everything derived from one entity's raw content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub documents: Vec<OutputDocument>,
    pub sub_entities: Vec<SubEntity>,
}

#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Short name of a group, used as the file-name prefix of everything the
    /// group produces
    fn group_slug(&self, group: &str) -> String;

    /// Current entities of `group`; an empty list is a valid answer
    async fn discover(&self, group: &str) -> Result<Vec<DiscoveredEntity>>;

    async fn fetch(&self, entity: &DiscoveredEntity) -> Result<RawContent>;

    /// Logical name of the document this entity's extraction builds upon.
    ///
    /// The pipeline looks the document up and hands it to [`extract`] as
    /// prior context.
    ///
    /// [`extract`]: EntitySource::extract
    fn context_name(&self, group: &str, entity: &DiscoveredEntity) -> String;

    fn extract(
        &self,
        group: &str,
        entity: &DiscoveredEntity,
        raw: &RawContent,
        prior: Option<&Value>,
    ) -> Result<Extraction>;
}
