//! Event-site source: discovers the matches of an event, fetches their pages
//! and flattens them into per-player-per-map stat rows.
//!
//! A group is an event URL such as
//! `https://www.vlr.gg/event/2283/valorant-champions-2025`. Each match of the
//! event is one entity; each played map of a match is one sub-entity.

mod event;
mod matches;

use event::{parse_match_links, parse_matches_tab, parse_stage_links};
use matches::{build_rows, parse_maps, parse_performance};

use crate::http::HttpClient;
use crate::models::PlayerMapRecord;
use crate::source::{
    DiscoveredEntity, EntitySource, Extraction, OutputDocument, RawContent, SubEntity,
};
use async_trait::async_trait;
use parlay_common::{ParlayError, Result};
use regex::Regex;
use scraper::Selector;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub const VLR_BASE_URL: &str = "https://www.vlr.gg";

/// Stage used when discovery did not attach one
pub const DEFAULT_STAGE: &str = "playoffs";

/// Compiled CSS selectors used by the page parsers
pub(crate) struct Selectors {
    pub nav_item: Selector,
    pub anchor: Selector,
    pub match_item: Selector,
    pub adv_stats_table: Selector,
    pub table: Selector,
    pub row: Selector,
    pub cell: Selector,
    pub team: Selector,
    pub text_of: Selector,
    pub stat_cell: Selector,
    pub rating_both: Selector,
    pub game_block: Selector,
    pub map_name: Selector,
    pub body_row: Selector,
    pub kills: Selector,
    pub deaths: Selector,
    pub assists: Selector,
    pub both: Selector,
}

impl Selectors {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            nav_item: selector("a.wf-nav-item")?,
            anchor: selector("a")?,
            match_item: selector("a.wf-module-item.match-item")?,
            adv_stats_table: selector("table.mod-adv-stats")?,
            table: selector("table")?,
            row: selector("tr")?,
            cell: selector("td")?,
            team: selector("div.team")?,
            text_of: selector("div.text-of")?,
            stat_cell: selector("td.mod-stat")?,
            rating_both: selector("span.side.mod-side.mod-both")?,
            game_block: selector("div.vm-stats-game")?,
            map_name: selector("div.map")?,
            body_row: selector("tbody tr")?,
            kills: selector("td.mod-vlr-kills")?,
            deaths: selector("td.mod-vlr-deaths")?,
            assists: selector("td.mod-vlr-assists")?,
            both: selector("span.mod-both")?,
        })
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ParlayError::parse(format!("Bad selector '{}': {}", css, e)))
}

/// Event slug: the sixth `/`-separated segment of the event URL
pub fn event_slug(event_url: &str) -> String {
    event_url
        .split('/')
        .nth(5)
        .map(|s| s.split(['?', '#']).next().unwrap_or(s))
        .filter(|s| !s.is_empty())
        .unwrap_or("event")
        .to_string()
}

/// Collapse a stage label onto the three stage kinds used in file names
pub fn normalize_stage(stage: &str) -> String {
    match stage {
        "playoffs" | "swiss" | "group" => stage.to_string(),
        other if ["final", "playoff", "bracket"].iter().any(|k| other.contains(k)) => {
            "playoffs".to_string()
        },
        _ => "group".to_string(),
    }
}

/// Grouping (and file-name prefix) of a stage of an event
pub fn stage_grouping(event_url: &str, stage: Option<&str>) -> String {
    let stage = stage.unwrap_or(DEFAULT_STAGE).replace(' ', "_");
    format!("{}_{}", event_slug(event_url), stage)
}

/// Site-scraping implementation of [`EntitySource`]
pub struct VlrSource {
    http: HttpClient,
    base_url: String,
    match_id: Regex,
    selectors: Selectors,
}

impl VlrSource {
    pub fn new(http: HttpClient) -> Result<Self> {
        Self::with_base_url(http, VLR_BASE_URL)
    }

    /// Point the source at another host (mirrors, tests)
    pub fn with_base_url(http: HttpClient, base_url: impl Into<String>) -> Result<Self> {
        let match_id = Regex::new(r"^https?://[^/]+/(\d+)/")
            .map_err(|e| ParlayError::parse(format!("Bad match id pattern: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            match_id,
            selectors: Selectors::new()?,
        })
    }

    /// Numeric match id from a match URL, or the URL itself if it has none
    pub fn match_id_from_url(&self, url: &str) -> String {
        self.match_id
            .captures(url)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| url.to_string())
    }

    /// Stage name and match-list URL for every stage of the event, in page order
    pub async fn stage_urls(&self, event_url: &str) -> Result<Vec<(String, String)>> {
        let event_html = self.http.get_text(event_url).await?;

        let Some(matches_href) = parse_matches_tab(&self.selectors, &event_html) else {
            warn!(event_url, "No matches tab on event page");
            return Ok(Vec::new());
        };
        let matches_url = format!("{}{}", self.base_url, matches_href);

        let matches_html = self.http.get_text(&matches_url).await?;
        let stages = parse_stage_links(&self.selectors, &matches_html, &self.base_url);

        if stages.is_empty() {
            return Ok(vec![("main".to_string(), matches_url)]);
        }
        Ok(stages)
    }

    /// Overview and performance URLs for a match
    pub fn match_pages(&self, match_url: &str) -> (String, String) {
        let base = match_url.split('?').next().unwrap_or(match_url);
        (match_url.to_string(), format!("{}?game=all&tab=performance", base))
    }

    /// Parse fetched match pages into flat stat rows
    pub fn match_rows(&self, entity: &DiscoveredEntity, raw: &RawContent) -> Result<Vec<PlayerMapRecord>> {
        let [overview, performance] = raw.parts.as_slice() else {
            return Err(ParlayError::parse(format!(
                "Expected overview and performance pages for {}, got {} part(s)",
                entity.url,
                raw.parts.len()
            )));
        };

        let perf = parse_performance(&self.selectors, performance);
        let maps = parse_maps(&self.selectors, overview);
        Ok(build_rows(&entity.id, &entity.url, &maps, &perf))
    }
}

#[async_trait]
impl EntitySource for VlrSource {
    fn group_slug(&self, group: &str) -> String {
        event_slug(group)
    }

    async fn discover(&self, group: &str) -> Result<Vec<DiscoveredEntity>> {
        let stages = self.stage_urls(group).await?;
        let mut seen = HashSet::new();
        let mut entities = Vec::new();

        for (stage_name, stage_url) in stages {
            let html = match self.http.get_text(&stage_url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(stage = %stage_name, url = %stage_url, error = %e, "Skipping stage");
                    continue;
                },
            };

            let links = parse_match_links(&self.selectors, &html, &self.base_url);
            debug!(stage = %stage_name, matches = links.len(), "Stage match list parsed");

            let stage = normalize_stage(&stage_name);
            for url in links {
                let id = self.match_id_from_url(&url);
                if seen.insert(id.clone()) {
                    entities.push(DiscoveredEntity::new(id, url).with_stage(stage.clone()));
                }
            }
        }

        info!(event = group, entities = entities.len(), "Discovered matches");
        Ok(entities)
    }

    async fn fetch(&self, entity: &DiscoveredEntity) -> Result<RawContent> {
        let (overview_url, performance_url) = self.match_pages(&entity.url);
        let overview = self.http.get_text(&overview_url).await?;
        let performance = self.http.get_text(&performance_url).await?;
        Ok(RawContent::new(vec![overview, performance]))
    }

    fn context_name(&self, group: &str, entity: &DiscoveredEntity) -> String {
        format!("{}_stats.json", stage_grouping(group, entity.stage.as_deref()))
    }

    fn extract(
        &self,
        group: &str,
        entity: &DiscoveredEntity,
        raw: &RawContent,
        prior: Option<&Value>,
    ) -> Result<Extraction> {
        let rows = self.match_rows(entity, raw)?;

        let mut sub_entities: Vec<SubEntity> = Vec::new();
        for row in &rows {
            let body = serde_json::to_value(row)?;
            match sub_entities.iter_mut().find(|s| s.index == row.map_num) {
                Some(sub) => {
                    if let Value::Array(items) = &mut sub.body {
                        items.push(body);
                    }
                },
                None => sub_entities.push(SubEntity {
                    index: row.map_num,
                    body: Value::Array(vec![body]),
                }),
            }
        }

        let mut merged = carried_rows(prior, entity);
        for row in &rows {
            merged.push(serde_json::to_value(row)?);
        }

        let grouping = stage_grouping(group, entity.stage.as_deref());
        Ok(Extraction {
            documents: vec![OutputDocument {
                logical_name: format!("{}_stats.json", grouping),
                grouping,
                body: Value::Array(merged),
            }],
            sub_entities,
        })
    }
}

/// Rows of the prior stats document that belong to other matches
fn carried_rows(prior: Option<&Value>, entity: &DiscoveredEntity) -> Vec<Value> {
    match prior {
        None => Vec::new(),
        Some(Value::Array(rows)) => rows
            .iter()
            .filter(|row| {
                let same_id = row.get("match_id").and_then(Value::as_str) == Some(entity.id.as_str());
                let same_url = row.get("match_url").and_then(Value::as_str) == Some(entity.url.as_str());
                !(same_id || same_url)
            })
            .cloned()
            .collect(),
        Some(_) => {
            warn!(entity_id = %entity.id, "Prior stats document is not a list, starting fresh");
            Vec::new()
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::http::HttpClientConfig;
    use serde_json::json;

    fn source() -> VlrSource {
        VlrSource::new(HttpClient::new(HttpClientConfig::default()).unwrap()).unwrap()
    }

    #[test]
    fn test_event_slug() {
        assert_eq!(
            event_slug("https://www.vlr.gg/event/2283/valorant-champions-2025"),
            "valorant-champions-2025"
        );
        assert_eq!(
            event_slug("https://www.vlr.gg/event/2283/champions-2025?tab=matches"),
            "champions-2025"
        );
        assert_eq!(event_slug("https://www.vlr.gg/event"), "event");
    }

    #[test]
    fn test_normalize_stage() {
        assert_eq!(normalize_stage("swiss"), "swiss");
        assert_eq!(normalize_stage("grand_final"), "playoffs");
        assert_eq!(normalize_stage("upper_bracket"), "playoffs");
        assert_eq!(normalize_stage("main"), "group");
        assert_eq!(normalize_stage("week_1"), "group");
    }

    #[test]
    fn test_match_id_from_url() {
        let source = source();
        assert_eq!(
            source.match_id_from_url("https://www.vlr.gg/542195/fnatic-vs-sentinels?tab=overview"),
            "542195"
        );
        assert_eq!(source.match_id_from_url("not-a-match"), "not-a-match");
    }

    #[test]
    fn test_context_name_matches_stats_document() {
        let source = source();
        let entity = DiscoveredEntity::new("1", "https://www.vlr.gg/1/a-vs-b").with_stage("swiss");
        assert_eq!(
            source.context_name("https://www.vlr.gg/event/1/masters-toronto", &entity),
            "masters-toronto_swiss_stats.json"
        );
    }

    #[test]
    fn test_performance_page_url() {
        let (overview, perf) = source().match_pages("https://www.vlr.gg/7/x-vs-y?tab=overview");
        assert_eq!(overview, "https://www.vlr.gg/7/x-vs-y?tab=overview");
        assert_eq!(perf, "https://www.vlr.gg/7/x-vs-y?game=all&tab=performance");
    }

    #[test]
    fn test_carried_rows_replace_same_match() {
        let entity = DiscoveredEntity::new("7", "https://www.vlr.gg/7/x-vs-y?tab=overview");
        let prior = json!([
            {"name": "a", "match_id": "7", "match_url": entity.url},
            {"name": "b", "match_id": "8", "match_url": "https://www.vlr.gg/8/z?tab=overview"},
            {"name": "c", "match_url": entity.url},
        ]);

        let kept = carried_rows(Some(&prior), &entity);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["name"], "b");
        assert!(carried_rows(Some(&json!({"oops": true})), &entity).is_empty());
    }

    #[test]
    fn test_extract_rejects_missing_pages() {
        let source = source();
        let entity = DiscoveredEntity::new("7", "https://www.vlr.gg/7/x");
        let raw = RawContent::new(vec!["<html></html>".into()]);
        assert!(source.extract("https://www.vlr.gg/event/1/e", &entity, &raw, None).is_err());
    }
}
