//! Event and match-list page parsers

use super::Selectors;
use scraper::{ElementRef, Html};
use std::collections::BTreeSet;

fn stripped_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}

/// Relative href of the event's "Matches" tab
pub(crate) fn parse_matches_tab(selectors: &Selectors, html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&selectors.nav_item)
        .find(|a| stripped_text(*a).to_lowercase().starts_with("matches"))
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}

/// Stage links on a matches page, keyed by stage kind.
///
/// Links whose text mentions playoffs, swiss or group get that key; anything
/// else is keyed by its own text with spaces folded to `_`. A repeated key
/// keeps its first position and takes the later URL.
pub(crate) fn parse_stage_links(
    selectors: &Selectors,
    html: &str,
    base_url: &str,
) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let mut stages: Vec<(String, String)> = Vec::new();

    for a in document.select(&selectors.anchor) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        if !(href.starts_with("/event/matches/") && href.contains("series_id=")) {
            continue;
        }

        let text = stripped_text(a).to_lowercase();
        let key = if text.contains("playoff") {
            "playoffs".to_string()
        } else if text.contains("swiss") {
            "swiss".to_string()
        } else if text.contains("group") {
            "group".to_string()
        } else {
            text.replace(' ', "_")
        };

        let url = format!("{}{}", base_url, href);
        match stages.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = url,
            None => stages.push((key, url)),
        }
    }

    stages
}

/// Absolute overview URLs of the matches listed on a stage page, sorted and
/// deduplicated
pub(crate) fn parse_match_links(selectors: &Selectors, html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut urls = BTreeSet::new();

    for a in document.select(&selectors.match_item) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        if !href.starts_with('/') {
            continue;
        }

        let mut url = format!("{}{}", base_url, href);
        if !url.contains("?tab=overview") {
            url.push_str("?tab=overview");
        }
        urls.insert(url);
    }

    urls.into_iter().collect()
}
