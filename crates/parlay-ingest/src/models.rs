//! Record models for per-player match statistics

use serde::{Deserialize, Serialize};

/// One player's line on one map of one match.
///
/// This is the row shape of every `*_stats.json` document. Older documents
/// used `2K`..`5K` for the multikill columns, so those names are accepted on
/// input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerMapRecord {
    pub name: String,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default, alias = "2K")]
    pub two_k: u32,
    #[serde(default, alias = "3K")]
    pub three_k: u32,
    #[serde(default, alias = "4K")]
    pub four_k: u32,
    #[serde(default, alias = "5K")]
    pub five_k: u32,
    #[serde(default)]
    pub r2_0: Option<f64>,
    #[serde(default)]
    pub won_map: Option<bool>,
    #[serde(default)]
    pub map_differential: Option<i32>,
    #[serde(default)]
    pub series_score: Option<String>,
    #[serde(default)]
    pub overall_rank: Option<u32>,
    #[serde(default)]
    pub map_name: Option<String>,
    #[serde(default)]
    pub map_num: u32,
    #[serde(default)]
    pub match_id: String,
    #[serde(default)]
    pub match_url: String,
}

/// Match-wide numbers from the performance tab
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceLine {
    pub two_k: u32,
    pub three_k: u32,
    pub four_k: u32,
    pub five_k: u32,
    pub r2_0: Option<f64>,
}

/// Kills, deaths and assists for one player on one map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapLine {
    pub name: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
}

/// One played map with its players
#[derive(Debug, Clone, PartialEq)]
pub struct MapBlock {
    pub map_num: u32,
    pub map_name: Option<String>,
    pub players: Vec<MapLine>,
}
