//! Aggregate documents derived from per-group stats
//!
//! Builders are pure with respect to the store: they read through a
//! [`StoreView`] and return documents, and the orchestrator routes them.

use parlay_common::{ParlayError, Result};
use parlay_ingest::{calc_score, OutputDocument, PlayerMapRecord};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::storage::{StoreView, DISPLAY_DOCUMENT};

/// Hard ceiling on a player's cost
pub const MAX_COST: f64 = 15.0;

const COST_SLOPE: f64 = 0.62;
const COST_INTERCEPT: f64 = 4.74;

pub trait AggregateBuilder: Send + Sync {
    /// Documents that depend on `grouping`'s inputs
    fn build(&self, grouping: &str, view: &StoreView<'_>) -> Result<Vec<OutputDocument>>;

    /// Cross-group documents, rebuilt once after the touched groupings
    fn build_global(&self, _view: &StoreView<'_>) -> Result<Vec<OutputDocument>> {
        Ok(Vec::new())
    }
}

pub fn stats_name(grouping: &str) -> String {
    format!("{}_stats.json", grouping)
}

pub fn points_name(grouping: &str) -> String {
    format!("{}_points.json", grouping)
}

pub fn ppg_cost_name(grouping: &str) -> String {
    format!("{}_ppg_cost.json", grouping)
}

/// Expected cost for a points-per-game figure, rounded to the nearest half
/// point and capped at [`MAX_COST`]
pub fn expected_cost(ppg: f64) -> f64 {
    let raw = COST_SLOPE * ppg + COST_INTERCEPT;
    ((raw * 2.0).round() / 2.0).min(MAX_COST)
}

/// One row of `G_ppg_cost.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerCost {
    pub name: String,
    pub ppg: f64,
    pub cost: f64,
    pub games_played: u32,
    pub total_points: i64,
    pub org: String,
}

/// Lower-cased player name to role
pub type Roster = HashMap<String, String>;

/// Load a roster shaped `{ "<player>": { "Role": "<role>", ... }, ... }`
pub fn load_roster(path: &Path) -> Result<Roster> {
    let raw = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)?;

    let Value::Object(players) = value else {
        return Err(ParlayError::parse(format!(
            "Roster {} must be a JSON object keyed by player name",
            path.display()
        )));
    };

    Ok(players
        .into_iter()
        .filter_map(|(name, info)| {
            let role = info
                .get("Role")
                .or_else(|| info.get("role"))
                .and_then(Value::as_str)?
                .to_string();
            Some((name.to_lowercase(), role))
        })
        .collect())
}

/// Points, points-per-game and cost per player, plus the display document
#[derive(Debug, Clone, Default)]
pub struct PointsAggregator {
    roster: Roster,
}

impl PointsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roster(roster: Roster) -> Self {
        Self { roster }
    }

    /// Score every well-formed row of a stats document, in first-seen order
    pub fn player_costs(&self, grouping: &str, stats: &Value) -> Vec<PlayerCost> {
        let Some(rows) = stats.as_array() else {
            warn!(grouping, "Stats document is not a list of rows");
            return Vec::new();
        };

        let mut order: Vec<PlayerCost> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();

        for (position, row) in rows.iter().enumerate() {
            let record = match parse_row(row) {
                Ok(record) => record,
                Err(e) => {
                    warn!(grouping, position, error = %e, "Skipping malformed record");
                    continue;
                },
            };

            let slot = *slots.entry(record.name.clone()).or_insert_with(|| {
                order.push(PlayerCost {
                    name: record.name.clone(),
                    ppg: 0.0,
                    cost: 0.0,
                    games_played: 0,
                    total_points: 0,
                    org: String::new(),
                });
                order.len() - 1
            });

            let entry = &mut order[slot];
            entry.total_points += i64::from(calc_score(&record));
            entry.games_played += 1;
            if entry.org.is_empty() {
                if let Some(org) = record.org.as_deref().filter(|o| !o.is_empty()) {
                    entry.org = org.to_string();
                }
            }
        }

        for entry in &mut order {
            entry.ppg = entry.total_points as f64 / f64::from(entry.games_played.max(1));
            entry.cost = expected_cost(entry.ppg);
        }

        order
    }

    fn display_row(&self, cost: &Map<String, Value>) -> Option<(String, Value)> {
        let name = cost.get("name").and_then(Value::as_str)?.to_string();
        let role = self.roster.get(&name.to_lowercase()).cloned();

        let row = json!({
            "name": name,
            "ppg": cost.get("ppg").cloned().unwrap_or(json!(0)),
            "cost": cost.get("cost").cloned().unwrap_or(json!(0)),
            "role": role,
            "org": cost.get("org").cloned().unwrap_or(json!("")),
        });
        Some((name, row))
    }
}

fn parse_row(row: &Value) -> Result<PlayerMapRecord> {
    let record: PlayerMapRecord = serde_json::from_value(row.clone())
        .map_err(|e| ParlayError::MalformedRecord(e.to_string()))?;

    if record.name.trim().is_empty() {
        return Err(ParlayError::MalformedRecord("row has an empty name".to_string()));
    }
    Ok(record)
}

impl AggregateBuilder for PointsAggregator {
    fn build(&self, grouping: &str, view: &StoreView<'_>) -> Result<Vec<OutputDocument>> {
        let Some(stats) = view.read(&stats_name(grouping)) else {
            debug!(grouping, "No stats document, nothing to aggregate");
            return Ok(Vec::new());
        };

        let costs = self.player_costs(grouping, &stats);

        let points: Map<String, Value> = costs
            .iter()
            .map(|c| (c.name.clone(), json!(c.total_points)))
            .collect();

        Ok(vec![
            OutputDocument {
                logical_name: points_name(grouping),
                grouping: grouping.to_string(),
                body: Value::Object(points),
            },
            OutputDocument {
                logical_name: ppg_cost_name(grouping),
                grouping: grouping.to_string(),
                body: serde_json::to_value(&costs)?,
            },
        ])
    }

    fn build_global(&self, view: &StoreView<'_>) -> Result<Vec<OutputDocument>> {
        let mut rows: Vec<Value> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();

        // File-name order; a later file replaces a player's row in place
        for name in view.names_with_suffix("_ppg_cost.json") {
            let Some(Value::Array(costs)) = view.read(&name) else {
                continue;
            };

            for cost in costs.iter().filter_map(Value::as_object) {
                let Some((player, row)) = self.display_row(cost) else {
                    continue;
                };
                match slots.get(&player) {
                    Some(&slot) => rows[slot] = row,
                    None => {
                        slots.insert(player, rows.len());
                        rows.push(row);
                    },
                }
            }
        }

        Ok(vec![OutputDocument {
            logical_name: DISPLAY_DOCUMENT.to_string(),
            grouping: String::new(),
            body: Value::Array(rows),
        }])
    }
}
