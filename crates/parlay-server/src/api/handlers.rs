//! Route handlers

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::NaiveDate;
use futures::Stream;
use parlay_common::types::SNAPSHOT_DATE_FORMAT;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use super::AppState;
use crate::error::AppError;
use crate::service::StatusReport;
use crate::storage::{json_file_names, read_json};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn status(State(state): State<AppState>) -> Result<Json<StatusReport>, AppError> {
    Ok(Json(state.service.status()?))
}

#[derive(Debug, Default, Deserialize)]
pub struct PointsQuery {
    /// File-name prefix, usually an event slug
    pub event: Option<String>,
}

/// Every `*_points.json` in the primary store whose name starts with
/// `event`, merged in file-name order
pub async fn points(
    State(state): State<AppState>,
    Query(query): Query<PointsQuery>,
) -> Json<Value> {
    let dir = &state.service.storage().json_dir;
    let prefix = query.event.unwrap_or_default();

    let mut merged = Map::new();
    for name in json_file_names(dir)
        .into_iter()
        .filter(|name| name.ends_with("_points.json") && name.starts_with(prefix.as_str()))
    {
        if let Some(Value::Object(points)) = read_json(&dir.join(&name)) {
            merged.extend(points);
        }
    }

    Json(Value::Object(merged))
}

/// Server-sent events, one `data:` line per token
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    let tokens = BroadcastStream::new(state.service.subscribe()).filter_map(|received| {
        // Lagged receivers skip what they missed
        received
            .ok()
            .map(|token| Ok(Event::default().data(token.as_str())))
    });

    Sse::new(tokens).keep_alive(KeepAlive::default())
}

pub async fn latest_snapshot(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let snapshots = state.service.snapshots();

    let body = match snapshots.latest_folder()? {
        Some((date, _)) => json!({
            "latest": date.format(SNAPSHOT_DATE_FORMAT).to_string(),
            "manifest": snapshots.manifest_for(date),
        }),
        None => json!({ "latest": null, "manifest": null }),
    };

    Ok(Json(body))
}

pub async fn snapshot_by_date(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<Value>, AppError> {
    let parsed = NaiveDate::parse_from_str(&date, SNAPSHOT_DATE_FORMAT)
        .map_err(|_| AppError::BadRequest(format!("Invalid snapshot date '{}', expected YYYY-MM-DD", date)))?;

    let folder = state.service.orchestrator().router().snapshot_folder(parsed);
    Ok(Json(json!({
        "date": date,
        "files": json_file_names(&folder),
    })))
}
