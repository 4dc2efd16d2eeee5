use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::core::protocol::SyncSnapshot;
use crate::db::WriteOutcome;
use crate::models::UnresolvedConflict;
use crate::response::AppError;
use crate::state::AppState;

/// Server keys are namespaced so configs and card stats cannot collide.
const CONFIG_PREFIX: &str = "config:";
const CARD_PREFIX: &str = "card:";

pub fn router() -> Router<AppState> {
    Router::new().route("/sync", get(load_snapshot).post(save_snapshot))
}

#[derive(Debug, Deserialize)]
struct SyncRequest {
    #[serde(default)]
    configs: Option<Map<String, Value>>,
    #[serde(rename = "cardStats", default)]
    card_stats: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    message: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    conflicts: Vec<UnresolvedConflict>,
}

async fn load_snapshot(State(state): State<AppState>) -> Result<Json<SyncSnapshot>, AppError> {
    let store = state.store();
    let mut snapshot = SyncSnapshot::default();
    for key in store.keys().await? {
        let Some(value) = store.get(&key).await? else {
            continue;
        };
        if let Some(name) = key.strip_prefix(CONFIG_PREFIX) {
            snapshot.configs.insert(name.to_string(), value);
        } else if let Some(card) = key.strip_prefix(CARD_PREFIX) {
            snapshot.card_stats.insert(card.to_string(), value);
        }
    }
    Ok(Json(snapshot))
}

async fn save_snapshot(
    State(state): State<AppState>,
    Json(body): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    if body.configs.is_none() && body.card_stats.is_none() {
        return Err(AppError::bad_request("No data provided to sync"));
    }
    let mut keys = Vec::new();
    let mut entries = Vec::new();
    let mut configs = 0usize;
    for (name, value) in body.configs.unwrap_or_default() {
        entries.push((format!("{CONFIG_PREFIX}{name}"), value));
        keys.push(None);
        configs += 1;
    }
    for (key, value) in body.card_stats.unwrap_or_default() {
        entries.push((format!("{CARD_PREFIX}{key}"), value));
        keys.push(Some(key));
    }

    // One unit: a storage error leaves nothing from this request behind.
    let outcomes = state.store().write_entries(entries).await?;

    let mut conflicts = Vec::new();
    let mut written = 0usize;
    for (key, outcome) in keys.into_iter().zip(outcomes) {
        match (key, outcome) {
            (None, _) => {}
            (Some(_), WriteOutcome::Committed(_)) => written += 1,
            (Some(key), WriteOutcome::Conflict(mut conflict)) => {
                conflict.original_key = key;
                conflicts.push(conflict);
            }
        }
    }

    if conflicts.is_empty() {
        info!(configs, cards = written, "snapshot saved");
    } else {
        warn!(configs, cards = written, conflicts = conflicts.len(), "snapshot saved with conflicts");
    }

    Ok(Json(SyncResponse {
        message: if conflicts.is_empty() {
            "Data saved successfully"
        } else {
            "Data saved with conflicts"
        },
        conflicts,
    }))
}
