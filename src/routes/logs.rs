use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logging::CLIENT_LOG_TARGET;
use crate::response::AppError;
use crate::state::AppState;

const MAX_BATCH: usize = 100;
const MAX_LABEL_LEN: usize = 100;
const MAX_PAYLOAD_LEN: usize = 10_000;

pub fn router() -> Router<AppState> {
    Router::new().route("/logs", post(ingest))
}

#[derive(Debug, Default, Deserialize)]
struct ClientLog {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

impl ClientLog {
    fn is_empty(&self) -> bool {
        self.category.is_none() && self.event.is_none() && self.payload.as_ref().map_or(true, Value::is_null)
    }

    fn payload_text(&self) -> String {
        self.payload
            .as_ref()
            .map(Value::to_string)
            .unwrap_or_default()
    }

    fn is_oversized(&self) -> bool {
        let too_long = |label: &Option<String>| label.as_ref().is_some_and(|s| s.len() > MAX_LABEL_LEN);
        too_long(&self.category) || too_long(&self.event) || self.payload_text().len() > MAX_PAYLOAD_LEN
    }
}

/// One entry, or `{ "logs": [...] }` from a client that buffers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LogsRequest {
    Batch { logs: Vec<ClientLog> },
    Single(ClientLog),
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    received: usize,
}

async fn ingest(Json(body): Json<LogsRequest>) -> Result<Json<LogsResponse>, AppError> {
    let entries = match body {
        LogsRequest::Batch { logs } => logs,
        LogsRequest::Single(entry) => vec![entry],
    };
    if entries.is_empty() || entries.iter().any(ClientLog::is_empty) {
        return Err(AppError::bad_request("Empty log payload"));
    }
    if entries.len() > MAX_BATCH || entries.iter().any(ClientLog::is_oversized) {
        return Err(AppError::bad_request("Log payload too large"));
    }

    for entry in &entries {
        tracing::info!(
            target: CLIENT_LOG_TARGET,
            category = entry.category.as_deref().unwrap_or("unknown"),
            event = entry.event.as_deref().unwrap_or("-"),
            payload = %entry.payload_text(),
            "client log"
        );
    }

    Ok(Json(LogsResponse {
        received: entries.len(),
    }))
}
