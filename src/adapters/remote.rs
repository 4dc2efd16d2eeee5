use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::serve;
use crate::core::message_bus::{MessageBus, SubscriptionId};
use crate::core::protocol::{
    Failure, KeyRequest, KeyValue, StatsSaveRequest, SyncSnapshot, CARD_STATS_LOAD,
    CARD_STATS_SAVE, CONFIG_LOAD, CONFIG_SAVE, SYNC_ALL_LOAD, SYNC_ALL_SAVE,
};
use crate::models::UnresolvedConflict;

pub const SYNC_PATH: &str = "/api/sync";

/// Serves the DAL from a sync server over HTTP.
pub struct RemoteAdapter {
    client: Client,
    endpoint: String,
}

impl RemoteAdapter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Arc<Self>, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Arc::new(Self {
            client,
            endpoint: format!("{}{SYNC_PATH}", base_url.trim_end_matches('/')),
        }))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn attach(self: &Arc<Self>, bus: &Arc<MessageBus>) -> Vec<SubscriptionId> {
        vec![
            serve(bus, CONFIG_LOAD, self.route(|a, p| async move { a.load_config(p).await })),
            serve(bus, CONFIG_SAVE, self.route(|a, p| async move { a.save_config(p).await })),
            serve(bus, CARD_STATS_LOAD, self.route(|a, p| async move { a.load_card_stats(p).await })),
            serve(bus, CARD_STATS_SAVE, self.route(|a, p| async move { a.save_card_stats(p).await })),
            serve(bus, SYNC_ALL_LOAD, self.route(|a, _| async move { a.load_all().await })),
            serve(bus, SYNC_ALL_SAVE, self.route(|a, p| async move { a.save_all(p).await })),
        ]
    }

    fn route<F, Fut>(self: &Arc<Self>, op: F) -> impl Fn(Value) -> Fut + Send + Sync + 'static
    where
        F: Fn(Arc<Self>, Value) -> Fut + Send + Sync + 'static,
    {
        let adapter = Arc::clone(self);
        move |payload| op(Arc::clone(&adapter), payload)
    }

    async fn fetch_snapshot(&self) -> Result<SyncSnapshot, Failure> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(network_failure)?;
        let body = read_body(response).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// POSTs `body`; a reply that mentions conflicts is a failure.
    async fn push(&self, body: &Value) -> Result<Value, Failure> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(network_failure)?;
        let reply = read_body(response).await?;

        if let Some(raw) = reply.get("conflicts").or_else(|| reply.get("conflict")) {
            let conflicts = parse_conflicts(raw);
            warn!(count = conflicts.len(), "server reported conflicts");
            return Err(Failure::new("server reported conflicts").with_conflicts(conflicts));
        }
        Ok(reply)
    }

    async fn load_config(&self, payload: Value) -> Result<Value, Failure> {
        let KeyRequest { key } = serde_json::from_value(payload)?;
        let mut snapshot = self.fetch_snapshot().await?;
        let value = snapshot.configs.remove(&key).unwrap_or(Value::Null);
        Ok(json!({ "key": key, "value": value }))
    }

    async fn save_config(&self, payload: Value) -> Result<Value, Failure> {
        let KeyValue { key, value } = serde_json::from_value(payload)?;
        let mut configs = Map::new();
        configs.insert(key.clone(), value.clone());
        self.push(&json!({ "configs": configs })).await?;
        Ok(json!({ "key": key, "value": value }))
    }

    async fn load_card_stats(&self, payload: Value) -> Result<Value, Failure> {
        let KeyRequest { key } = serde_json::from_value(payload)?;
        let mut snapshot = self.fetch_snapshot().await?;
        let value = snapshot.card_stats.remove(&key).unwrap_or(Value::Null);
        Ok(json!({ "key": key, "value": value }))
    }

    async fn save_card_stats(&self, payload: Value) -> Result<Value, Failure> {
        match serde_json::from_value(payload)? {
            StatsSaveRequest::Single { key, value } => {
                let mut card_stats = Map::new();
                card_stats.insert(key.clone(), value.clone());
                self.push(&json!({ "cardStats": card_stats })).await?;
                Ok(json!({ "key": key, "value": value }))
            }
            StatsSaveRequest::Batch { card_stats } => {
                self.push(&json!({ "cardStats": card_stats })).await?;
                Ok(json!({ "value": null }))
            }
        }
    }

    async fn load_all(&self) -> Result<Value, Failure> {
        let snapshot = self.fetch_snapshot().await?;
        debug!(cards = snapshot.card_stats.len(), "remote snapshot loaded");
        Ok(snapshot.to_value()?)
    }

    async fn save_all(&self, payload: Value) -> Result<Value, Failure> {
        let snapshot: SyncSnapshot = serde_json::from_value(payload)?;
        self.push(&snapshot.to_value()?).await?;
        Ok(Value::Null)
    }
}

fn network_failure(err: reqwest::Error) -> Failure {
    Failure::new(format!("network error: {err}"))
}

async fn read_body(response: reqwest::Response) -> Result<Value, Failure> {
    let status = response.status();
    let text = response.text().await.map_err(network_failure)?;
    if !status.is_success() {
        return Err(Failure::new(format!("server responded {status}: {text}")));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Accepts a list or a single record; entries that do not parse are dropped.
fn parse_conflicts(raw: &Value) -> Vec<UnresolvedConflict> {
    let entries = match raw {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };
    entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect()
}
