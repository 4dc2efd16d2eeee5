use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::serve;
use crate::core::message_bus::{MessageBus, SubscriptionId};
use crate::core::protocol::{
    Failure, KeyRequest, KeyValue, StatsSaveRequest, SyncSnapshot, CARD_STATS_LOAD,
    CARD_STATS_SAVE, CONFIG_LOAD, CONFIG_SAVE, SYNC_ALL_LOAD, SYNC_ALL_SAVE,
};
use crate::db::{write_entry, KvStore, StorageError, WriteOutcome};
use crate::models::{conflict_key, UnresolvedConflict, CONFLICT_KEY_PREFIX};

/// All deck configurations live in one map under this key.
pub const CONFIGS_KEY: &str = "flashcard-configs";
pub const LAST_CONFIG_KEY: &str = "flashcard-last-config";

impl From<StorageError> for Failure {
    fn from(err: StorageError) -> Self {
        Failure::new(err.to_string())
    }
}

fn is_card_stats_key(key: &str) -> bool {
    key != CONFIGS_KEY && key != LAST_CONFIG_KEY && !key.starts_with(CONFLICT_KEY_PREFIX)
}

/// Serves the DAL from the device's own store.
pub struct LocalAdapter {
    store: Arc<dyn KvStore>,
}

impl LocalAdapter {
    pub fn new(store: Arc<dyn KvStore>) -> Arc<Self> {
        Arc::new(Self { store })
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

    async fn configs(&self) -> Result<Map<String, Value>, Failure> {
        Ok(match self.store.get(CONFIGS_KEY).await? {
            Some(Value::Object(configs)) => configs,
            _ => Map::new(),
        })
    }

    async fn load_config(&self, payload: Value) -> Result<Value, Failure> {
        let KeyRequest { key } = serde_json::from_value(payload)?;
        let value = self.configs().await?.remove(&key).unwrap_or(Value::Null);
        Ok(json!({ "key": key, "value": value }))
    }

    async fn save_config(&self, payload: Value) -> Result<Value, Failure> {
        let KeyValue { key, value } = serde_json::from_value(payload)?;
        let mut configs = self.configs().await?;
        configs.insert(key.clone(), value.clone());
        self.store.set(CONFIGS_KEY, &Value::Object(configs)).await?;
        Ok(json!({ "key": key, "value": value }))
    }

    async fn load_card_stats(&self, payload: Value) -> Result<Value, Failure> {
        let KeyRequest { key } = serde_json::from_value(payload)?;
        let value = self.store.get(&key).await?.unwrap_or(Value::Null);
        Ok(json!({ "key": key, "value": value }))
    }

    async fn save_card_stats(&self, payload: Value) -> Result<Value, Failure> {
        match serde_json::from_value(payload)? {
            StatsSaveRequest::Single { key, value } => {
                match write_entry(self.store.as_ref(), &key, value).await? {
                    WriteOutcome::Committed(stored) => Ok(json!({ "key": key, "value": stored })),
                    WriteOutcome::Conflict(conflict) => {
                        self.record_conflict(&conflict).await?;
                        Err(Failure::new(format!("version conflict on {key}")).with_conflict(conflict))
                    }
                }
            }
            StatsSaveRequest::Batch { card_stats } => {
                let outcomes = self
                    .store
                    .write_entries(card_stats.into_iter().collect())
                    .await?;
                let mut conflicts = Vec::new();
                for outcome in outcomes {
                    if let WriteOutcome::Conflict(conflict) = outcome {
                        self.record_conflict(&conflict).await?;
                        conflicts.push(conflict);
                    }
                }
                if conflicts.is_empty() {
                    Ok(json!({ "value": null }))
                } else {
                    Err(Failure::new(format!("{} version conflicts", conflicts.len()))
                        .with_conflicts(conflicts))
                }
            }
        }
    }

    /// Replaces any earlier record for the same key.
    async fn record_conflict(&self, conflict: &UnresolvedConflict) -> Result<(), Failure> {
        let storage_key = conflict_key(&conflict.original_key);
        self.store
            .set(&storage_key, &serde_json::to_value(conflict)?)
            .await?;
        warn!(key = %conflict.original_key, %storage_key, "conflict recorded");
        Ok(())
    }

    async fn load_all(&self) -> Result<Value, Failure> {
        let mut snapshot = SyncSnapshot {
            configs: self.configs().await?,
            ..Default::default()
        };
        for key in self.store.keys().await? {
            if !is_card_stats_key(&key) {
                continue;
            }
            if let Some(value) = self.store.get(&key).await? {
                snapshot.card_stats.insert(key, value);
            }
        }
        debug!(cards = snapshot.card_stats.len(), "local snapshot loaded");
        Ok(snapshot.to_value()?)
    }

    async fn save_all(&self, payload: Value) -> Result<Value, Failure> {
        let snapshot: SyncSnapshot = serde_json::from_value(payload)?;
        self.store
            .set(CONFIGS_KEY, &Value::Object(snapshot.configs))
            .await?;
        for (key, value) in &snapshot.card_stats {
            self.store.set(key, value).await?;
        }
        Ok(Value::Null)
    }
}
