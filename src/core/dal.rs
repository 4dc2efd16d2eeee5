use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::message_bus::{Message, MessageBus, SubscriptionId};
use crate::core::protocol::{
    failure_name, success_name, Failure, KeyValue, SyncSnapshot, VersionedWrite, CARD_STATS_LOAD,
    CARD_STATS_SAVE, CONFIG_LOAD, CONFIG_SAVE, SYNC_ALL_LOAD, SYNC_ALL_SAVE,
};
use crate::models::UnresolvedConflict;

#[derive(Debug, Error)]
pub enum DalError {
    #[error("{}", .0.error)]
    Rejected(Failure),

    #[error("no adapter handles {0}")]
    NoHandler(String),

    #[error("{0} was dropped without a reply")]
    NoResponse(String),

    #[error("{0} timed out after {1:?}")]
    Timeout(String, Duration),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl DalError {
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            DalError::Rejected(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn conflicts(&self) -> Vec<UnresolvedConflict> {
        self.failure().map(Failure::all_conflicts).unwrap_or_default()
    }

    pub fn is_conflict(&self) -> bool {
        !self.conflicts().is_empty()
    }
}

type Reply = Result<Value, Failure>;

/// Removes the reply listeners however `dispatch` ends, including when the
/// caller drops the future.
struct ReplyListeners<'a> {
    bus: &'a MessageBus,
    ids: [SubscriptionId; 2],
}

impl Drop for ReplyListeners<'_> {
    fn drop(&mut self) {
        for id in self.ids {
            self.bus.unsubscribe(id);
        }
    }
}

/// Request/response over the message bus.
///
/// Each request gets a fresh correlation id and only the reply carrying that
/// id settles it, so concurrent requests of the same kind never cross.
#[derive(Clone)]
pub struct Dal {
    bus: Arc<MessageBus>,
    timeout: Option<Duration>,
}

impl Dal {
    pub fn new(bus: Arc<MessageBus>, timeout: Option<Duration>) -> Self {
        Self { bus, timeout }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub async fn dispatch(&self, name: &str, payload: Value) -> Result<Value, DalError> {
        let correlation_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel::<Reply>();
        let slot = Arc::new(Mutex::new(Some(tx)));

        let on_success = {
            let slot = Arc::clone(&slot);
            move |m: &Message| {
                if m.correlation_id == Some(correlation_id) {
                    if let Some(tx) = slot.lock().take() {
                        let _ = tx.send(Ok(m.payload.clone()));
                    }
                }
            }
        };
        let on_failure = {
            let slot = Arc::clone(&slot);
            move |m: &Message| {
                if m.correlation_id == Some(correlation_id) {
                    if let Some(tx) = slot.lock().take() {
                        let _ = tx.send(Err(Failure::from_payload(&m.payload)));
                    }
                }
            }
        };

        let _listeners = ReplyListeners {
            bus: &self.bus,
            ids: [
                self.bus.subscribe(&success_name(name), on_success),
                self.bus.subscribe(&failure_name(name), on_failure),
            ],
        };
        drop(slot);

        let request = Message::new(name, payload).with_correlation(correlation_id);
        if self.bus.publish_message(request) == 0 {
            warn!(name, "no adapter subscribed");
            return Err(DalError::NoHandler(name.to_string()));
        }

        let reply = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| DalError::Timeout(name.to_string(), limit))?,
            None => rx.await,
        };

        match reply {
            Ok(Ok(value)) => {
                debug!(name, %correlation_id, "request succeeded");
                Ok(value)
            }
            Ok(Err(failure)) => {
                debug!(name, %correlation_id, error = %failure.error, "request rejected");
                Err(DalError::Rejected(failure))
            }
            Err(_) => Err(DalError::NoResponse(name.to_string())),
        }
    }

    pub async fn load_config(&self, key: &str) -> Result<Option<Value>, DalError> {
        let reply = self.dispatch(CONFIG_LOAD, json!({ "key": key })).await?;
        Ok(non_null(serde_json::from_value::<KeyValue>(reply)?.value))
    }

    pub async fn save_config(&self, key: &str, value: &Value) -> Result<(), DalError> {
        self.dispatch(CONFIG_SAVE, json!({ "key": key, "value": value }))
            .await?;
        Ok(())
    }

    pub async fn load_card_stats(&self, key: &str) -> Result<Option<Value>, DalError> {
        let reply = self.dispatch(CARD_STATS_LOAD, json!({ "key": key })).await?;
        Ok(non_null(serde_json::from_value::<KeyValue>(reply)?.value))
    }

    /// Plain write; returns the stored value.
    pub async fn save_card_stats(&self, key: &str, value: &Value) -> Result<Value, DalError> {
        let reply = self
            .dispatch(CARD_STATS_SAVE, json!({ "key": key, "value": value }))
            .await?;
        Ok(reply.get("value").cloned().unwrap_or(Value::Null))
    }

    /// Optimistic write; a version mismatch comes back as `Rejected` with the conflict.
    pub async fn save_versioned(&self, key: &str, write: &VersionedWrite) -> Result<Value, DalError> {
        self.save_card_stats(key, &write.to_value()?).await
    }

    pub async fn save_card_stats_batch(&self, card_stats: Map<String, Value>) -> Result<(), DalError> {
        self.dispatch(CARD_STATS_SAVE, json!({ "cardStats": card_stats }))
            .await?;
        Ok(())
    }

    pub async fn load_all(&self) -> Result<SyncSnapshot, DalError> {
        let reply = self.dispatch(SYNC_ALL_LOAD, Value::Null).await?;
        Ok(serde_json::from_value(reply)?)
    }

    pub async fn save_all(&self, snapshot: &SyncSnapshot) -> Result<(), DalError> {
        self.dispatch(SYNC_ALL_SAVE, snapshot.to_value()?).await?;
        Ok(())
    }
}

fn non_null(value: Value) -> Option<Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}
