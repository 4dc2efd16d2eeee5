//! Message names and payload shapes shared by the DAL and the adapters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::UnresolvedConflict;

pub const CONFIG_LOAD: &str = "data:config:load";
pub const CONFIG_SAVE: &str = "data:config:save";
pub const CARD_STATS_LOAD: &str = "data:card:stats:load";
pub const CARD_STATS_SAVE: &str = "data:card:stats:save";
pub const SYNC_ALL_LOAD: &str = "data:sync:all:load";
pub const SYNC_ALL_SAVE: &str = "data:sync:all:save";

pub const REQUESTS: [&str; 6] = [
    CONFIG_LOAD,
    CONFIG_SAVE,
    CARD_STATS_LOAD,
    CARD_STATS_SAVE,
    SYNC_ALL_LOAD,
    SYNC_ALL_SAVE,
];

pub const SUCCESS: &str = "success";
pub const FAILURE: &str = "failure";

pub fn success_name(request: &str) -> String {
    format!("{request}:{SUCCESS}")
}

pub fn failure_name(request: &str) -> String {
    format!("{request}:{FAILURE}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

/// A single keyed write takes precedence over a batch when both are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatsSaveRequest {
    Single {
        key: String,
        value: Value,
    },
    Batch {
        #[serde(rename = "cardStats")]
        card_stats: Map<String, Value>,
    },
}

/// Optimistic write envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedWrite {
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_version: Option<u64>,
}

impl VersionedWrite {
    pub fn new(data: Value, base_version: u64) -> Self {
        Self {
            data,
            base_version: Some(base_version),
            new_version: Some(base_version + 1),
        }
    }

    /// Any of `data`, `base_version` or `new_version` marks a value as
    /// versioned. Without `data` the value itself is the payload.
    pub fn detect(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if !["data", "base_version", "new_version"]
            .iter()
            .any(|field| object.contains_key(*field))
        {
            return None;
        }
        Some(Self {
            data: object.get("data").cloned().unwrap_or_else(|| value.clone()),
            base_version: object.get("base_version").and_then(Value::as_u64),
            new_version: object.get("new_version").and_then(Value::as_u64),
        })
    }

    /// Version the value gets once committed.
    pub fn target_version(&self) -> u64 {
        self.new_version
            .unwrap_or_else(|| self.base_version.map_or(1, |base| base + 1))
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Full contents of a store, as exchanged by the sync messages and `/api/sync`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    #[serde(default)]
    pub configs: Map<String, Value>,
    #[serde(rename = "cardStats", default)]
    pub card_stats: Map<String, Value>,
}

impl SyncSnapshot {
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Payload of every `:failure` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<UnresolvedConflict>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<UnresolvedConflict>,
}

impl Failure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            conflict: None,
            conflicts: Vec::new(),
        }
    }

    pub fn with_conflict(mut self, conflict: UnresolvedConflict) -> Self {
        self.conflict = Some(conflict);
        self
    }

    pub fn with_conflicts(mut self, conflicts: Vec<UnresolvedConflict>) -> Self {
        self.conflicts = conflicts;
        self
    }

    /// Tolerates replies that are not shaped like a `Failure`.
    pub fn from_payload(payload: &Value) -> Self {
        serde_json::from_value(payload.clone()).unwrap_or_else(|_| match payload {
            Value::String(message) => Failure::new(message.clone()),
            other => Failure::new(other.to_string()),
        })
    }

    /// Every conflict carried, single or batched.
    pub fn all_conflicts(&self) -> Vec<UnresolvedConflict> {
        self.conflict
            .iter()
            .chain(self.conflicts.iter())
            .cloned()
            .collect()
    }

    /// Reply payload; if the conflicts cannot be encoded the message still goes out.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.error.clone()))
    }
}

impl From<serde_json::Error> for Failure {
    fn from(err: serde_json::Error) -> Self {
        Failure::new(format!("invalid payload: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn versioned_values_are_detected_by_any_marker() {
        assert!(VersionedWrite::detect(&json!({ "skills": {} })).is_none());
        assert!(VersionedWrite::detect(&json!(3)).is_none());

        let explicit = VersionedWrite::detect(&json!({
            "data": { "skills": {} }, "base_version": 2, "new_version": 3
        }))
        .expect("versioned");
        assert_eq!(explicit.data, json!({ "skills": {} }));
        assert_eq!(explicit.base_version, Some(2));
        assert_eq!(explicit.target_version(), 3);

        let bare = VersionedWrite::detect(&json!({ "base_version": 4, "skills": {} })).expect("versioned");
        assert_eq!(bare.data["skills"], json!({}));
        assert_eq!(bare.target_version(), 5);

        let no_base = VersionedWrite::detect(&json!({ "data": 1 })).expect("versioned");
        assert_eq!(no_base.base_version, None);
        assert_eq!(no_base.target_version(), 1);
    }

    #[test]
    fn single_save_wins_over_batch() {
        let single: StatsSaveRequest = serde_json::from_value(json!({
            "key": "a", "value": { "skills": {} }, "cardStats": {}
        }))
        .expect("parse");
        assert!(matches!(single, StatsSaveRequest::Single { ref key, .. } if key == "a"));

        let batch: StatsSaveRequest =
            serde_json::from_value(json!({ "cardStats": { "a": {}, "b": {} } })).expect("parse");
        assert!(matches!(batch, StatsSaveRequest::Batch { ref card_stats } if card_stats.len() == 2));

        assert!(serde_json::from_value::<StatsSaveRequest>(json!({ "key": "a" })).is_err());
    }

    #[test]
    fn failure_payload_is_parsed_leniently() {
        assert_eq!(Failure::from_payload(&json!("boom")).error, "boom");
        assert_eq!(Failure::from_payload(&json!({ "error": "nope" })).error, "nope");
        assert!(Failure::from_payload(&json!(42)).all_conflicts().is_empty());
    }
}
