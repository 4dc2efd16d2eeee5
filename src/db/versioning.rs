//! Optimistic concurrency on top of a `KvStore`.
//!
//! A versioned write commits only when its `base_version` equals the stored
//! `_version` (0 when absent). A write without `base_version` never matches.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::{KvStore, StorageError, StorageResult};
use crate::core::protocol::VersionedWrite;
use crate::models::UnresolvedConflict;

pub const VERSION_FIELD: &str = "_version";

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The value as stored.
    Committed(Value),
    /// Nothing was written.
    Conflict(UnresolvedConflict),
}

pub fn stored_version(value: Option<&Value>) -> u64 {
    value
        .and_then(|v| v.get(VERSION_FIELD))
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Stamps `_version` on object payloads; other payloads keep only the stamp.
pub fn with_version(data: Value, version: u64) -> Value {
    let mut object = match data {
        Value::Object(object) => object,
        _ => Map::new(),
    };
    object.insert(VERSION_FIELD.to_string(), Value::from(version));
    Value::Object(object)
}

/// Decides one write against the value currently stored under `key`.
/// A `Committed` outcome carries exactly what must be stored.
pub fn resolve_write(key: &str, value: Value, existing: Option<Value>) -> WriteOutcome {
    let Some(write) = VersionedWrite::detect(&value) else {
        return WriteOutcome::Committed(value);
    };

    let current = stored_version(existing.as_ref());
    let target = write.target_version();

    if write.base_version == Some(current) {
        debug!(key, version = target, "versioned write committed");
        return WriteOutcome::Committed(with_version(write.data, target));
    }

    warn!(
        key,
        base_version = ?write.base_version,
        server_version = current,
        "version conflict"
    );
    WriteOutcome::Conflict(UnresolvedConflict {
        original_key: key.to_string(),
        client_payload: write.data,
        client_base_version: write.base_version,
        client_new_version: target,
        server_value: existing,
        server_version: current,
    })
}

/// Writes `value` under `key`, applying the version check when `value` is a
/// versioned envelope. Plain values overwrite unconditionally.
pub async fn write_entry(store: &dyn KvStore, key: &str, value: Value) -> StorageResult<WriteOutcome> {
    store
        .write_entries(vec![(key.to_string(), value)])
        .await?
        .pop()
        .ok_or(StorageError::MissingOutcome)
}
