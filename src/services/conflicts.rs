use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::adapters::DataLayer;
use crate::core::protocol::VersionedWrite;
use crate::core::{Dal, DalError};
use crate::db::{KvStore, StorageError};
use crate::models::{UnresolvedConflict, CONFLICT_KEY_PREFIX};

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("no unresolved conflict stored under {0}")]
    NotFound(String),

    #[error("conflict {0} has no server value to apply")]
    NoServerValue(String),

    #[error("conflict record {key} is malformed: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Dal(#[from] DalError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictEntry {
    pub storage_key: String,
    pub conflict: UnresolvedConflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
    Server,
    KeepLocal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub key: String,
    pub applied: Applied,
    pub value: Value,
}

/// Lists and resolves conflict records left behind by rejected writes.
pub struct ConflictManager {
    store: Arc<dyn KvStore>,
    dal: Dal,
}

impl ConflictManager {
    pub fn new(layer: &DataLayer) -> Self {
        Self {
            store: Arc::clone(layer.store()),
            dal: layer.local().clone(),
        }
    }

    /// Malformed records are skipped with a warning.
    pub async fn list_unresolved(&self) -> Result<Vec<ConflictEntry>, ConflictError> {
        let mut entries = Vec::new();
        for storage_key in self.store.keys_with_prefix(CONFLICT_KEY_PREFIX).await? {
            let Some(value) = self.store.get(&storage_key).await? else {
                continue;
            };
            match serde_json::from_value(value) {
                Ok(conflict) => entries.push(ConflictEntry {
                    storage_key,
                    conflict,
                }),
                Err(err) => warn!(%storage_key, error = %err, "skipping malformed conflict record"),
            }
        }
        Ok(entries)
    }

    async fn load(&self, storage_key: &str) -> Result<UnresolvedConflict, ConflictError> {
        let value = self
            .store
            .get(storage_key)
            .await?
            .ok_or_else(|| ConflictError::NotFound(storage_key.to_string()))?;
        serde_json::from_value(value).map_err(|source| ConflictError::Malformed {
            key: storage_key.to_string(),
            source,
        })
    }

    /// Overwrites the original key with the server's value.
    pub async fn resolve_use_server(&self, storage_key: &str) -> Result<Resolution, ConflictError> {
        let conflict = self.load(storage_key).await?;
        let value = conflict
            .server_value
            .filter(|v| !v.is_null())
            .ok_or_else(|| ConflictError::NoServerValue(storage_key.to_string()))?;

        self.store.set(&conflict.original_key, &value).await?;
        self.store.delete(storage_key).await?;
        info!(key = %conflict.original_key, "conflict resolved with server value");
        Ok(Resolution {
            key: conflict.original_key,
            applied: Applied::Server,
            value,
        })
    }

    /// Rebases the client payload onto the server version. If the store moved
    /// again in the meantime the record is refreshed and the error returned.
    pub async fn resolve_keep_local(&self, storage_key: &str) -> Result<Resolution, ConflictError> {
        let conflict = self.load(storage_key).await?;
        let write = VersionedWrite::new(conflict.client_payload, conflict.server_version);

        let stored = self
            .dal
            .save_versioned(&conflict.original_key, &write)
            .await?;
        self.store.delete(storage_key).await?;
        info!(key = %conflict.original_key, "conflict resolved keeping local value");
        Ok(Resolution {
            key: conflict.original_key,
            applied: Applied::KeepLocal,
            value: stored,
        })
    }
}
