pub mod memory;
pub mod sqlite;
pub mod versioning;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;
pub use versioning::{resolve_write, write_entry, WriteOutcome};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store returned no outcome for a write")]
    MissingOutcome,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable key-value store holding JSON values.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    async fn set(&self, key: &str, value: &Value) -> StorageResult<()>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Applies `entries` in order as one unit. Each entry is decided by
    /// [`resolve_write`] against the value stored at that moment, with no
    /// other write in between. Outcomes come back in entry order.
    async fn write_entries(&self, entries: Vec<(String, Value)>) -> StorageResult<Vec<WriteOutcome>>;

    /// All keys, sorted.
    async fn keys(&self) -> StorageResult<Vec<String>>;

    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = self.keys().await?;
        keys.retain(|key| key.starts_with(prefix));
        Ok(keys)
    }
}
