use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::info;

use super::{resolve_write, KvStore, StorageResult, WriteOutcome};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS "kv_store" (
    "key" TEXT PRIMARY KEY NOT NULL,
    "value" TEXT NOT NULL,
    "updated_at" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

const SELECT_VALUE: &str = r#"SELECT "value" FROM "kv_store" WHERE "key" = ?"#;

const UPSERT: &str = r#"
INSERT INTO "kv_store" ("key", "value", "updated_at")
VALUES (?, ?, CURRENT_TIMESTAMP)
ON CONFLICT("key") DO UPDATE SET "value" = excluded."value", "updated_at" = CURRENT_TIMESTAMP
"#;

/// Key-value store backed by a single SQLite table.
///
/// Writes from this process go through one lock so a version check and the
/// write it guards are never split by another writer.
#[derive(Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteKvStore {
    pub async fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self::with_pool(pool);
        store.migrate().await?;
        info!(path = %path.display(), "sqlite store ready");
        Ok(store)
    }

    /// Private in-memory database; a single connection keeps it alive.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self::with_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> StorageResult<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let raw: Option<String> = sqlx::query_scalar(SELECT_VALUE)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(UPSERT)
            .bind(key)
            .bind(value.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(r#"DELETE FROM "kv_store" WHERE "key" = ?"#)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn write_entries(&self, entries: Vec<(String, Value)>) -> StorageResult<Vec<WriteOutcome>> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(entries.len());

        for (key, value) in entries {
            let raw: Option<String> = sqlx::query_scalar(SELECT_VALUE)
                .bind(&key)
                .fetch_optional(&mut *tx)
                .await?;
            let existing = raw.map(|raw| serde_json::from_str(&raw)).transpose()?;

            let outcome = resolve_write(&key, value, existing);
            if let WriteOutcome::Committed(stored) = &outcome {
                sqlx::query(UPSERT)
                    .bind(&key)
                    .bind(stored.to_string())
                    .execute(&mut *tx)
                    .await?;
            }
            outcomes.push(outcome);
        }

        tx.commit().await?;
        Ok(outcomes)
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        let keys = sqlx::query_scalar(r#"SELECT "key" FROM "kv_store" ORDER BY "key" ASC"#)
            .fetch_all(&self.pool)
            .await?;
        Ok(keys)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let keys = sqlx::query_scalar(
            r#"SELECT "key" FROM "kv_store" WHERE substr("key", 1, ?) = ? ORDER BY "key" ASC"#,
        )
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }
}
