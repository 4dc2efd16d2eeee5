use std::sync::Arc;

use futures::future::try_join_all;
use thiserror::Error;
use tracing::{debug, warn};

use crate::adapters::DataLayer;
use crate::core::protocol::VersionedWrite;
use crate::core::{Dal, DalError};
use crate::models::{CardStats, SkillId, UnresolvedConflict};
use crate::services::context::{NoticeLevel, Notifier};

pub const REMOTE_SAVE_FAILED: &str = "Failed to sync to server. Your work is saved locally.";

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("stats for {} changed elsewhere (stored version {})", .0.original_key, .0.server_version)]
    Conflict(Box<UnresolvedConflict>),

    #[error("could not encode card stats: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Dal(#[from] DalError),
}

/// Reads and writes per-card stats. The local store is authoritative; the
/// remote copy is updated on a best-effort basis after each local commit.
#[derive(Clone)]
pub struct StatsRepository {
    local: Dal,
    remote: Option<Dal>,
    notifier: Arc<dyn Notifier>,
}

impl StatsRepository {
    pub fn new(layer: &DataLayer, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            local: layer.local().clone(),
            remote: layer.remote().cloned(),
            notifier,
        }
    }

    /// Stats for one card with every configured skill present. Broken stored
    /// fields are repaired in place of the record; keyless cards never hit storage.
    pub async fn load(&self, key: Option<&str>, skill_ids: &[SkillId]) -> Result<CardStats, StatsError> {
        let mut stats = match key {
            Some(key) => match self.local.load_card_stats(key).await? {
                Some(stored) => {
                    let (stats, repaired) = CardStats::sanitize(&stored);
                    if repaired {
                        warn!(key, version = stats.version, "repaired malformed card stats");
                    }
                    stats
                }
                None => CardStats::default(),
            },
            None => CardStats::default(),
        };
        stats.ensure_skills(skill_ids);
        Ok(stats)
    }

    /// Loads every card concurrently, preserving order.
    pub async fn load_all(
        &self,
        keys: &[Option<String>],
        skill_ids: &[SkillId],
    ) -> Result<Vec<CardStats>, StatsError> {
        try_join_all(keys.iter().map(|key| self.load(key.as_deref(), skill_ids))).await
    }

    /// Versioned write against the version `stats` was loaded at. On success
    /// `stats.version` moves to the committed version.
    pub async fn save(&self, key: &str, stats: &mut CardStats) -> Result<(), StatsError> {
        let write = VersionedWrite::new(stats.to_value()?, stats.version);

        match self.local.save_versioned(key, &write).await {
            Ok(_) => {
                stats.version = write.target_version();
                debug!(key, version = stats.version, "card stats saved");
            }
            Err(err) => {
                if let Some(conflict) = err.conflicts().into_iter().next() {
                    self.notifier.notify(
                        NoticeLevel::Error,
                        &format!("Progress for \"{key}\" changed elsewhere. Resolve the conflict to continue."),
                    );
                    return Err(StatsError::Conflict(Box::new(conflict)));
                }
                return Err(err.into());
            }
        }

        self.push_remote(key, &write).await;
        Ok(())
    }

    async fn push_remote(&self, key: &str, write: &VersionedWrite) {
        let Some(remote) = &self.remote else {
            return;
        };
        if let Err(err) = remote.save_versioned(key, write).await {
            warn!(key, error = %err, "remote save failed; local copy kept");
            self.notifier.notify(NoticeLevel::Error, REMOTE_SAVE_FAILED);
        }
    }
}
