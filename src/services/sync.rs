use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::adapters::DataLayer;
use crate::core::protocol::{SyncSnapshot, VersionedWrite};
use crate::core::{Dal, DalError};
use crate::models::CardStats;
use crate::services::context::{NoticeLevel, Notifier};
use crate::services::merge::{deep_merge, merge_card_stats};
use crate::services::stats::REMOTE_SAVE_FAILED;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no sync server is configured")]
    NoRemote,

    #[error("could not encode card stats: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Dal(#[from] DalError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Cards present on the server, merged into the local store.
    pub merged: usize,
    /// Local-only cards uploaded to the server.
    pub pushed: usize,
    /// Merged cards written back over a stale server copy.
    pub repaired: usize,
    pub configs: usize,
}

/// Pulls the server snapshot into the local store and pushes back what the
/// server has never seen or holds an older copy of.
pub struct SyncService {
    local: Dal,
    remote: Option<Dal>,
    notifier: Arc<dyn Notifier>,
}

impl SyncService {
    pub fn new(layer: &DataLayer, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            local: layer.local().clone(),
            remote: layer.remote().cloned(),
            notifier,
        }
    }

    pub async fn sync_from_remote(&self) -> Result<SyncReport, SyncError> {
        let remote = self.remote.as_ref().ok_or(SyncError::NoRemote)?;

        let server = match remote.load_all().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "could not load server snapshot");
                self.notifier
                    .notify(NoticeLevel::Error, "Could not sync from server.");
                return Err(err.into());
            }
        };
        let local = self.local.load_all().await?;

        let mut configs = Value::Object(local.configs);
        deep_merge(&mut configs, Value::Object(server.configs));
        let configs = match configs {
            Value::Object(configs) => configs,
            _ => Map::new(),
        };

        let mut card_stats = Map::new();
        let mut upload = Map::new();
        let mut repaired = 0usize;
        for (key, server_value) in &server.card_stats {
            let (theirs, _) = CardStats::sanitize(server_value);
            let ours = CardStats::from_stored(local.card_stats.get(key));
            let merged = match ours {
                Some(ours) if ours != theirs => {
                    let mut merged = merge_card_stats(ours, &theirs);
                    // Written on top of the server copy so both sides agree on the version.
                    merged.version = merged.version.max(theirs.version + 1);
                    let write = VersionedWrite {
                        data: merged.to_value()?,
                        base_version: Some(theirs.version),
                        new_version: Some(merged.version),
                    };
                    upload.insert(key.clone(), write.to_value()?);
                    repaired += 1;
                    merged
                }
                _ => theirs,
            };
            card_stats.insert(key.clone(), merged.to_value()?);
        }

        let mut pushed = 0usize;
        for (key, value) in local.card_stats {
            if !server.card_stats.contains_key(&key) {
                upload.insert(key, value);
                pushed += 1;
            }
        }

        let mut report = SyncReport {
            merged: card_stats.len(),
            configs: configs.len(),
            ..Default::default()
        };

        self.local.save_all(&SyncSnapshot { configs, card_stats }).await?;

        if !upload.is_empty() {
            match remote.save_card_stats_batch(upload).await {
                Ok(()) => {
                    report.pushed = pushed;
                    report.repaired = repaired;
                }
                Err(err) => {
                    // Conflicting entries are skipped; the rest of the batch is stored.
                    if err.is_conflict() {
                        report.pushed = pushed;
                        report.repaired = repaired.saturating_sub(err.conflicts().len());
                    }
                    warn!(error = %err, "could not update the server copy");
                    self.notifier.notify(NoticeLevel::Error, REMOTE_SAVE_FAILED);
                }
            }
        }

        info!(
            merged = report.merged,
            pushed = report.pushed,
            repaired = report.repaired,
            "sync complete"
        );
        self.notifier.notify(NoticeLevel::Success, "Data sync complete.");
        Ok(report)
    }

    /// Uploads the whole local snapshot.
    pub async fn push_to_remote(&self) -> Result<usize, SyncError> {
        let remote = self.remote.as_ref().ok_or(SyncError::NoRemote)?;
        let snapshot = self.local.load_all().await?;
        remote.save_all(&snapshot).await?;
        Ok(snapshot.card_stats.len())
    }
}
