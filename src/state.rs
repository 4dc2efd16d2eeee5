use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::db::KvStore;

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn KvStore>,
    started_at: Instant,
    started_at_system: SystemTime,
}

impl AppState {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
        }
    }

    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }
}
