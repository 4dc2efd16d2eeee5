#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use flashcards_core::adapters::DataLayer;
use flashcards_core::db::{KvStore, MemoryKvStore};
use flashcards_core::models::{Card, CardStats, Deck, SkillStats, Timestamp};
use flashcards_core::routes;
use flashcards_core::services::skill::{Skill, SkillSet, VerificationMethod};
use flashcards_core::services::{ManualClock, QueuedNotifier, Scheduler, SchedulerConfig, StatsRepository};
use flashcards_core::state::AppState;

pub const NOW: Timestamp = 1_700_000_000_000;

pub fn reading_skill() -> Skill {
    Skill::new(
        "Reading",
        VerificationMethod::None,
        vec!["TARGET_LANGUAGE".into()],
        vec!["BASE_LANGUAGE".into()],
    )
}

pub fn writing_skill() -> Skill {
    Skill::new(
        "Writing",
        VerificationMethod::Text,
        vec!["BASE_LANGUAGE".into()],
        vec!["TARGET_LANGUAGE".into()],
    )
    .with_validation_field("TARGET_LANGUAGE")
}

/// Stats for an item already shown at least once.
pub fn seen(last_viewed: Timestamp, successes: usize, failures: usize, interval_index: usize) -> SkillStats {
    SkillStats {
        success_timestamps: (0..successes as i64).map(|i| last_viewed - 1_000 * (i + 1)).collect(),
        failure_timestamps: (0..failures as i64).map(|i| last_viewed - 500 * (i + 1)).collect(),
        last_viewed: Some(last_viewed),
        interval_index,
        view_count: (successes + failures).max(1) as u64,
        ..Default::default()
    }
}

pub fn deck(keys: &[&str]) -> Deck {
    Deck::new(keys.iter().map(|k| Card::new([*k, "translation"])).collect(), 0)
}

pub struct Session {
    pub store: Arc<MemoryKvStore>,
    pub layer: DataLayer,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<QueuedNotifier>,
    pub skills: SkillSet,
}

impl Session {
    pub fn new(skills: Vec<Skill>) -> Self {
        let store = Arc::new(MemoryKvStore::new());
        Self {
            layer: DataLayer::new(store.clone(), None),
            store,
            clock: ManualClock::new(NOW),
            notifier: QueuedNotifier::new(),
            skills: SkillSet::all_active(skills),
        }
    }

    pub fn with_remote(mut self, base_url: &str) -> Self {
        let remote = flashcards_core::adapters::RemoteAdapter::new(base_url, std::time::Duration::from_secs(5))
            .expect("http client");
        self.layer = self.layer.with_remote(remote, None);
        self
    }

    pub fn skill_id(&self, index: usize) -> String {
        self.skills.configured[index].id.clone()
    }

    pub fn stats(&self) -> StatsRepository {
        StatsRepository::new(&self.layer, self.notifier.clone())
    }

    pub fn scheduler(&self, deck: Deck, config: SchedulerConfig) -> Scheduler {
        Scheduler::new(
            deck,
            Arc::new(self.skills.clone()),
            self.stats(),
            self.clock.clone(),
            self.notifier.clone(),
            SchedulerConfig {
                seed: config.seed.or(Some(7)),
                ..config
            },
        )
    }

    pub async fn seed(&self, key: &str, skill_id: &str, stats: SkillStats) {
        let mut card = CardStats::default();
        card.skills.insert(skill_id.to_string(), stats);
        self.store
            .set(key, &card.to_value().expect("encode stats"))
            .await
            .expect("seed stats");
    }

    pub async fn stored(&self, key: &str) -> CardStats {
        let value = self.store.get(key).await.expect("read stats");
        CardStats::from_stored(value.as_ref()).expect("stored stats")
    }
}

/// Serves the sync API on an ephemeral port and returns its base URL.
pub async fn spawn_sync_server(store: Arc<dyn KvStore>) -> String {
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = routes::router(AppState::new(store));
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}
