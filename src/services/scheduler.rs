use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::models::{CardStats, Cursor, Deck, IntervalLadder, SkillId, SkillStats, Timestamp};
use crate::services::context::{Clock, NoticeLevel, Notifier, SkillProvider};
use crate::services::filter::ContentFilter;
use crate::services::retention::{apply_judgment, record_view, Judgment};
use crate::services::selection::{review_items, select_next, SelectionContext, SelectionReason};
use crate::services::stats::{StatsError, StatsRepository};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("No active skills. Please select skills to practice in Settings.")]
    NoActiveSkills,

    #[error("No cards to display.")]
    EmptyDeck,

    #[error("No cards match the current filter.")]
    NoFilterMatches,

    #[error("No card is currently displayed.")]
    NothingDisplayed,

    #[error("Card {0} has no key; its progress cannot be saved.")]
    MissingCardKey(usize),

    #[error("Could not find stats for skill {skill_id} on card {card_key}.")]
    MissingSkillStats { card_key: String, skill_id: SkillId },

    #[error(transparent)]
    Stats(#[from] StatsError),
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub intervals: IntervalLadder,
    pub filter: ContentFilter,
    /// Fixed seed for reproducible new-card picks.
    pub seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            intervals: IntervalLadder::default(),
            filter: ContentFilter::default(),
            seed: None,
        }
    }
}

/// What the front end should render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    pub card_index: usize,
    pub skill_id: SkillId,
    pub card_key: Option<String>,
    /// `None` when navigating back through history.
    pub reason: Option<SelectionReason>,
    pub stats: CardStats,
    /// `last_viewed` as it was before this showing.
    pub previous_last_viewed: Option<Timestamp>,
}

/// Drives a review session over one deck.
pub struct Scheduler {
    deck: Deck,
    skills: Arc<dyn SkillProvider>,
    stats: StatsRepository,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    intervals: IntervalLadder,
    filter: ContentFilter,
    rng: StdRng,
    current: Option<Cursor>,
    view_history: Vec<Cursor>,
    current_is_due: bool,
    shown_at: Option<Timestamp>,
}

impl Scheduler {
    pub fn new(
        deck: Deck,
        skills: Arc<dyn SkillProvider>,
        stats: StatsRepository,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            deck,
            skills,
            stats,
            clock,
            notifier,
            intervals: config.intervals,
            filter: config.filter,
            rng,
            current: None,
            view_history: Vec::new(),
            current_is_due: false,
            shown_at: None,
        }
    }

    /// Swaps the deck and forgets the session position.
    pub fn load_deck(&mut self, deck: Deck) {
        self.deck = deck;
        self.current = None;
        self.view_history.clear();
        self.current_is_due = false;
        self.shown_at = None;
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn set_filter(&mut self, filter: ContentFilter) {
        self.filter = filter;
    }

    pub fn filter(&self) -> &ContentFilter {
        &self.filter
    }

    pub fn set_intervals(&mut self, intervals: IntervalLadder) {
        self.intervals = intervals;
    }

    pub fn intervals(&self) -> &IntervalLadder {
        &self.intervals
    }

    pub fn current(&self) -> Option<&Cursor> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[Cursor] {
        &self.view_history
    }

    pub fn current_is_due(&self) -> bool {
        self.current_is_due
    }

    fn reject(&self, err: SchedulerError) -> SchedulerError {
        self.notifier.notify(NoticeLevel::Error, &err.to_string());
        err
    }

    /// Selects and shows the next item, recording the view.
    pub async fn show_next_card(&mut self, force_new: bool) -> Result<Presentation, SchedulerError> {
        let now = self.clock.now();
        let skill_set = self.skills.skills();
        let active = skill_set.ordered_active();
        if active.is_empty() {
            return Err(self.reject(SchedulerError::NoActiveSkills));
        }
        if self.deck.is_empty() {
            return Err(self.reject(SchedulerError::EmptyDeck));
        }
        let configured = skill_set.order();

        let keys: Vec<Option<String>> = (0..self.deck.len()).map(|i| self.deck.card_key(i)).collect();
        let all_card_stats = self.stats.load_all(&keys, &configured).await?;
        let items = review_items(&all_card_stats, &active);

        let filtered = self.filter.is_active();
        let subset = if filtered {
            let subset: Vec<_> = items
                .iter()
                .filter(|item| self.filter.matches_card(&self.deck, item.card_index))
                .cloned()
                .collect();
            if subset.is_empty() {
                return Err(self.reject(SchedulerError::NoFilterMatches));
            }
            Some(subset)
        } else {
            None
        };
        let pool = subset.as_deref().unwrap_or(&items);

        let ctx = SelectionContext {
            force_new,
            now,
            all_card_stats: &all_card_stats,
            skill_order: &configured,
            intervals: &self.intervals,
            is_filtered: filtered,
            current: self.current.as_ref(),
        };
        let mut selection = select_next(pool, &ctx, &mut self.rng);

        let filtered_done = selection.as_ref().is_some_and(|s| s.reason.is_deck_learned());
        if filtered && filtered_done && self.filter.allow_overflow {
            debug!("filtered set learned; selecting from the whole deck");
            let whole_deck = SelectionContext {
                is_filtered: false,
                ..ctx
            };
            if let Some(overflow) = select_next(&items, &whole_deck, &mut self.rng) {
                selection = Some(overflow);
            }
        }

        let Some(selection) = selection else {
            return Err(self.reject(SchedulerError::EmptyDeck));
        };

        let next = Cursor {
            card_index: selection.item.card_index,
            skill_id: selection.item.skill_id.clone(),
        };
        debug!(
            card_index = next.card_index,
            skill_id = %next.skill_id,
            reason = ?selection.reason.kind,
            "next review item selected"
        );

        let is_due = selection.reason.is_due_review();
        let card_stats = all_card_stats
            .into_iter()
            .nth(next.card_index)
            .unwrap_or_default();
        let presentation = self
            .display(next.clone(), card_stats, Some(selection.reason), now, true)
            .await?;

        // Session position only moves once the view is stored.
        if let Some(previous) = self.current.replace(next) {
            self.view_history.push(previous);
        }
        self.current_is_due = is_due;
        Ok(presentation)
    }

    /// Steps back to the previously shown item without recording a view.
    /// Returns `None` when there is no history.
    pub async fn show_prev_card(&mut self) -> Result<Option<Presentation>, SchedulerError> {
        let Some(previous) = self.view_history.last().cloned() else {
            return Ok(None);
        };
        let now = self.clock.now();
        let configured = self.skills.skills().order();
        let key = self.deck.card_key(previous.card_index);
        let card_stats = self.stats.load(key.as_deref(), &configured).await?;

        let presentation = self.display(previous.clone(), card_stats, None, now, false).await?;
        self.view_history.pop();
        self.current = Some(previous);
        self.current_is_due = false;
        Ok(Some(presentation))
    }

    async fn display(
        &mut self,
        cursor: Cursor,
        mut card_stats: CardStats,
        reason: Option<SelectionReason>,
        now: Timestamp,
        record: bool,
    ) -> Result<Presentation, SchedulerError> {
        let card_key = self.deck.card_key(cursor.card_index);
        let previous_last_viewed = card_stats
            .skill(&cursor.skill_id)
            .and_then(|s| s.last_viewed);

        if record {
            let entry = card_stats.skills.entry(cursor.skill_id.clone()).or_default();
            *entry = record_view(entry, now);
            match &card_key {
                Some(key) => self.stats.save(key, &mut card_stats).await?,
                None => warn!(card_index = cursor.card_index, "card has no key; view not saved"),
            }
        }

        self.shown_at = Some(now);
        Ok(Presentation {
            card_index: cursor.card_index,
            skill_id: cursor.skill_id,
            card_key,
            reason,
            stats: card_stats,
            previous_last_viewed,
        })
    }

    /// Records the user's answer for the displayed item.
    pub async fn mark_card_as_known(&mut self, known: bool) -> Result<SkillStats, SchedulerError> {
        let Some(cursor) = self.current.clone() else {
            return Err(self.reject(SchedulerError::NothingDisplayed));
        };
        let Some(key) = self.deck.card_key(cursor.card_index) else {
            return Err(self.reject(SchedulerError::MissingCardKey(cursor.card_index)));
        };

        let configured = self.skills.skills().order();
        let mut card_stats = self.stats.load(Some(&key), &configured).await?;
        let Some(current) = card_stats.skill(&cursor.skill_id) else {
            error!(card_key = %key, skill_id = %cursor.skill_id, "no stats for displayed skill");
            return Err(self.reject(SchedulerError::MissingSkillStats {
                card_key: key,
                skill_id: cursor.skill_id,
            }));
        };

        let judgment = Judgment {
            known,
            now: self.clock.now(),
            was_due: self.current_is_due,
            shown_at: self.shown_at,
        };
        let updated = apply_judgment(current, judgment, &self.intervals);
        card_stats
            .skills
            .insert(cursor.skill_id.clone(), updated.clone());
        self.stats.save(&key, &mut card_stats).await?;

        debug!(
            card_key = %key,
            skill_id = %cursor.skill_id,
            known,
            interval_index = updated.interval_index,
            "answer recorded"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::adapters::DataLayer;
    use crate::db::{KvStore, MemoryKvStore, StorageError, StorageResult, WriteOutcome};
    use crate::models::Card;
    use crate::services::context::{ManualClock, QueuedNotifier};
    use crate::services::skill::{Skill, SkillSet, VerificationMethod};

    /// Memory store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryKvStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn fail_writes(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> StorageResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl KvStore for FlakyStore {
        async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &Value) -> StorageResult<()> {
            self.check()?;
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> StorageResult<()> {
            self.check()?;
            self.inner.delete(key).await
        }

        async fn write_entries(&self, entries: Vec<(String, Value)>) -> StorageResult<Vec<WriteOutcome>> {
            self.check()?;
            self.inner.write_entries(entries).await
        }

        async fn keys(&self) -> StorageResult<Vec<String>> {
            self.inner.keys().await
        }
    }

    struct Harness {
        scheduler: Scheduler,
        clock: Arc<ManualClock>,
        notifier: Arc<QueuedNotifier>,
        skill_id: SkillId,
    }

    fn harness(cards: Vec<Card>, intervals: Vec<u64>) -> Harness {
        harness_over(Arc::new(MemoryKvStore::new()), cards, intervals)
    }

    fn harness_over(store: Arc<dyn KvStore>, cards: Vec<Card>, intervals: Vec<u64>) -> Harness {
        let skill = Skill::new("Reading", VerificationMethod::None, vec!["A".into()], vec!["B".into()]);
        let skill_id = skill.id.clone();
        let skills = Arc::new(SkillSet::all_active(vec![skill]));
        let layer = DataLayer::new(store, None);
        let notifier = QueuedNotifier::new();
        let clock = ManualClock::new(1_000_000);
        let scheduler = Scheduler::new(
            Deck::new(cards, 0),
            skills,
            StatsRepository::new(&layer, notifier.clone()),
            clock.clone(),
            notifier.clone(),
            SchedulerConfig {
                intervals: IntervalLadder::new(intervals),
                seed: Some(11),
                ..Default::default()
            },
        );
        Harness {
            scheduler,
            clock,
            notifier,
            skill_id,
        }
    }

    #[tokio::test]
    async fn empty_deck_is_reported() {
        let mut h = harness(vec![], vec![60]);
        let err = h.scheduler.show_next_card(false).await.unwrap_err();
        assert!(matches!(err, SchedulerError::EmptyDeck));
        assert_eq!(h.notifier.drain()[0].message, "No cards to display.");
    }

    #[tokio::test]
    async fn no_active_skills_is_reported() {
        let mut h = harness(vec![Card::new(["hola"])], vec![60]);
        h.scheduler.skills = Arc::new(SkillSet::default());
        let err = h.scheduler.show_next_card(false).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NoActiveSkills));
    }

    #[tokio::test]
    async fn showing_records_a_view_and_builds_history() {
        let mut h = harness(vec![Card::new(["hola"]), Card::new(["adios"])], vec![60, 300]);

        let first = h.scheduler.show_next_card(false).await.unwrap();
        assert_eq!(first.previous_last_viewed, None);
        let shown = first.stats.skill(&h.skill_id).unwrap();
        assert_eq!(shown.view_count, 1);
        assert_eq!(shown.last_viewed, Some(1_000_000));

        h.clock.advance(1_000);
        let second = h.scheduler.show_next_card(true).await.unwrap();
        assert_ne!(first.card_index, second.card_index);
        assert_eq!(h.scheduler.history().len(), 1);

        let back = h.scheduler.show_prev_card().await.unwrap().unwrap();
        assert_eq!(back.card_index, first.card_index);
        assert!(back.reason.is_none());
        assert_eq!(back.stats.skill(&h.skill_id).unwrap().view_count, 1);
        assert!(h.scheduler.show_prev_card().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn judging_without_a_card_fails() {
        let mut h = harness(vec![Card::new(["hola"])], vec![60]);
        let err = h.scheduler.mark_card_as_known(true).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NothingDisplayed));
    }

    #[tokio::test]
    async fn filter_without_matches_is_reported() {
        let mut h = harness(vec![Card::new(["hola"])], vec![60]);
        h.scheduler.set_filter(ContentFilter::from_text("gato"));
        let err = h.scheduler.show_next_card(false).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NoFilterMatches));
    }

    #[tokio::test]
    async fn failed_view_save_leaves_the_session_untouched() {
        let store = Arc::new(FlakyStore::default());
        let mut h = harness_over(store.clone(), vec![Card::new(["hola"]), Card::new(["adios"])], vec![60]);

        let first = h.scheduler.show_next_card(false).await.unwrap();
        let shown = h.scheduler.current().cloned();

        store.fail_writes(true);
        for _ in 0..2 {
            assert!(h.scheduler.show_next_card(true).await.is_err());
        }
        assert_eq!(h.scheduler.current(), shown.as_ref());
        assert!(h.scheduler.history().is_empty());
        assert!(h.scheduler.mark_card_as_known(true).await.is_err());

        store.fail_writes(false);
        h.scheduler.mark_card_as_known(true).await.unwrap();
        let key = first.card_key.unwrap();
        let stored = store.get(&key).await.unwrap().unwrap();
        assert_eq!(stored["skills"][&h.skill_id]["successTimestamps"].as_array().unwrap().len(), 1);
        assert_eq!(stored["_version"], 2);
    }

    #[tokio::test]
    async fn judging_a_skill_without_stats_is_reported() {
        let mut h = harness(vec![Card::new(["hola"])], vec![60]);
        h.scheduler.show_next_card(false).await.unwrap();

        let other = Skill::new("Listening", VerificationMethod::None, vec!["B".into()], vec!["A".into()]);
        h.scheduler.current = Some(Cursor {
            card_index: 0,
            skill_id: other.id.clone(),
        });
        let err = h.scheduler.mark_card_as_known(true).await.unwrap_err();
        assert!(matches!(err, SchedulerError::MissingSkillStats { ref skill_id, .. } if *skill_id == other.id));
        assert!(h.notifier.drain().iter().any(|n| n.level == NoticeLevel::Error));
    }
}
