mod common;

use serde_json::json;

use common::{deck, reading_skill, seen, writing_skill, Session, NOW};
use flashcards_core::db::KvStore;
use flashcards_core::models::IntervalLadder;
use flashcards_core::services::filter::ContentFilter;
use flashcards_core::services::selection::ReasonKind;
use flashcards_core::services::{NoticeLevel, SchedulerConfig};

fn ladder(intervals: &[u64]) -> SchedulerConfig {
    SchedulerConfig {
        intervals: IntervalLadder::new(intervals.to_vec()),
        ..Default::default()
    }
}

#[tokio::test]
async fn due_item_is_reviewed_and_promoted() {
    let session = Session::new(vec![reading_skill()]);
    let skill = session.skill_id(0);
    session.seed("hola", &skill, seen(NOW - 70_000, 1, 0, 0)).await;
    let mut scheduler = session.scheduler(deck(&["hola"]), ladder(&[60, 300]));

    let shown = scheduler.show_next_card(false).await.unwrap();
    assert_eq!(
        shown.reason.as_ref().map(|r| r.kind.clone()),
        Some(ReasonKind::DueReview {
            expired_interval_secs: 60,
            next_interval_secs: 300
        })
    );
    assert_eq!(shown.previous_last_viewed, Some(NOW - 70_000));
    assert!(scheduler.current_is_due());

    let updated = scheduler.mark_card_as_known(true).await.unwrap();
    assert_eq!(updated.interval_index, 1);
    assert_eq!(updated.last_viewed, Some(NOW));

    let stored = session.stored("hola").await;
    let stats = stored.skill(&skill).unwrap();
    assert_eq!(stats.interval_index, 1);
    assert_eq!(stats.success_timestamps.len(), 2);
    assert_eq!(stats.view_count, 2);
    assert_eq!(stored.version, 2);
}

#[tokio::test]
async fn unknown_answer_resets_the_ladder() {
    let session = Session::new(vec![reading_skill()]);
    let skill = session.skill_id(0);
    session.seed("hola", &skill, seen(NOW - 700_000, 3, 0, 1)).await;
    let mut scheduler = session.scheduler(deck(&["hola"]), ladder(&[60, 300, 900]));

    scheduler.show_next_card(false).await.unwrap();
    session.clock.advance(4_000);
    let updated = scheduler.mark_card_as_known(false).await.unwrap();

    assert_eq!(updated.interval_index, 0);
    assert_eq!(updated.failure_timestamps, vec![NOW + 4_000]);
    assert_eq!(updated.response_delays, vec![4_000]);
}

#[tokio::test]
async fn recovering_card_drops_old_failures() {
    let session = Session::new(vec![reading_skill()]);
    let skill = session.skill_id(0);
    session.seed("hola", &skill, seen(NOW - 10_000, 0, 3, 0)).await;
    let mut scheduler = session.scheduler(deck(&["hola"]), ladder(&[60, 300]));

    scheduler.show_next_card(false).await.unwrap();
    let updated = scheduler.mark_card_as_known(true).await.unwrap();
    assert!(updated.failure_timestamps.len() <= updated.success_timestamps.len());
}

#[tokio::test]
async fn second_skill_bridges_from_seen_card() {
    let session = Session::new(vec![reading_skill(), writing_skill()]);
    let reading = session.skill_id(0);
    let writing = session.skill_id(1);
    session.seed("hola", &reading, seen(NOW - 1_000, 1, 0, 0)).await;
    let mut scheduler = session.scheduler(deck(&["hola", "adios", "gracias"]), ladder(&[60, 300]));

    let shown = scheduler.show_next_card(false).await.unwrap();
    assert_eq!(shown.card_key.as_deref(), Some("hola"));
    assert_eq!(shown.skill_id, writing);
    assert_eq!(shown.reason.map(|r| r.kind), Some(ReasonKind::BridgingCard));
}

#[tokio::test]
async fn learned_filter_overflows_into_the_whole_deck() {
    let session = Session::new(vec![reading_skill()]);
    let skill = session.skill_id(0);
    session.seed("el gato", &skill, seen(NOW - 1_000, 2, 0, 0)).await;

    let mut config = ladder(&[60, 300]);
    config.filter = ContentFilter::from_text("gato");
    let mut scheduler = session.scheduler(deck(&["el gato", "la casa"]), config);

    let shown = scheduler.show_next_card(false).await.unwrap();
    let reason = shown.reason.unwrap();
    assert_eq!(shown.card_key.as_deref(), Some("la casa"));
    assert_eq!(reason.kind, ReasonKind::NewCard);
    assert!(!reason.is_filtered);
}

#[tokio::test]
async fn learned_filter_without_overflow_stays_filtered() {
    let session = Session::new(vec![reading_skill()]);
    let skill = session.skill_id(0);
    session.seed("el gato", &skill, seen(NOW - 1_000, 2, 0, 0)).await;

    let mut config = ladder(&[60, 300]);
    config.filter = ContentFilter {
        allow_overflow: false,
        ..ContentFilter::from_text("gato")
    };
    let mut scheduler = session.scheduler(deck(&["el gato", "la casa"]), config);

    let shown = scheduler.show_next_card(false).await.unwrap();
    let reason = shown.reason.unwrap();
    assert_eq!(shown.card_key.as_deref(), Some("el gato"));
    assert!(reason.is_deck_learned());
    assert!(reason.is_filtered);
    assert_eq!(reason.describe(), "Filtered deck learned! Proceeding with regular deck.");
}

#[tokio::test]
async fn keyless_cards_are_shown_but_not_saved() {
    let session = Session::new(vec![reading_skill()]);
    let mut scheduler = session.scheduler(deck(&["   "]), ladder(&[60]));

    let shown = scheduler.show_next_card(false).await.unwrap();
    assert_eq!(shown.card_key, None);
    assert!(session.store.is_empty());

    let err = scheduler.mark_card_as_known(true).await.unwrap_err();
    assert!(err.to_string().contains("has no key"));
    let notices = session.notifier.drain();
    assert_eq!(notices.last().map(|n| n.level), Some(NoticeLevel::Error));
}

#[tokio::test]
async fn damaged_record_is_repaired_and_keeps_its_history() {
    let session = Session::new(vec![reading_skill()]);
    let skill = session.skill_id(0);
    session
        .store
        .set(
            "hola",
            &json!({
                "skills": { (skill.clone()): {
                    "successTimestamps": [1, 2, 3],
                    "intervalIndex": 4,
                    "viewCount": null
                } },
                "_version": 3
            }),
        )
        .await
        .unwrap();
    let mut scheduler = session.scheduler(deck(&["hola"]), ladder(&[60, 300, 900, 3600, 18000, 86400]));

    for round in 0..3u64 {
        scheduler.show_next_card(false).await.unwrap();
        session.clock.advance(1_000);
        scheduler.mark_card_as_known(true).await.unwrap();
        assert_eq!(session.stored("hola").await.version, 5 + 2 * round);
    }

    let stored = session.stored("hola").await;
    let stats = stored.skill(&skill).unwrap();
    assert_eq!(&stats.success_timestamps[..3], &[1, 2, 3]);
    assert_eq!(stats.success_timestamps.len(), 6);
    assert_eq!(stats.interval_index, 4);
    assert_eq!(stats.view_count, 3);
    assert!(session.notifier.is_empty());
}
