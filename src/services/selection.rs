//! Picks the next review item from a working set.
//!
//! Three tiers are tried in order: due reviews, unseen items (bridging
//! before brand new), then a fallback over everything. Nothing here touches
//! storage; the scheduler feeds in freshly loaded stats.

use std::collections::HashMap;

use rand::Rng;
use serde::Serialize;

use crate::models::{CardStats, Cursor, IntervalLadder, ReviewItem, SkillId, Timestamp};
use crate::services::retention::{
    format_duration, format_time_difference, is_due, retention_score, time_to_due, TimeToDue,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReasonKind {
    DueReview {
        expired_interval_secs: u64,
        next_interval_secs: u64,
    },
    BridgingCard,
    NewCard,
    /// `None` stands for "never": nothing upcoming, or an item past the ladder.
    DeckLearned {
        time_to_next_review_ms: Option<i64>,
        time_to_last_review_ms: Option<i64>,
    },
    LeastLearned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionReason {
    #[serde(flatten)]
    pub kind: ReasonKind,
    pub is_filtered: bool,
}

impl SelectionReason {
    pub fn is_due_review(&self) -> bool {
        matches!(self.kind, ReasonKind::DueReview { .. })
    }

    pub fn is_deck_learned(&self) -> bool {
        matches!(self.kind, ReasonKind::DeckLearned { .. })
    }

    /// Banner text shown above the card.
    pub fn describe(&self) -> String {
        let scope = if self.is_filtered { "Filter" } else { "Deck" };
        match &self.kind {
            ReasonKind::DueReview {
                expired_interval_secs,
                next_interval_secs,
            } => format!(
                "[{scope}] This card is due for its {} review. Next review in {}.",
                format_duration(*expired_interval_secs),
                format_duration(*next_interval_secs),
            ),
            ReasonKind::BridgingCard => {
                format!("[{scope}] Practicing a new skill on a card you have already seen.")
            }
            ReasonKind::NewCard => format!("[{scope}] Introducing a new card."),
            ReasonKind::DeckLearned { .. } if self.is_filtered => {
                "Filtered deck learned! Proceeding with regular deck.".to_string()
            }
            ReasonKind::DeckLearned {
                time_to_next_review_ms: Some(next),
                time_to_last_review_ms,
            } => format!(
                "Deck learned! Reviews are from {} to {}. Reviewing lowest-score cards until then.",
                format_time_difference(*next),
                time_to_last_review_ms.map_or_else(|| "never".to_string(), format_time_difference),
            ),
            ReasonKind::DeckLearned { .. } => {
                "Congratulations, you have learned this whole deck!".to_string()
            }
            ReasonKind::LeastLearned => {
                format!("[{scope}] Reviewing the least learned card.")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub item: ReviewItem,
    pub reason: SelectionReason,
}

/// Everything selection reads besides the working set itself.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    /// Skip the currently displayed item when an alternative exists.
    pub force_new: bool,
    pub now: Timestamp,
    /// Stats of every card in the deck, indexed like the deck.
    pub all_card_stats: &'a [CardStats],
    /// Configured skill order; bridging follows it.
    pub skill_order: &'a [SkillId],
    pub intervals: &'a IntervalLadder,
    pub is_filtered: bool,
    pub current: Option<&'a Cursor>,
}

/// Builds the (card, active skill) cross product. Skills missing from a
/// card's stats show up as unseen.
pub fn review_items(all_card_stats: &[CardStats], active_skills: &[SkillId]) -> Vec<ReviewItem> {
    all_card_stats
        .iter()
        .enumerate()
        .flat_map(|(card_index, stats)| {
            active_skills.iter().map(move |skill_id| ReviewItem {
                card_index,
                skill_id: skill_id.clone(),
                stats: stats.skill(skill_id).cloned().unwrap_or_default(),
            })
        })
        .collect()
}

pub fn select_next<R: Rng>(
    items: &[ReviewItem],
    ctx: &SelectionContext<'_>,
    rng: &mut R,
) -> Option<Selection> {
    if items.is_empty() {
        return None;
    }
    select_due(items, ctx)
        .or_else(|| select_unseen(items, ctx, rng))
        .or_else(|| Some(select_fallback(items, ctx)))
}

fn reason(kind: ReasonKind, ctx: &SelectionContext<'_>) -> SelectionReason {
    SelectionReason {
        kind,
        is_filtered: ctx.is_filtered,
    }
}

fn is_current(item: &ReviewItem, ctx: &SelectionContext<'_>) -> bool {
    ctx.current.is_some_and(|cursor| item.is_at(cursor))
}

fn select_due(items: &[ReviewItem], ctx: &SelectionContext<'_>) -> Option<Selection> {
    let mut due: Vec<&ReviewItem> = items
        .iter()
        .filter(|item| item.stats.last_viewed.is_some() && is_due(&item.stats, ctx.intervals, ctx.now))
        .collect();
    if due.is_empty() {
        return None;
    }
    due.sort_by_key(|item| retention_score(&item.stats));

    let mut next = due[0];
    if ctx.force_new && due.len() > 1 && is_current(next, ctx) {
        next = due[1];
    }

    let index = next.stats.interval_index;
    let kind = ReasonKind::DueReview {
        expired_interval_secs: ctx.intervals.get(index).unwrap_or(0),
        next_interval_secs: ctx.intervals.get(index + 1).unwrap_or(0),
    };
    Some(Selection {
        item: next.clone(),
        reason: reason(kind, ctx),
    })
}

fn card_total_score(stats: Option<&CardStats>) -> i64 {
    stats.map_or(0, |card| card.skills.values().map(retention_score).sum())
}

/// True when the card was already viewed under a skill that comes earlier
/// in the configured order than the item's own skill.
fn seen_under_earlier_skill(
    item: &ReviewItem,
    ctx: &SelectionContext<'_>,
    rank: &HashMap<&str, usize>,
) -> bool {
    let Some(&own) = rank.get(item.skill_id.as_str()) else {
        return false;
    };
    if own == 0 {
        return false;
    }
    ctx.all_card_stats.get(item.card_index).is_some_and(|card| {
        card.skills.iter().any(|(skill_id, stats)| {
            rank.get(skill_id.as_str()).is_some_and(|&r| r < own) && stats.view_count > 0
        })
    })
}

fn select_unseen<R: Rng>(
    items: &[ReviewItem],
    ctx: &SelectionContext<'_>,
    rng: &mut R,
) -> Option<Selection> {
    let rank: HashMap<&str, usize> = ctx
        .skill_order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let (mut bridging, fresh): (Vec<&ReviewItem>, Vec<&ReviewItem>) = items
        .iter()
        .filter(|item| item.stats.is_unseen())
        .partition(|item| seen_under_earlier_skill(item, ctx, &rank));

    if !bridging.is_empty() {
        bridging.sort_by_key(|item| {
            (
                rank.get(item.skill_id.as_str()).copied().unwrap_or(usize::MAX),
                card_total_score(ctx.all_card_stats.get(item.card_index)),
            )
        });
        return Some(Selection {
            item: bridging[0].clone(),
            reason: reason(ReasonKind::BridgingCard, ctx),
        });
    }

    if !fresh.is_empty() {
        let picked = fresh[rng.random_range(0..fresh.len())];
        return Some(Selection {
            item: picked.clone(),
            reason: reason(ReasonKind::NewCard, ctx),
        });
    }

    None
}

fn select_fallback(items: &[ReviewItem], ctx: &SelectionContext<'_>) -> Selection {
    let all_learned = items.iter().all(|item| retention_score(&item.stats) > 0);

    let kind = if all_learned {
        let mut next_review: Option<i64> = None;
        let mut last_review: Option<i64> = Some(0);
        for item in items {
            match time_to_due(&item.stats, ctx.intervals, ctx.now) {
                TimeToDue::Learned => last_review = None,
                TimeToDue::Scheduled(ms) => {
                    if ms > 0 {
                        next_review = Some(next_review.map_or(ms, |n| n.min(ms)));
                    }
                    if let Some(last) = last_review {
                        last_review = Some(last.max(ms));
                    }
                }
                TimeToDue::Unseen => {}
            }
        }
        ReasonKind::DeckLearned {
            time_to_next_review_ms: next_review,
            time_to_last_review_ms: last_review,
        }
    } else {
        ReasonKind::LeastLearned
    };

    let mut candidates: Vec<&ReviewItem> = items.iter().collect();
    if ctx.force_new && candidates.len() > 1 {
        candidates.retain(|item| !is_current(item, ctx));
        if candidates.is_empty() {
            candidates = items.iter().collect();
        }
    }
    candidates.sort_by_key(|item| (retention_score(&item.stats), item.stats.last_viewed.unwrap_or(0)));

    Selection {
        item: candidates[0].clone(),
        reason: reason(kind, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SkillStats;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const NOW: Timestamp = 1_000_000;

    fn ladder() -> IntervalLadder {
        IntervalLadder::new(vec![60, 300])
    }

    fn seen(last_viewed: Timestamp, successes: usize, failures: usize) -> SkillStats {
        SkillStats {
            success_timestamps: vec![1; successes],
            failure_timestamps: vec![2; failures],
            last_viewed: Some(last_viewed),
            view_count: 1,
            ..Default::default()
        }
    }

    fn card(skills: &[(&str, SkillStats)]) -> CardStats {
        CardStats {
            skills: skills
                .iter()
                .map(|(id, stats)| (id.to_string(), stats.clone()))
                .collect(),
            version: 0,
        }
    }

    fn ctx<'a>(
        all: &'a [CardStats],
        order: &'a [SkillId],
        intervals: &'a IntervalLadder,
    ) -> SelectionContext<'a> {
        SelectionContext {
            force_new: false,
            now: NOW,
            all_card_stats: all,
            skill_order: order,
            intervals,
            is_filtered: false,
            current: None,
        }
    }

    fn order(ids: &[&str]) -> Vec<SkillId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_working_set_selects_nothing() {
        let intervals = ladder();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_next(&[], &ctx(&[], &[], &intervals), &mut rng).is_none());
    }

    #[test]
    fn due_item_wins_over_unseen() {
        let all = vec![
            card(&[("s1", seen(NOW - 70_000, 1, 0))]),
            card(&[("s1", SkillStats::default())]),
        ];
        let skills = order(&["s1"]);
        let items = review_items(&all, &skills);
        let intervals = ladder();
        let mut rng = StdRng::seed_from_u64(1);

        let picked = select_next(&items, &ctx(&all, &skills, &intervals), &mut rng).expect("selection");
        assert_eq!(picked.item.card_index, 0);
        assert_eq!(
            picked.reason.kind,
            ReasonKind::DueReview {
                expired_interval_secs: 60,
                next_interval_secs: 300
            }
        );
    }

    #[test]
    fn lowest_score_due_item_first_and_force_new_skips_current() {
        let all = vec![
            card(&[("s1", seen(NOW - 70_000, 1, 2))]),
            card(&[("s1", seen(NOW - 70_000, 3, 0))]),
        ];
        let skills = order(&["s1"]);
        let items = review_items(&all, &skills);
        let intervals = ladder();
        let mut rng = StdRng::seed_from_u64(1);

        let base = ctx(&all, &skills, &intervals);
        assert_eq!(select_next(&items, &base, &mut rng).map(|s| s.item.card_index), Some(0));

        let current = Cursor {
            card_index: 0,
            skill_id: "s1".into(),
        };
        let forced = SelectionContext {
            force_new: true,
            current: Some(&current),
            ..base
        };
        assert_eq!(select_next(&items, &forced, &mut rng).map(|s| s.item.card_index), Some(1));
    }

    #[test]
    fn bridging_beats_new_cards() {
        let all = vec![
            card(&[("s1", SkillStats::default()), ("s2", SkillStats::default())]),
            card(&[("s1", seen(NOW, 1, 0)), ("s2", SkillStats::default())]),
        ];
        let skills = order(&["s1", "s2"]);
        let items = review_items(&all, &skills);
        let intervals = ladder();
        let mut rng = StdRng::seed_from_u64(3);

        let picked = select_next(&items, &ctx(&all, &skills, &intervals), &mut rng).expect("selection");
        assert_eq!(picked.reason.kind, ReasonKind::BridgingCard);
        assert_eq!(picked.item.card_index, 1);
        assert_eq!(picked.item.skill_id, "s2");
    }

    #[test]
    fn later_skill_seen_does_not_bridge_earlier_skill() {
        let all = vec![card(&[("s1", SkillStats::default()), ("s2", seen(NOW, 1, 0))])];
        let skills = order(&["s1", "s2"]);
        let items = review_items(&all, &skills);
        let intervals = ladder();
        let mut rng = StdRng::seed_from_u64(3);

        let picked = select_next(&items, &ctx(&all, &skills, &intervals), &mut rng).expect("selection");
        assert_eq!(picked.reason.kind, ReasonKind::NewCard);
        assert_eq!(picked.item.skill_id, "s1");
    }

    #[test]
    fn fully_learned_deck_reports_review_window() {
        let all = vec![
            card(&[("s1", seen(NOW - 10_000, 2, 0))]),
            card(&[("s1", seen(NOW - 30_000, 1, 0))]),
        ];
        let skills = order(&["s1"]);
        let items = review_items(&all, &skills);
        let intervals = ladder();
        let mut rng = StdRng::seed_from_u64(1);

        let picked = select_next(&items, &ctx(&all, &skills, &intervals), &mut rng).expect("selection");
        assert_eq!(
            picked.reason.kind,
            ReasonKind::DeckLearned {
                time_to_next_review_ms: Some(30_000),
                time_to_last_review_ms: Some(50_000),
            }
        );
        assert_eq!(picked.item.card_index, 1);
        assert!(picked.reason.describe().starts_with("Deck learned! Reviews are from 30s to 50s"));
    }

    #[test]
    fn item_past_the_ladder_makes_last_review_never() {
        let mut done = seen(NOW, 2, 0);
        done.interval_index = 9;
        let all = vec![card(&[("s1", done)]), card(&[("s1", seen(NOW - 30_000, 1, 0))])];
        let skills = order(&["s1"]);
        let items = review_items(&all, &skills);
        let intervals = ladder();
        let mut rng = StdRng::seed_from_u64(1);

        let picked = select_next(&items, &ctx(&all, &skills, &intervals), &mut rng).expect("selection");
        assert_eq!(
            picked.reason.kind,
            ReasonKind::DeckLearned {
                time_to_next_review_ms: Some(30_000),
                time_to_last_review_ms: None,
            }
        );
    }

    #[test]
    fn unlearned_items_fall_back_to_least_learned() {
        let all = vec![
            card(&[("s1", seen(NOW - 10_000, 0, 1))]),
            card(&[("s1", seen(NOW - 10_000, 2, 0))]),
        ];
        let skills = order(&["s1"]);
        let items = review_items(&all, &skills);
        let intervals = ladder();
        let mut rng = StdRng::seed_from_u64(1);

        let picked = select_next(&items, &ctx(&all, &skills, &intervals), &mut rng).expect("selection");
        assert_eq!(picked.reason.kind, ReasonKind::LeastLearned);
        assert_eq!(picked.item.card_index, 0);
    }

    #[test]
    fn filtered_deck_learned_banner() {
        let reason = SelectionReason {
            kind: ReasonKind::DeckLearned {
                time_to_next_review_ms: None,
                time_to_last_review_ms: Some(0),
            },
            is_filtered: true,
        };
        assert_eq!(reason.describe(), "Filtered deck learned! Proceeding with regular deck.");
        let unfiltered = SelectionReason {
            is_filtered: false,
            ..reason
        };
        assert_eq!(unfiltered.describe(), "Congratulations, you have learned this whole deck!");
    }
}
