use serde::Serialize;

use crate::models::{IntervalLadder, SkillStats, Timestamp};

/// Where an item stands relative to its next review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "ms", rename_all = "snake_case")]
pub enum TimeToDue {
    /// Never shown; not comparable with scheduled items.
    Unseen,
    /// Past the end of the ladder.
    Learned,
    /// Milliseconds until due; negative once due.
    Scheduled(i64),
}

impl TimeToDue {
    pub fn is_due(&self) -> bool {
        matches!(self, TimeToDue::Scheduled(ms) if *ms < 0)
    }

    /// -1 for unseen and `None` (infinite) for learned.
    pub fn ms(&self) -> Option<i64> {
        match self {
            TimeToDue::Unseen => Some(-1),
            TimeToDue::Learned => None,
            TimeToDue::Scheduled(ms) => Some(*ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Judgment {
    pub known: bool,
    pub now: Timestamp,
    pub was_due: bool,
    pub shown_at: Option<Timestamp>,
}

pub fn retention_score(stats: &SkillStats) -> i64 {
    stats.success_timestamps.len() as i64 - stats.failure_timestamps.len() as i64
}

pub fn time_to_due(stats: &SkillStats, intervals: &IntervalLadder, now: Timestamp) -> TimeToDue {
    let Some(last_viewed) = stats.last_viewed else {
        return TimeToDue::Unseen;
    };
    let Some(interval_secs) = intervals.get(stats.interval_index) else {
        return TimeToDue::Learned;
    };
    let interval_ms = i64::try_from(interval_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    TimeToDue::Scheduled(last_viewed.saturating_add(interval_ms).saturating_sub(now))
}

pub fn is_due(stats: &SkillStats, intervals: &IntervalLadder, now: Timestamp) -> bool {
    time_to_due(stats, intervals, now).is_due()
}

/// Applies a known/unknown answer. View bookkeeping is left to the caller.
pub fn apply_judgment(stats: &SkillStats, judgment: Judgment, intervals: &IntervalLadder) -> SkillStats {
    let mut next = stats.clone();

    if let Some(shown_at) = judgment.shown_at {
        next.response_delays.push(judgment.now - shown_at);
    }

    if judgment.known {
        let score_before = retention_score(stats);
        next.success_timestamps.push(judgment.now);
        if score_before < 0 {
            let excess = next
                .failure_timestamps
                .len()
                .saturating_sub(next.success_timestamps.len());
            next.failure_timestamps.drain(..excess);
        }
        if judgment.was_due && intervals.can_advance(next.interval_index) {
            next.interval_index += 1;
        }
    } else {
        next.failure_timestamps.push(judgment.now);
        next.interval_index = 0;
    }

    next.version += 1;
    next
}

/// Bookkeeping for a card being shown.
pub fn record_view(stats: &SkillStats, now: Timestamp) -> SkillStats {
    let mut next = stats.clone();
    next.view_count += 1;
    next.last_viewed = Some(now);
    next.version += 1;
    next
}

pub fn format_duration(seconds: u64) -> String {
    let rounded = |unit: u64| (seconds as f64 / unit as f64).round() as u64;
    match seconds {
        s if s < 60 => format!("{s} seconds"),
        s if s < 3_600 => format!("{} minutes", rounded(60)),
        s if s < 86_400 => format!("{} hours", rounded(3_600)),
        s if s < 2_592_000 => format!("{} days", rounded(86_400)),
        s if s < 31_536_000 => format!("{} months", rounded(2_592_000)),
        _ => format!("{} years", rounded(31_536_000)),
    }
}

pub fn format_time_difference(ms: i64) -> String {
    if ms <= 0 {
        return "Now".to_string();
    }
    let seconds = ms / 1000;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{minutes}m");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h");
    }
    format!("{}d", hours / 24)
}
