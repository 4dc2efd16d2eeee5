//! Data model shared by the scheduler and the sync layer.
//!
//! Everything that is persisted keeps the camelCase field names the stored
//! JSON has always used; the versioning fields keep their snake_case wire names.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// A duration in milliseconds.
pub type Millis = i64;

pub type SkillId = String;

pub const DEFAULT_INTERVALS: [u64; 11] = [
    5, 25, 120, 600, 3600, 18000, 86400, 432000, 2160000, 10368000, 63072000,
];

// ============================================================
// Card / Deck
// ============================================================

/// One row of deck content. Cards are immutable for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub fields: Vec<String>,
}

impl Card {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// The loaded deck plus the index of the field that acts as the canonical key.
#[derive(Debug, Clone, Default)]
pub struct Deck {
    pub cards: Vec<Card>,
    pub key_field: usize,
}

impl Deck {
    pub fn new(cards: Vec<Card>, key_field: usize) -> Self {
        Self { cards, key_field }
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Trimmed key field value; `None` when the field is missing or blank.
    pub fn card_key(&self, index: usize) -> Option<String> {
        let value = self.cards.get(index)?.field(self.key_field)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    pub fn key_text(&self, index: usize) -> Option<&str> {
        self.cards.get(index)?.field(self.key_field)
    }
}

// ============================================================
// SkillStats / CardStats
// ============================================================

/// Learning progress for one (card, skill) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillStats {
    pub success_timestamps: Vec<Timestamp>,
    pub failure_timestamps: Vec<Timestamp>,
    pub response_delays: Vec<Millis>,
    pub last_viewed: Option<Timestamp>,
    pub interval_index: usize,
    pub view_count: u64,
    pub version: u64,
}

impl SkillStats {
    pub fn is_unseen(&self) -> bool {
        self.view_count == 0
    }
}

/// The persisted unit, stored under the card's canonical key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStats {
    #[serde(default)]
    pub skills: HashMap<SkillId, SkillStats>,
    #[serde(rename = "_version", default)]
    pub version: u64,
}

impl CardStats {
    /// Reads a stored value; `None` when nothing is stored.
    pub fn from_stored(value: Option<&Value>) -> Option<Self> {
        value.filter(|v| !v.is_null()).map(|v| Self::sanitize(v).0)
    }

    /// Repairs a stored record field by field. Broken fields fall back to
    /// their defaults, everything readable is kept, and `_version` is read on
    /// its own so the repaired record can still be written back. The flag is
    /// true when anything had to be repaired.
    pub fn sanitize(value: &Value) -> (Self, bool) {
        let Some(object) = value.as_object() else {
            return (Self::default(), true);
        };
        let mut repaired = false;
        let version = count(object.get(VERSION_KEY), &mut repaired);

        let mut skills = HashMap::new();
        match object.get("skills") {
            Some(Value::Object(entries)) => {
                for (id, raw) in entries {
                    match SkillStats::sanitize(raw) {
                        Some((stats, fixed)) => {
                            repaired |= fixed;
                            skills.insert(id.clone(), stats);
                        }
                        None => repaired = true,
                    }
                }
            }
            None => {}
            Some(_) => repaired = true,
        }
        (Self { skills, version }, repaired)
    }

    /// Adds default stats for every skill that has none yet.
    pub fn ensure_skills<'a, I>(&mut self, skill_ids: I)
    where
        I: IntoIterator<Item = &'a SkillId>,
    {
        for id in skill_ids {
            self.skills.entry(id.clone()).or_default();
        }
    }

    pub fn skill(&self, skill_id: &str) -> Option<&SkillStats> {
        self.skills.get(skill_id)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

const VERSION_KEY: &str = "_version";

fn timestamps(raw: Option<&Value>, repaired: &mut bool) -> Vec<i64> {
    match raw {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let kept: Vec<i64> = items.iter().filter_map(Value::as_i64).collect();
            *repaired |= kept.len() != items.len();
            kept
        }
        Some(_) => {
            *repaired = true;
            Vec::new()
        }
    }
}

fn count(raw: Option<&Value>, repaired: &mut bool) -> u64 {
    match raw {
        None => 0,
        Some(value) => value.as_u64().unwrap_or_else(|| {
            *repaired = true;
            0
        }),
    }
}

impl SkillStats {
    /// `None` when `raw` is not an object at all.
    fn sanitize(raw: &Value) -> Option<(Self, bool)> {
        let object = raw.as_object()?;
        let mut repaired = false;
        let last_viewed = match object.get("lastViewed") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let parsed = value.as_i64();
                repaired |= parsed.is_none();
                parsed
            }
        };
        let stats = Self {
            success_timestamps: timestamps(object.get("successTimestamps"), &mut repaired),
            failure_timestamps: timestamps(object.get("failureTimestamps"), &mut repaired),
            response_delays: timestamps(object.get("responseDelays"), &mut repaired),
            last_viewed,
            interval_index: count(object.get("intervalIndex"), &mut repaired) as usize,
            view_count: count(object.get("viewCount"), &mut repaired),
            version: count(object.get("version"), &mut repaired),
        };
        Some((stats, repaired))
    }
}

// ============================================================
// ReviewItem / IntervalLadder
// ============================================================

/// Materialized for one selection pass, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewItem {
    pub card_index: usize,
    pub skill_id: SkillId,
    pub stats: SkillStats,
}

impl ReviewItem {
    pub fn is_at(&self, cursor: &Cursor) -> bool {
        self.card_index == cursor.card_index && self.skill_id == cursor.skill_id
    }
}

/// Position of a displayed item; also the unit of the "previous" history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub card_index: usize,
    pub skill_id: SkillId,
}

/// Review intervals in seconds. `interval_index` indexes into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalLadder(Vec<u64>);

impl IntervalLadder {
    pub fn new(intervals: Vec<u64>) -> Self {
        Self(intervals)
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        self.0.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `index` can still move up one rung.
    pub fn can_advance(&self, index: usize) -> bool {
        index + 1 < self.0.len()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }
}

impl Default for IntervalLadder {
    fn default() -> Self {
        Self(DEFAULT_INTERVALS.to_vec())
    }
}

// ============================================================
// UnresolvedConflict
// ============================================================

/// A rejected optimistic write, kept until the user resolves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedConflict {
    #[serde(rename = "key")]
    pub original_key: String,
    #[serde(rename = "client")]
    pub client_payload: Value,
    #[serde(rename = "client_base_version", default)]
    pub client_base_version: Option<u64>,
    #[serde(rename = "client_new_version", default)]
    pub client_new_version: u64,
    #[serde(rename = "server", default)]
    pub server_value: Option<Value>,
    #[serde(rename = "server_version", default)]
    pub server_version: u64,
}

pub const CONFLICT_KEY_PREFIX: &str = "unresolved_conflicts:";

pub fn conflict_key(original_key: &str) -> String {
    format!("{CONFLICT_KEY_PREFIX}{original_key}")
}
