use std::collections::BTreeSet;

use serde_json::Value;

use crate::models::{CardStats, SkillStats, Timestamp};

fn union_sorted(a: &[Timestamp], b: &[Timestamp]) -> Vec<Timestamp> {
    a.iter().chain(b).copied().collect::<BTreeSet<_>>().into_iter().collect()
}

fn merge_skill(existing: &mut SkillStats, imported: &SkillStats) {
    existing.success_timestamps = union_sorted(&existing.success_timestamps, &imported.success_timestamps);
    existing.failure_timestamps = union_sorted(&existing.failure_timestamps, &imported.failure_timestamps);
    existing
        .response_delays
        .extend_from_slice(&imported.response_delays);
    existing.view_count += imported.view_count;
    existing.last_viewed = existing.last_viewed.max(imported.last_viewed);
    existing.interval_index = existing.interval_index.max(imported.interval_index);
    existing.version = existing.version.max(imported.version);
}

/// Combines two histories of the same card. Timestamps are unioned, view
/// counts added, and the furthest progress kept.
pub fn merge_card_stats(mut existing: CardStats, imported: &CardStats) -> CardStats {
    for (skill_id, stats) in &imported.skills {
        match existing.skills.get_mut(skill_id) {
            Some(current) => merge_skill(current, stats),
            None => {
                existing.skills.insert(skill_id.clone(), stats.clone());
            }
        }
    }
    existing.version = existing.version.max(imported.version);
    existing
}

/// Recursive object merge where `source` wins on scalar collisions.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                let nested = value.is_object() && target.get(&key).is_some_and(Value::is_object);
                if !nested {
                    target.insert(key, value);
                } else if let Some(existing) = target.get_mut(&key) {
                    deep_merge(existing, value);
                }
            }
        }
        (target, source) => *target = source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn skill(success: &[i64], views: u64, last: Option<i64>, index: usize) -> SkillStats {
        SkillStats {
            success_timestamps: success.to_vec(),
            view_count: views,
            last_viewed: last,
            interval_index: index,
            ..Default::default()
        }
    }

    #[test]
    fn merges_overlapping_histories() {
        let mut local = CardStats::default();
        local.skills.insert("s1".into(), skill(&[1, 3], 2, Some(3), 1));
        local.version = 2;
        let mut remote = CardStats::default();
        remote.skills.insert("s1".into(), skill(&[3, 2], 4, Some(5), 0));
        remote.skills.insert("s2".into(), skill(&[9], 1, Some(9), 2));
        remote.version = 5;

        let merged = merge_card_stats(local, &remote);
        let s1 = &merged.skills["s1"];
        assert_eq!(s1.success_timestamps, vec![1, 2, 3]);
        assert_eq!(s1.view_count, 6);
        assert_eq!(s1.last_viewed, Some(5));
        assert_eq!(s1.interval_index, 1);
        assert_eq!(merged.skills["s2"].view_count, 1);
        assert_eq!(merged.version, 5);
    }

    #[test]
    fn deep_merge_prefers_source_leaves() {
        let mut target = json!({ "a": { "x": 1, "y": 2 }, "b": 1 });
        deep_merge(&mut target, json!({ "a": { "y": 3 }, "c": [1] }));
        assert_eq!(target, json!({ "a": { "x": 1, "y": 3 }, "b": 1, "c": [1] }));
    }
}
