use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{Dal, DalError};
use crate::models::{IntervalLadder, SkillId};
use crate::services::filter::ContentFilter;
use crate::services::skill::{Skill, SkillSet};

/// Everything the user configured for one deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckConfig {
    pub name: String,
    #[serde(default)]
    pub key_field: usize,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub active_skills: Vec<SkillId>,
    #[serde(default)]
    pub filter: ContentFilter,
    #[serde(default)]
    pub intervals: IntervalLadder,
}

impl DeckConfig {
    pub fn new(name: impl Into<String>, key_field: usize) -> Self {
        Self {
            name: name.into(),
            key_field,
            skills: Vec::new(),
            active_skills: Vec::new(),
            filter: ContentFilter::default(),
            intervals: IntervalLadder::default(),
        }
    }

    pub fn skill_set(&self) -> SkillSet {
        SkillSet::new(self.skills.clone(), self.active_skills.clone())
    }

    /// Returns false when a skill with the same identity already exists.
    pub fn add_skill(&mut self, skill: Skill, active: bool) -> bool {
        if self.skills.iter().any(|s| s.id == skill.id) {
            return false;
        }
        if active {
            self.active_skills.push(skill.id.clone());
        }
        self.skills.push(skill);
        true
    }

    pub fn remove_skill(&mut self, id: &str) -> Option<Skill> {
        let position = self.skills.iter().position(|s| s.id == id)?;
        self.active_skills.retain(|active| active != id);
        Some(self.skills.remove(position))
    }

    pub fn set_active(&mut self, id: &str, active: bool) {
        let present = self.active_skills.iter().any(|a| a == id);
        if active && !present && self.skills.iter().any(|s| s.id == id) {
            self.active_skills.push(id.to_string());
        } else if !active {
            self.active_skills.retain(|a| a != id);
        }
    }
}

/// Deck configurations over the config channel of a DAL.
#[derive(Clone)]
pub struct ConfigRepository {
    dal: Dal,
}

impl ConfigRepository {
    pub fn new(dal: Dal) -> Self {
        Self { dal }
    }

    pub async fn load(&self, name: &str) -> Result<Option<DeckConfig>, DalError> {
        let Some(value) = self.dal.load_config(name).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                warn!(name, error = %err, "ignoring malformed deck config");
                Ok(None)
            }
        }
    }

    pub async fn save(&self, config: &DeckConfig) -> Result<(), DalError> {
        self.dal
            .save_config(&config.name, &serde_json::to_value(config)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DataLayer;
    use crate::db::MemoryKvStore;
    use crate::services::skill::VerificationMethod;
    use std::sync::Arc;

    fn skill(front: &str) -> Skill {
        Skill::new(front, VerificationMethod::None, vec![front.to_string()], vec![])
    }

    #[test]
    fn duplicate_skills_are_refused() {
        let mut config = DeckConfig::new("spanish", 0);
        assert!(config.add_skill(skill("A"), true));
        assert!(!config.add_skill(skill("A"), false));
        assert!(config.add_skill(skill("B"), false));
        assert_eq!(config.skill_set().ordered_active().len(), 1);

        let b = config.skills[1].id.clone();
        config.set_active(&b, true);
        assert_eq!(config.active_skills.len(), 2);
        assert!(config.remove_skill(&b).is_some());
        assert_eq!(config.active_skills.len(), 1);
    }

    #[tokio::test]
    async fn configs_round_trip_through_the_local_store() {
        let layer = DataLayer::new(Arc::new(MemoryKvStore::new()), None);
        let repo = ConfigRepository::new(layer.local().clone());
        let mut config = DeckConfig::new("spanish", 1);
        config.add_skill(skill("A"), true);
        config.filter = ContentFilter::from_text("gato");

        repo.save(&config).await.unwrap();
        assert_eq!(repo.load("spanish").await.unwrap(), Some(config));
        assert_eq!(repo.load("french").await.unwrap(), None);
    }
}
