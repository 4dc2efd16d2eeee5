use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::SkillId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationMethod {
    #[default]
    None,
    Text,
    MultipleChoice,
    Voice,
}

impl VerificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMethod::None => "none",
            VerificationMethod::Text => "text",
            VerificationMethod::MultipleChoice => "multipleChoice",
            VerificationMethod::Voice => "voice",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardSide {
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Casing {
    Uppercase,
    Lowercase,
    Initial,
    /// Toggles between upper case and the original text on the front side.
    Alternate,
    Random,
}

impl Casing {
    /// `use_uppercase` is the caller's alternation flag for `Alternate`.
    pub fn apply<R: Rng>(&self, text: &str, side: CardSide, use_uppercase: bool, rng: &mut R) -> String {
        match self {
            Casing::Uppercase => text.to_uppercase(),
            Casing::Lowercase => text.to_lowercase(),
            Casing::Initial => {
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => {
                        let rest = chars.as_str().to_lowercase();
                        first.to_uppercase().chain(rest.chars()).collect()
                    }
                    None => String::new(),
                }
            }
            Casing::Alternate => {
                if side == CardSide::Front && use_uppercase {
                    text.to_uppercase()
                } else {
                    text.to_string()
                }
            }
            Casing::Random => {
                let picked = match rng.random_range(0..3) {
                    0 => Casing::Uppercase,
                    1 => Casing::Lowercase,
                    _ => Casing::Initial,
                };
                picked.apply(text, side, use_uppercase, rng)
            }
        }
    }
}

/// A configured way of exercising a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: SkillId,
    pub name: String,
    #[serde(default)]
    pub verification_method: VerificationMethod,
    #[serde(default)]
    pub front: Vec<String>,
    #[serde(default)]
    pub back: Vec<String>,
    #[serde(default)]
    pub validation_field: Option<String>,
    #[serde(default)]
    pub tts_front_field: Option<String>,
    #[serde(default)]
    pub tts_back_field: Option<String>,
    #[serde(default)]
    pub tts_on_hotkey_only: bool,
    #[serde(default)]
    pub front_casing: Option<Casing>,
}

impl Skill {
    pub fn new(name: impl Into<String>, verification_method: VerificationMethod, front: Vec<String>, back: Vec<String>) -> Self {
        let mut skill = Self {
            id: SkillId::new(),
            name: name.into(),
            verification_method,
            front,
            back,
            validation_field: None,
            tts_front_field: None,
            tts_back_field: None,
            tts_on_hotkey_only: false,
            front_casing: None,
        };
        skill.refresh_id();
        skill
    }

    pub fn with_validation_field(mut self, field: impl Into<String>) -> Self {
        self.validation_field = Some(field.into());
        self.refresh_id();
        self
    }

    pub fn with_tts_front_field(mut self, field: impl Into<String>) -> Self {
        self.tts_front_field = Some(field.into());
        self.refresh_id();
        self
    }

    /// Recomputes the id after an edit; cosmetic edits leave it unchanged.
    pub fn refresh_id(&mut self) {
        self.id = skill_id(self);
    }
}

/// Content-derived identity. Only fields that change what is being tested
/// take part; the display name and back-side presentation do not.
pub fn skill_id(skill: &Skill) -> SkillId {
    let mut front = skill.front.clone();
    front.sort();
    let canonical = format!(
        "verificationMethod:{};front:{};validationColumn:{};ttsFrontColumn:{};",
        skill.verification_method.as_str(),
        front.join(","),
        skill.validation_field.as_deref().unwrap_or("none"),
        skill.tts_front_field.as_deref().unwrap_or("none"),
    );
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Configured skills in their configured order, plus the active subset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSet {
    pub configured: Vec<Skill>,
    pub active: Vec<SkillId>,
}

impl SkillSet {
    pub fn new(configured: Vec<Skill>, active: Vec<SkillId>) -> Self {
        Self { configured, active }
    }

    /// Every configured skill active.
    pub fn all_active(configured: Vec<Skill>) -> Self {
        let active = configured.iter().map(|s| s.id.clone()).collect();
        Self { configured, active }
    }

    pub fn order(&self) -> Vec<SkillId> {
        self.configured.iter().map(|s| s.id.clone()).collect()
    }

    /// Active skill ids sorted by configured order; unknown ids are dropped.
    pub fn ordered_active(&self) -> Vec<SkillId> {
        self.configured
            .iter()
            .filter(|s| self.active.contains(&s.id))
            .map(|s| s.id.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Skill> {
        self.configured.iter().find(|s| s.id == id)
    }
}
