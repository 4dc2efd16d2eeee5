use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::Deck;

/// Letters and numbers by general category only; combining marks split words.
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("word pattern compiles"));

/// Lower-cased runs of letters and digits.
pub fn tokenize(text: &str) -> Vec<String> {
    WORD.find_iter(text)
        .map(|word| word.as_str().to_lowercase())
        .collect()
}

/// Every word that appears in a key field of the deck.
pub fn deck_words(deck: &Deck) -> HashSet<String> {
    (0..deck.len())
        .filter_map(|index| deck.key_text(index))
        .flat_map(tokenize)
        .collect()
}

/// Restricts the working set to cards whose key shares a word with the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilter {
    pub words: HashSet<String>,
    pub enabled: bool,
    /// Fall back to the whole deck once the filtered set is learned.
    pub allow_overflow: bool,
}

impl ContentFilter {
    pub fn from_text(text: &str) -> Self {
        Self {
            words: tokenize(text).into_iter().collect(),
            enabled: true,
            allow_overflow: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.words.is_empty()
    }

    pub fn matches(&self, text: &str) -> bool {
        tokenize(text).iter().any(|word| self.words.contains(word))
    }

    pub fn matches_card(&self, deck: &Deck, card_index: usize) -> bool {
        deck.key_text(card_index).is_some_and(|text| self.matches(text))
    }

    /// Filter words that actually occur in the deck.
    pub fn intersection(&self, deck: &Deck) -> HashSet<String> {
        let words = deck_words(deck);
        self.words.intersection(&words).cloned().collect()
    }
}
