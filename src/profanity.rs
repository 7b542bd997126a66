//! Profanity filter
//!
//! Word-boundary-aware, case-insensitive matching of message text against
//! a word list. The dispatcher only depends on the boolean answer; the list
//! itself is swappable via `with_words`.

use std::collections::HashSet;

/// Seed lexicon used by `ProfanityFilter::default`
///
/// Deliberately small; deployments supply their own maintained list.
const DEFAULT_LEXICON: &[&str] = &[
    "ass", "bastard", "bitch", "crap", "damn", "fuck", "jerk", "shit",
];

/// Case-insensitive, word-boundary-aware profanity filter
///
/// Stores the lexicon lowercased; matching tokenizes input on
/// non-alphanumeric characters, so "class" never matches "ass".
#[derive(Debug, Clone)]
pub struct ProfanityFilter {
    words: HashSet<String>,
}

impl ProfanityFilter {
    /// Create a filter from an externally supplied word list
    pub fn with_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Check whether the text contains any word from the lexicon
    pub fn is_profane(&self, text: &str) -> bool {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .any(|token| self.words.contains(&token.to_ascii_lowercase()))
    }
}

impl Default for ProfanityFilter {
    fn default() -> Self {
        Self::with_words(DEFAULT_LEXICON.iter().copied())
    }
}
