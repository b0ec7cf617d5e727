//! Prompt sanitation.
//!
//! Prompts are cleaned before tokenization: emoji and other symbols are
//! dropped, diacritics are stripped via NFD decomposition, and whitespace
//! runs are collapsed. A prompt that ends up empty is rejected.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};

/// Combining marks left behind by NFD decomposition.
static COMBINING_MARKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{M}+").expect("valid pattern"));

/// Everything outside word characters, whitespace and basic punctuation.
static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s.,!?-]").expect("valid pattern"));

/// Runs of whitespace.
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid pattern"));

/// Stateless prompt cleaner.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptCleaner;

impl PromptCleaner {
    /// Clean a prompt for submission.
    ///
    /// Returns `InvalidInput` when the prompt is empty or consists only of
    /// disallowed characters.
    pub fn clean(&self, prompt: &str) -> Result<String> {
        let decomposed: String = prompt.nfd().collect();
        let stripped = COMBINING_MARKS.replace_all(&decomposed, "");
        let filtered = DISALLOWED.replace_all(&stripped, "");
        let cleaned = WHITESPACE.replace_all(&filtered, " ").trim().to_string();

        if cleaned.is_empty() {
            return Err(Error::InvalidInput(
                "prompt is empty or contains only disallowed characters".into(),
            ));
        }

        tracing::trace!(original_len = prompt.len(), cleaned_len = cleaned.len(), "prompt cleaned");
        Ok(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_unchanged() {
        let cleaner = PromptCleaner;
        assert_eq!(cleaner.clean("What is Rust?").unwrap(), "What is Rust?");
    }

    #[test]
    fn emoji_removed() {
        let cleaner = PromptCleaner;
        assert_eq!(cleaner.clean("hello 🌍 world 🎉").unwrap(), "hello world");
    }

    #[test]
    fn diacritics_stripped() {
        let cleaner = PromptCleaner;
        assert_eq!(cleaner.clean("café naïve").unwrap(), "cafe naive");
    }

    #[test]
    fn special_characters_removed_punctuation_kept() {
        let cleaner = PromptCleaner;
        assert_eq!(
            cleaner.clean("wait... really?! @#$%^&*()").unwrap(),
            "wait... really?!"
        );
    }

    #[test]
    fn whitespace_collapsed_and_trimmed() {
        let cleaner = PromptCleaner;
        assert_eq!(cleaner.clean("  a \t b\n\nc  ").unwrap(), "a b c");
    }

    #[test]
    fn empty_prompt_rejected() {
        let cleaner = PromptCleaner;
        assert!(matches!(cleaner.clean(""), Err(Error::InvalidInput(_))));
        assert!(matches!(cleaner.clean("   "), Err(Error::InvalidInput(_))));
        assert!(matches!(cleaner.clean("🎉🎉🎉"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn cyrillic_preserved() {
        let cleaner = PromptCleaner;
        assert_eq!(cleaner.clean("Привет, мир!").unwrap(), "Привет, мир!");
    }
}
