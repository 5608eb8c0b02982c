//! Surface-form normalization
//!
//! Canonicalizes raw entity strings into a match key used for fuzzy local
//! matching: whitespace and punctuation folding plus per-word morphological
//! normalization. Pure and idempotent.

use once_cell::sync::Lazy;
use regex::Regex;

static HYPHEN_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*").unwrap());
static WHITESPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
// Keep letters, digits, combining marks, spaces, and hyphens
static STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{M}\p{N} -]+").unwrap());

/// Per-word morphological normalization, delegated to an external
/// dictionary or model.
///
/// Implementations must be idempotent: `normal_form(normal_form(w)) ==
/// normal_form(w)`.
pub trait Lemmatizer: Send + Sync {
    fn normal_form(&self, word: &str) -> String;
}

/// Fallback used when no morphology model is wired in: lowercasing only
#[derive(Debug, Clone, Copy, Default)]
pub struct LowercaseLemmatizer;

impl Lemmatizer for LowercaseLemmatizer {
    fn normal_form(&self, word: &str) -> String {
        word.to_lowercase()
    }
}

/// Deterministic surface-form to match-key normalizer
pub struct MatchKeyNormalizer<L = LowercaseLemmatizer> {
    lemmatizer: L,
}

impl MatchKeyNormalizer<LowercaseLemmatizer> {
    pub fn new() -> Self {
        Self {
            lemmatizer: LowercaseLemmatizer,
        }
    }
}

impl Default for MatchKeyNormalizer<LowercaseLemmatizer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Lemmatizer> MatchKeyNormalizer<L> {
    pub fn with_lemmatizer(lemmatizer: L) -> Self {
        Self { lemmatizer }
    }

    /// Compute the match key for a surface form.
    ///
    /// Collapses whitespace runs around hyphens to a single hyphen, other
    /// whitespace runs to a single space, strips everything outside
    /// letters/digits/space/hyphen, then replaces each token with its
    /// morphological base form and rejoins with single spaces.
    pub fn normalize(&self, text: &str) -> String {
        let hyphens = HYPHEN_RUNS.replace_all(text, "-");
        let spaced = WHITESPACE_RUNS.replace_all(&hyphens, " ");
        let stripped = STRIP.replace_all(&spaced, "");

        stripped
            .split_whitespace()
            .map(|word| self.lemmatizer.normal_form(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hyphen_runs_collapse() {
        let normalizer = MatchKeyNormalizer::new();
        assert_eq!(normalizer.normalize("Rostov - on -Don"), "rostov-on-don");
    }

    #[test]
    fn test_whitespace_and_punctuation_fold() {
        let normalizer = MatchKeyNormalizer::new();
        assert_eq!(
            normalizer.normalize("  \"United\tNations\"  (UN) "),
            "united nations un"
        );
    }

    #[test]
    fn test_digits_survive() {
        let normalizer = MatchKeyNormalizer::new();
        assert_eq!(normalizer.normalize("G20 summit!"), "g20 summit");
    }

    #[test]
    fn test_non_latin_letters_survive() {
        let normalizer = MatchKeyNormalizer::new();
        assert_eq!(normalizer.normalize("Москва-Сити»"), "москва-сити");
    }

    #[test]
    fn test_lemmatizer_is_applied_per_word() {
        struct TruncatingLemmatizer;
        impl Lemmatizer for TruncatingLemmatizer {
            fn normal_form(&self, word: &str) -> String {
                word.chars().take(4).collect()
            }
        }

        let normalizer = MatchKeyNormalizer::with_lemmatizer(TruncatingLemmatizer);
        assert_eq!(normalizer.normalize("running quickly"), "runn quic");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in ".*") {
            let normalizer = MatchKeyNormalizer::new();
            let once = normalizer.normalize(&s);
            prop_assert_eq!(normalizer.normalize(&once), once.clone());
        }

        #[test]
        fn normalize_output_alphabet(s in ".*") {
            let normalizer = MatchKeyNormalizer::new();
            let key = normalizer.normalize(&s);
            prop_assert!(!key.contains("  "));
            prop_assert!(!key.starts_with(' ') && !key.ends_with(' '));
        }
    }
}
