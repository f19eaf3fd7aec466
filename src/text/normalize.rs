// Deterministic text cleanup applied to every topic and opinion.
//
// Output is lowercase, accent-free, and contains no digits, URL/email
// fragments, emoji or English stopwords. It is always cut on a token boundary.
// Anything that cannot be normalized comes back as None and the caller drops
// that item; a bad row never aborts the batch it belongs to.
//
// Accent folding runs before the stripping passes so that a second pass over
// the output finds nothing left to remove (NFKD can expose digits and ASCII
// letters, and removing a glyph can join two URL fragments).

use std::collections::HashSet;
use std::sync::OnceLock;

use regex_lite::Regex;
use stop_words::{get, LANGUAGE};
use tracing::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Default upper bound on normalized text length, in characters.
pub const DEFAULT_MAX_LENGTH: usize = 1024;

/// Normalized text shorter than this is rejected.
pub const MIN_LENGTH: usize = 2;

fn url_pattern() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"http\S+|www\S+").expect("valid URL pattern"))
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"\S+@\S+").expect("valid email pattern"))
}

/// Stateless apart from the stopword set, which is built once.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    stop_words: HashSet<String>,
    max_length: usize,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LENGTH)
    }
}

impl TextNormalizer {
    /// Build a normalizer with the NLTK English stopword list.
    pub fn new(max_length: usize) -> Self {
        let stop_words: Vec<String> = get(LANGUAGE::English);
        Self::with_stop_words(stop_words, max_length)
    }

    /// Build a normalizer with a custom stopword list. Words are folded the
    /// same way input text is, so "Ánd" in the list still removes "and".
    pub fn with_stop_words<I, S>(stop_words: I, max_length: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let stop_words = stop_words
            .into_iter()
            .map(|w| fold_accents(&w.as_ref().to_lowercase()))
            .filter(|w| !w.is_empty())
            .collect();
        Self {
            stop_words,
            max_length: max_length.max(MIN_LENGTH),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    /// Normalize one text. Returns None when the input is blank, nothing
    /// survives stopword removal, or the result is shorter than MIN_LENGTH.
    pub fn normalize(&self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            debug!("Ignoring blank text");
            return None;
        }

        let text = fold_accents(&text.to_lowercase());
        let text = strip_digits(&text);
        let text = strip_emoji(&text);
        let text = url_pattern().replace_all(&text, "");
        let text = email_pattern().replace_all(&text, "");

        let tokens: Vec<&str> = text
            .split_whitespace()
            .filter(|word| !self.stop_words.contains(*word))
            .collect();

        if tokens.is_empty() {
            debug!(text = %text, "Text became empty after filtering");
            return None;
        }

        let processed = truncate_on_token_boundary(&tokens, self.max_length);

        if processed.chars().count() < MIN_LENGTH {
            return None;
        }

        Some(processed)
    }

    /// Normalize a batch, dropping invalid items and keeping input order.
    pub fn normalize_all<S: AsRef<str>>(&self, texts: &[S]) -> Vec<String> {
        texts
            .iter()
            .filter_map(|t| self.normalize(t.as_ref()))
            .collect()
    }
}

/// Canonical (compatibility) decomposition with combining marks removed.
/// Compatibility forms can decompose to uppercase letters, so lowercase again.
fn fold_accents(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
}

fn strip_digits(text: &str) -> String {
    text.chars().filter(|c| !c.is_numeric()).collect()
}

fn strip_emoji(text: &str) -> String {
    text.chars().filter(|c| !is_emoji(*c)).collect()
}

/// Pictographic ranges plus the joiners and selectors that glue emoji
/// sequences together.
fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF
            | 0x2600..=0x27BF
            | 0x2300..=0x23FF
            | 0x2B00..=0x2BFF
            | 0x2190..=0x21FF
            | 0x25A0..=0x25FF
            | 0xE0020..=0xE007F
            | 0xFE00..=0xFE0F
            | 0x200D
            | 0x20E3
            | 0x00A9
            | 0x00AE
            | 0x203C
            | 0x2049
            | 0x2122
            | 0x2139
            | 0x3030
            | 0x303D
            | 0x3297
            | 0x3299
    )
}

/// Join tokens with single spaces, stopping before the first token that
/// would push the result past `max_length` characters.
fn truncate_on_token_boundary(tokens: &[&str], max_length: usize) -> String {
    let mut out = String::new();
    let mut len = 0;

    for token in tokens {
        let token_len = token.chars().count();
        let needed = if out.is_empty() { token_len } else { token_len + 1 };
        if len + needed > max_length {
            debug!(max_length, "Normalized text truncated");
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
        len += needed;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::with_stop_words(["the", "is", "a", "and", "i", "that", "at", "all", "not", "no"], 40)
    }

    #[test]
    fn test_lowercases_and_strips_stopwords() {
        let n = normalizer();
        assert_eq!(
            n.normalize("The Climate IS changing").as_deref(),
            Some("climate changing")
        );
    }

    #[test]
    fn test_strips_digits_urls_and_emails() {
        let n = normalizer();
        let out = n
            .normalize("Read 2024 report https://example.com/x mail me@example.org now")
            .unwrap();
        assert_eq!(out, "read report mail now");
    }

    #[test]
    fn test_strips_accents() {
        let n = normalizer();
        assert_eq!(n.normalize("Café naïve résumé").as_deref(), Some("cafe naive resume"));
    }

    #[test]
    fn test_strips_emoji() {
        let n = normalizer();
        assert_eq!(n.normalize("great 🔥 idea 👍🏽").as_deref(), Some("great idea"));
    }

    #[test]
    fn test_blank_is_invalid() {
        let n = normalizer();
        assert_eq!(n.normalize(""), None);
        assert_eq!(n.normalize("   \t\n"), None);
    }

    #[test]
    fn test_only_stopwords_is_invalid() {
        let n = normalizer();
        assert_eq!(n.normalize("the and is a"), None);
    }

    #[test]
    fn test_too_short_is_invalid() {
        let n = normalizer();
        assert_eq!(n.normalize("x 42"), None);
    }

    #[test]
    fn test_truncates_on_token_boundary() {
        let n = TextNormalizer::with_stop_words(Vec::<String>::new(), 12);
        assert_eq!(n.normalize("alpha beta gamma delta").as_deref(), Some("alpha beta"));
    }

    #[test]
    fn test_single_token_longer_than_limit_is_invalid() {
        let n = TextNormalizer::with_stop_words(Vec::<String>::new(), 4);
        assert_eq!(n.normalize("extraordinary"), None);
    }

    #[test]
    fn test_compatibility_forms_fold_to_lowercase() {
        let n = normalizer();
        let once = n.normalize("ℌello ﬁne").unwrap();
        assert_eq!(once, "hello fine");
        assert_eq!(n.normalize(&once).as_deref(), Some(once.as_str()));
    }

    #[test]
    fn test_superscript_digits_removed() {
        let n = normalizer();
        assert_eq!(n.normalize("area m² value").as_deref(), Some("area m value"));
    }

    #[test]
    fn test_emoji_between_url_fragments_is_idempotent() {
        let n = normalizer();
        let once = n.normalize("keep ww🔥wexample going").unwrap();
        assert_eq!(n.normalize(&once).as_deref(), Some(once.as_str()));
    }

    #[test]
    fn test_normalize_all_drops_invalid_and_keeps_order() {
        let n = normalizer();
        let out = n.normalize_all(&["First topic", "", "the", "second topic"]);
        assert_eq!(out, vec!["first topic", "second topic"]);
    }

    #[test]
    fn test_default_uses_english_stopwords() {
        let n = TextNormalizer::default();
        assert!(n.is_stop_word("the"));
        assert_eq!(n.max_length(), DEFAULT_MAX_LENGTH);
    }

    #[test]
    fn test_default_list_keeps_content_words() {
        let n = TextNormalizer::default();
        for word in ["think", "fact", "great", "going", "keeps", "says"] {
            assert!(!n.is_stop_word(word), "{word} treated as a stopword");
        }
    }
}
