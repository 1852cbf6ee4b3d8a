//! Text normalization pipeline used before submitting a document to the
//! Search Backend: lowercasing, word-regex tokenization, stop-word removal,
//! and light stemming — grounded in `indexer_node.py`'s
//! `tokenize_and_normalize` (which used NLTK's `PorterStemmer` and English
//! stop-word list).
//!
//! A full Porter stemmer crate isn't part of this pack's stack, so stemming
//! here is a small suffix-stripping approximation (DESIGN.md Open Question).

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref WORD_RE: Regex = Regex::new(r"\w+").unwrap();
    static ref STOP_WORDS: HashSet<&'static str> = [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if",
        "in", "into", "is", "it", "no", "not", "of", "on", "or", "such",
        "that", "the", "their", "then", "there", "these", "they", "this",
        "to", "was", "will", "with", "i", "you", "he", "she", "we",
    ]
    .into_iter()
    .collect();
}

fn stem(word: &str) -> String {
    for suffix in ["ational", "ization", "ingly", "edly", "ing", "ed", "es", "ly", "s"] {
        if word.len() > suffix.len() + 2 && word.ends_with(suffix) {
            return word[..word.len() - suffix.len()].to_string();
        }
    }
    word.to_string()
}

/// Lowercase, extract `\w+` tokens, drop stop-words, and stem what remains.
pub fn tokenize_and_normalize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD_RE
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|w| !STOP_WORDS.contains(w))
        .map(stem)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_stop_words_and_lowercases() {
        let tokens = tokenize_and_normalize("The Quick Brown Fox");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(tokens.contains(&"quick".to_string()));
        assert!(tokens.contains(&"brown".to_string()));
    }

    #[test]
    fn strips_common_suffixes() {
        let tokens = tokenize_and_normalize("crawling crawled crawlers");
        assert!(tokens.iter().all(|t| t.starts_with("crawl")));
    }

    #[test]
    fn extracts_word_characters_only() {
        let tokens = tokenize_and_normalize("hello, world! foo_bar 123");
        assert!(tokens.contains(&"hello".to_string()));
        assert!(tokens.contains(&"world".to_string()));
        assert!(tokens.iter().any(|t| t.contains("foo")));
        assert!(tokens.contains(&"123".to_string()));
    }
}
