//! Scripture citation extraction.
//!
//! K_i: Three pattern classes are recognized:
//! - standard "Romans 10:17", "1 John 3:16", "Song Solomon 2:4"
//! - abbreviated "ROM 12:2"
//! - spelled ordinal "First Corinthians 13:4", "2nd Timothy 3:16"

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Capitalized words that start sentences and get glued onto book names.
const SENTENCE_STARTERS: &[&str] = &[
    "In", "As", "See", "And", "But", "For", "Read", "Then", "From", "Also", "Like", "Compare",
    "Cf", "Both", "Even", "Yet", "So", "The", "When", "Where", "Thus", "Because", "Consider",
    "Study", "Note", "Recall", "Remember", "Notice", "Per", "Does", "Do", "Is", "What", "How",
    "Why",
];

/// A scripture citation found in text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptureRef {
    pub book: String,
    pub chapter: String,
    pub verse: String,
    /// Canonical key: "<book> <chapter>:<verse>"
    pub full: String,
    /// Byte span of the citation in the scanned text.
    #[serde(skip)]
    pub span: (usize, usize),
}

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\b((?:[1-3]\s)?[A-Z][a-z]+(?:\s[A-Z][a-z]+)?)\s+(\d+):(\d+(?:-\d+)?)",
            r"\b([A-Z]{2,4})\s+(\d+):(\d+(?:-\d+)?)",
            r"\b((?:First|Second|Third|1st|2nd|3rd)\s+[A-Z][a-z]+)\s+(\d+):(\d+(?:-\d+)?)",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Extract scripture citations in text order.
///
/// A span matched by several pattern classes is reported once, as is any
/// match lying inside a longer one ("Corinthians 13:4" within
/// "2nd Corinthians 13:4").
pub fn extract_scripture_references(text: &str) -> Vec<ScriptureRef> {
    let mut found: Vec<ScriptureRef> = Vec::new();

    for pattern in patterns() {
        for caps in pattern.captures_iter(text) {
            let (Some(whole), Some(book), Some(chapter), Some(verse)) =
                (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
            else {
                continue;
            };

            let mut book_name = book.as_str();
            let mut start = whole.start();
            if let Some((first, rest)) = book_name.split_once(' ') {
                if SENTENCE_STARTERS.contains(&first) {
                    book_name = rest;
                    start += first.len() + 1;
                }
            }

            found.push(ScriptureRef {
                book: book_name.to_string(),
                chapter: chapter.as_str().to_string(),
                verse: verse.as_str().to_string(),
                full: format!("{book_name} {}:{}", chapter.as_str(), verse.as_str()),
                span: (start, whole.end()),
            });
        }
    }

    // Longest first so contained matches can be discarded.
    found.sort_by(|a, b| {
        a.span
            .0
            .cmp(&b.span.0)
            .then((b.span.1 - b.span.0).cmp(&(a.span.1 - a.span.0)))
    });
    let mut kept: Vec<ScriptureRef> = Vec::with_capacity(found.len());
    for candidate in found {
        let covered = kept
            .iter()
            .any(|k| k.span.0 <= candidate.span.0 && candidate.span.1 <= k.span.1);
        if !covered {
            kept.push(candidate);
        }
    }
    kept
}

/// Text within `radius` characters either side of the byte span.
pub fn context_window(text: &str, span: (usize, usize), radius: usize) -> &str {
    let (start, end) = span;
    let begin = text[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map_or(start, |(i, _)| i);
    let finish = text[end..]
        .char_indices()
        .nth(radius)
        .map_or(text.len(), |(i, _)| end + i);
    &text[begin..finish]
}
