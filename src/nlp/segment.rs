//! Rule-based sentence segmentation and tokenization.
//!
//! K_i: Segmentation is deterministic and allocation-light; sentences are
//! returned as slices of the input.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Sentence splitting and clause classification.
pub trait Segmenter: Send + Sync {
    /// Split text into trimmed, non-empty sentences in order.
    fn sentences<'a>(&self, text: &'a str) -> Vec<&'a str>;

    /// Whether a sentence reads as a declarative statement.
    fn is_declarative(&self, sentence: &str) -> bool;
}

/// Punctuation-driven segmenter with an abbreviation guard.
#[derive(Debug, Clone, Default)]
pub struct RuleSegmenter;

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "st", "vs", "etc", "e.g", "i.e", "cf", "ch", "vv", "v", "rev", "gen",
    "ex", "lev", "deut", "rom", "cor", "gal", "eph", "phil", "col", "thess", "tim", "heb", "matt",
];

impl RuleSegmenter {
    pub fn new() -> Self {
        Self
    }

    fn ends_with_abbreviation(prefix: &str) -> bool {
        let last = prefix
            .rsplit(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or("")
            .trim_end_matches('.')
            .to_lowercase();
        ABBREVIATIONS.contains(&last.as_str())
    }
}

impl Segmenter for RuleSegmenter {
    fn sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut sentences = Vec::new();
        let mut start = 0;
        let mut chars = text.char_indices().peekable();

        while let Some((idx, c)) = chars.next() {
            if !matches!(c, '.' | '!' | '?') {
                continue;
            }
            // Swallow runs like "?!" or "..." and closing quotes.
            let mut end = idx + c.len_utf8();
            while let Some(&(next_idx, next)) = chars.peek() {
                if matches!(next, '.' | '!' | '?' | '"' | '\'' | ')' | '\u{201d}') {
                    end = next_idx + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let at_boundary = chars.peek().is_none_or(|&(_, next)| next.is_whitespace());
            if !at_boundary || (c == '.' && Self::ends_with_abbreviation(&text[start..idx])) {
                continue;
            }
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }

        let tail = text[start..].trim();
        if !tail.is_empty() {
            sentences.push(tail);
        }
        sentences
    }

    fn is_declarative(&self, sentence: &str) -> bool {
        let trimmed = sentence.trim_end_matches(['"', '\'', ')', '\u{201d}']);
        if trimmed.ends_with('?') || trimmed.ends_with('!') {
            return false;
        }
        tokenize(trimmed).len() >= 3
    }
}

/// Split text into word tokens, keeping inner apostrophes and hyphens.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|w| w.trim_matches(|c: char| c == '\'' || c == '-'))
        .filter(|w| !w.is_empty())
        .collect()
}

/// English stopwords used for keyphrase candidate selection.
pub fn is_stopword(word: &str) -> bool {
    static STOPWORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    STOPWORDS
        .get_or_init(|| STOPWORD_LIST.iter().copied().collect())
        .contains(word.to_lowercase().as_str())
}

/// Normalized blend of mean sentence length and vocabulary diversity, in [0, 1].
pub fn lexical_complexity(segmenter: &dyn Segmenter, text: &str) -> f64 {
    let sentences = segmenter.sentences(text);
    let tokens = tokenize(text);
    if sentences.is_empty() || tokens.is_empty() {
        return 0.0;
    }

    let avg_sentence_len = sentences
        .iter()
        .map(|s| s.split_whitespace().count())
        .sum::<usize>() as f64
        / sentences.len() as f64;
    let distinct: HashSet<String> = tokens.iter().map(|t| t.to_lowercase()).collect();
    let diversity = distinct.len() as f64 / tokens.len() as f64;

    ((avg_sentence_len / 20.0 + diversity) / 2.0).min(1.0)
}

/// Mean number of whitespace-separated words per sentence.
pub fn mean_sentence_length(segmenter: &dyn Segmenter, text: &str) -> f64 {
    let sentences = segmenter.sentences(text);
    if sentences.is_empty() {
        return 0.0;
    }
    sentences
        .iter()
        .map(|s| s.split_whitespace().count())
        .sum::<usize>() as f64
        / sentences.len() as f64
}

const STOPWORD_LIST: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "even",
    "every", "few", "for", "from", "further", "get", "gets", "had", "has", "have", "having", "he",
    "her", "here", "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into",
    "is", "it", "its", "itself", "just", "let", "like", "made", "make", "many", "may", "me",
    "might", "more", "most", "much", "must", "my", "myself", "no", "nor", "not", "now", "of",
    "off", "on", "once", "one", "only", "or", "other", "our", "ours", "ourselves", "out", "over",
    "own", "same", "say", "says", "shall", "she", "should", "so", "some", "such", "than", "that",
    "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this",
    "those", "through", "thus", "to", "too", "under", "until", "up", "upon", "us", "very", "was",
    "we", "were", "what", "when", "where", "which", "while", "who", "whom", "whose", "why",
    "will", "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves", "i'm", "it's", "don't", "doesn't", "can't", "won't", "isn't", "aren't",
    "that's", "there's", "let's", "you're", "we're", "they're", "one's", "ye", "thee", "thou",
    "thy", "unto",
];
