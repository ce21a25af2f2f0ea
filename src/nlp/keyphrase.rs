//! Keyphrase ("theme") extraction with maximal-marginal-relevance ranking.
//!
//! B_i: The primary extractor may fail → ThemeCache degrades to the first
//! noun-phrase-like spans of the text.

use super::embedding::{EmbeddingCache, cosine_similarity};
use super::segment::{is_stopword, tokenize};
use crate::models::{ColloquyError, Result};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// N-gram range used for every theme extraction.
pub const THEME_NGRAM_RANGE: (usize, usize) = (1, 3);

/// Candidate phrases scored per document, most frequent first.
const MAX_CANDIDATES: usize = 48;

/// Ranked keyphrase extraction.
pub trait KeyphraseExtractor: Send + Sync {
    /// Return up to `top_n` phrases of `ngram_range` words, best first.
    fn extract(
        &self,
        text: &str,
        ngram_range: (usize, usize),
        diversity: f64,
        top_n: usize,
    ) -> Result<Vec<String>>;
}

/// Embedding-based MMR keyphrase extractor.
pub struct MmrExtractor {
    embeddings: Arc<EmbeddingCache>,
}

impl MmrExtractor {
    pub fn new(embeddings: Arc<EmbeddingCache>) -> Self {
        Self { embeddings }
    }
}

impl KeyphraseExtractor for MmrExtractor {
    fn extract(
        &self,
        text: &str,
        ngram_range: (usize, usize),
        diversity: f64,
        top_n: usize,
    ) -> Result<Vec<String>> {
        let (min_n, max_n) = ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(ColloquyError::Extraction(format!(
                "invalid n-gram range {min_n}..={max_n}"
            )));
        }
        if top_n == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let candidates = candidate_phrases(text, min_n, max_n);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let doc = self.embeddings.get(text);
        let vectors: Vec<Arc<[f32]>> = candidates.iter().map(|c| self.embeddings.get(c)).collect();
        let doc_sim: Vec<f64> = vectors
            .iter()
            .map(|v| f64::from(cosine_similarity(v, &doc)))
            .collect();

        let mut selected: Vec<usize> = Vec::with_capacity(top_n);
        let mut remaining: Vec<usize> = (0..candidates.len()).collect();

        while selected.len() < top_n && !remaining.is_empty() {
            let mut best: Option<(usize, f64)> = None;
            for (pos, &idx) in remaining.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|&s| f64::from(cosine_similarity(&vectors[idx], &vectors[s])))
                    .fold(f64::NEG_INFINITY, f64::max);
                let score = if selected.is_empty() {
                    doc_sim[idx]
                } else {
                    (1.0 - diversity) * doc_sim[idx] - diversity * redundancy
                };
                if best.is_none_or(|(_, b)| score > b) {
                    best = Some((pos, score));
                }
            }
            let Some((pos, _)) = best else { break };
            selected.push(remaining.remove(pos));
        }

        Ok(selected.into_iter().map(|i| candidates[i].clone()).collect())
    }
}

/// Runs of consecutive content words, split at punctuation, original case.
fn content_runs(text: &str) -> Vec<Vec<&str>> {
    let mut runs = Vec::new();
    for segment in text.split(|c: char| {
        !(c.is_alphanumeric() || c.is_whitespace() || c == '\'' || c == '-')
    }) {
        let mut run: Vec<&str> = Vec::new();
        for token in tokenize(segment) {
            let numeric = token.chars().all(|c| c.is_ascii_digit());
            if is_stopword(token) || numeric || token.chars().count() < 2 {
                if !run.is_empty() {
                    runs.push(std::mem::take(&mut run));
                }
            } else {
                run.push(token);
            }
        }
        if !run.is_empty() {
            runs.push(run);
        }
    }
    runs
}

/// Distinct lowercase n-grams ranked by frequency, then first occurrence.
fn candidate_phrases(text: &str, min_n: usize, max_n: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut order = 0usize;

    for run in content_runs(text) {
        for n in min_n..=max_n {
            for window in run.windows(n) {
                let phrase = window.join(" ").to_lowercase();
                let entry = counts.entry(phrase).or_insert((0, order));
                entry.0 += 1;
                order += 1;
            }
        }
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
    ranked
        .into_iter()
        .take(MAX_CANDIDATES)
        .map(|(phrase, _)| phrase)
        .collect()
}

/// First `top_n` distinct noun-phrase-like spans (content-word runs, ≤3 words).
pub fn fallback_phrases(text: &str, top_n: usize) -> Vec<String> {
    let mut phrases: Vec<String> = Vec::new();
    for run in content_runs(text) {
        for chunk in run.chunks(3) {
            let phrase = chunk.join(" ");
            if !phrases.contains(&phrase) {
                phrases.push(phrase);
            }
            if phrases.len() >= top_n {
                return phrases;
            }
        }
    }
    phrases
}

/// Process-wide memo of extracted themes.
///
/// K_i: Keyed by content hash plus `top_n` and diversity, so different
/// requests over the same text never collide.
pub struct ThemeCache {
    extractor: Arc<dyn KeyphraseExtractor>,
    diversity: f64,
    entries: DashMap<String, Arc<[String]>>,
}

impl ThemeCache {
    pub fn new(extractor: Arc<dyn KeyphraseExtractor>, diversity: f64) -> Self {
        Self {
            extractor,
            diversity,
            entries: DashMap::new(),
        }
    }

    /// Up to `top_n` themes for `text`, best first.
    pub fn themes(&self, text: &str, top_n: usize) -> Arc<[String]> {
        let key = super::content_key(&[text, &top_n.to_string(), &self.diversity.to_string()]);
        self.entries
            .entry(key)
            .or_insert_with(|| {
                let themes = match self
                    .extractor
                    .extract(text, THEME_NGRAM_RANGE, self.diversity, top_n)
                {
                    Ok(themes) => themes,
                    Err(e) => {
                        tracing::debug!(error = %e, "Keyphrase extraction failed, using fallback");
                        fallback_phrases(text, top_n)
                    }
                };
                Arc::from(themes)
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::embedding::HashingEmbedder;

    struct FailingExtractor;

    impl KeyphraseExtractor for FailingExtractor {
        fn extract(&self, _: &str, _: (usize, usize), _: f64, _: usize) -> Result<Vec<String>> {
            Err(ColloquyError::Extraction("model unavailable".into()))
        }
    }

    fn extractor() -> MmrExtractor {
        MmrExtractor::new(Arc::new(EmbeddingCache::new(Arc::new(
            HashingEmbedder::default(),
        ))))
    }

    #[test]
    fn test_candidates_skip_stopwords_and_numbers() {
        let candidates = candidate_phrases("Romans 10:17 confirms this.", 1, 3);
        assert!(candidates.contains(&"romans".to_string()));
        assert!(candidates.contains(&"confirms".to_string()));
        assert!(!candidates.iter().any(|c| c.contains("17") || c.contains("this")));
    }

    #[test]
    fn test_candidates_do_not_cross_punctuation() {
        let candidates = candidate_phrases("Grace abounds. Mercy endures", 1, 3);
        assert!(candidates.contains(&"grace abounds".to_string()));
        assert!(!candidates.contains(&"abounds mercy".to_string()));
    }

    #[test]
    fn test_extract_returns_top_n_distinct_lowercase() {
        let text = "Faith comes by hearing, and hearing by the word of God. \
                    Faith grows as we hear the word of God daily.";
        let themes = extractor().extract(text, (1, 3), 0.6, 3).unwrap();

        assert_eq!(themes.len(), 3);
        assert!(themes.iter().all(|t| *t == t.to_lowercase()));
        let mut dedup = themes.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), themes.len());
    }

    #[test]
    fn test_extract_empty_text() {
        assert!(extractor().extract("   ", (1, 3), 0.5, 5).unwrap().is_empty());
        assert!(extractor().extract("the and of", (1, 3), 0.5, 5).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_range_is_an_error() {
        assert!(extractor().extract("grace", (2, 1), 0.5, 5).is_err());
    }

    #[test]
    fn test_theme_cache_falls_back_on_failure() {
        let cache = ThemeCache::new(Arc::new(FailingExtractor), 0.6);
        let themes = cache.themes("The Holy Spirit gives power to believers.", 2);
        assert_eq!(&*themes, &["Holy Spirit gives".to_string(), "power".to_string()]);
    }

    #[test]
    fn test_theme_cache_keys_include_top_n() {
        let cache = ThemeCache::new(Arc::new(extractor()), 0.6);
        let text = "Grace and mercy and peace from God our Father.";
        let three = cache.themes(text, 3);
        let one = cache.themes(text, 1);
        assert!(one.len() <= 1);
        assert!(three.len() >= one.len());
        assert_eq!(cache.len(), 2);
    }
}
