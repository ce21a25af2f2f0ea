//! Language collaborators: segmentation, embeddings, keyphrases, paraphrasing.
//!
//! Each collaborator sits behind a trait with an in-crate default, and the
//! two caches are process-wide and shared by every worker.

mod embedding;
mod keyphrase;
mod paraphrase;
mod segment;

pub use embedding::*;
pub use keyphrase::*;
pub use paraphrase::*;
pub use segment::*;

use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Hex SHA-256 over `parts` joined with a unit separator.
pub fn content_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Shared language toolkit handed to every worker.
#[derive(Clone)]
pub struct NlpContext {
    pub embeddings: Arc<EmbeddingCache>,
    pub themes: Arc<ThemeCache>,
    pub segmenter: Arc<dyn Segmenter>,
    pub paraphraser: Option<Arc<dyn Paraphraser>>,
}

impl NlpContext {
    /// Default collaborators: hashing embedder, MMR extractor, rule segmenter.
    pub fn new(topic_diversity: f64) -> Self {
        let embeddings = Arc::new(EmbeddingCache::new(Arc::new(HashingEmbedder::default())));
        let extractor = Arc::new(MmrExtractor::new(embeddings.clone()));
        Self {
            themes: Arc::new(ThemeCache::new(extractor, topic_diversity)),
            embeddings,
            segmenter: Arc::new(RuleSegmenter::new()),
            paraphraser: None,
        }
    }

    pub fn with_paraphraser(mut self, paraphraser: Arc<dyn Paraphraser>) -> Self {
        self.paraphraser = Some(paraphraser);
        self
    }

    /// Themes for `text` as owned strings.
    pub fn themes(&self, text: &str, top_n: usize) -> Vec<String> {
        self.themes.themes(text, top_n).to_vec()
    }

    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        self.embeddings.similarity(a, b)
    }

    pub fn paraphrase(&self, text: &str) -> String {
        paraphrase_or_original(self.paraphraser.as_deref(), text)
    }

    /// Total entries across both caches.
    pub fn cache_entries(&self) -> usize {
        self.embeddings.len() + self.themes.len()
    }

    pub fn clear_caches(&self) {
        self.embeddings.clear();
        self.themes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_separates_parts() {
        assert_ne!(content_key(&["ab", "c"]), content_key(&["a", "bc"]));
        assert_eq!(content_key(&["grace"]).len(), 64);
    }

    #[test]
    fn test_context_caches_grow_and_clear() {
        let nlp = NlpContext::new(0.6);
        let themes = nlp.themes("Grace and peace be multiplied to you.", 3);
        assert!(!themes.is_empty());
        assert!(nlp.cache_entries() > 0);

        nlp.clear_caches();
        assert_eq!(nlp.cache_entries(), 0);
    }
}
