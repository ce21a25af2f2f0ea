//! Text embeddings and the process-wide embedding cache.
//!
//! K_i: Vectors are fixed-length and L2-normalized (or all-zero for empty text).
//! B_i: Similarity between feature-hashed vectors approximates topical overlap.

use super::segment::tokenize;
use dashmap::DashMap;
use std::sync::Arc;

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 256;

/// Text → fixed-length semantic vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Signed feature-hashing embedder over word unigrams and character trigrams.
///
/// Signed buckets keep unrelated texts near zero similarity and allow
/// negative cosines.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let h = fnv1a(feature);
        let bucket = (h % self.dimension as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in tokenize(text) {
            let word = token.to_lowercase();
            self.add_feature(&mut vector, word.as_bytes(), 1.0);

            let padded: Vec<char> = format!("#{word}#").chars().collect();
            for trigram in padded.windows(3) {
                let gram: String = trigram.iter().collect();
                self.add_feature(&mut vector, gram.as_bytes(), 0.5);
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}

/// Cosine similarity; 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Content-addressed memo of embeddings, shared by all workers.
///
/// K_i: At most one embedding computation per distinct text per process.
pub struct EmbeddingCache {
    embedder: Arc<dyn Embedder>,
    entries: DashMap<String, Arc<[f32]>>,
}

impl EmbeddingCache {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: DashMap::new(),
        }
    }

    /// Embedding for `text`, computed on first request.
    pub fn get(&self, text: &str) -> Arc<[f32]> {
        let key = super::content_key(&[text]);
        // The entry guard holds the shard lock, so concurrent callers with the
        // same text wait for the first computation instead of repeating it.
        self.entries
            .entry(key)
            .or_insert_with(|| Arc::from(self.embedder.embed(text)))
            .clone()
    }

    /// Cosine similarity of two texts through the cache.
    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        cosine_similarity(&self.get(a), &self.get(b))
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn embed(&self, text: &str) -> Vec<f32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            vec![text.len() as f32, 1.0]
        }
    }

    #[test]
    fn test_embeddings_are_normalized() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed("Grace through faith");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_eq!(v.len(), DEFAULT_DIMENSION);
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(embedder.embed("").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_related_texts_score_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed("faith and hearing");
        let related = embedder.embed("Faith comes by hearing the word.");
        let unrelated = embedder.embed("Tithing records for the annual budget meeting.");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cache_computes_once_per_text() {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let cache = EmbeddingCache::new(embedder.clone());

        cache.get("grace");
        cache.get("grace");
        cache.get("faith");

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_is_shared_across_threads() {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(EmbeddingCache::new(embedder.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    cache.get("the same text");
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }
}
