//! Worker pool for dialogue generation.
//!
//! Epistemic foundation:
//! - K_i: Each item runs the synchronous chain on a blocking thread
//! - K_i: At most `pool_size` items run at once (semaphore permits)
//! - B_i: Each item may fail → logged and dropped, never aborts the batch
//! - I^B: A stuck item is bounded by the per-item timeout; its thread is
//!   abandoned and the result discarded

use crate::dialogue::{ChainOutput, DialogueChain};
use crate::index::Indices;
use crate::models::{ColloquyError, Result, SourceItem};
use crate::nlp::NlpContext;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Results of one batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Successful items, in completion order
    pub outputs: Vec<ChainOutput>,
    /// Content hashes of every attempted item (successful or dropped)
    pub processed: Vec<String>,
    /// Items that failed or timed out
    pub dropped: usize,
}

/// Fixed-size pool running the dialogue chain per item.
///
/// Cloning is cheap and shares the semaphore.
#[derive(Clone)]
pub struct WorkerPool {
    chain: Arc<DialogueChain>,
    nlp: NlpContext,
    pool_size: usize,
    semaphore: Arc<Semaphore>,
    item_timeout: Duration,
    seed: Option<u64>,
}

impl WorkerPool {
    pub fn new(
        chain: Arc<DialogueChain>,
        nlp: NlpContext,
        pool_size: usize,
        item_timeout: Duration,
        seed: Option<u64>,
    ) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            chain,
            nlp,
            pool_size,
            semaphore: Arc::new(Semaphore::new(pool_size)),
            item_timeout,
            seed,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Generate one dialogue against a snapshot of the indices.
    ///
    /// B_i(item yields a dialogue) → Result<ChainOutput>
    pub async fn generate(&self, item: SourceItem, indices: Arc<Indices>) -> Result<ChainOutput> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ColloquyError::Internal("Semaphore closed".to_string()))?;

        let chain = Arc::clone(&self.chain);
        let nlp = self.nlp.clone();
        let mut rng = item_rng(self.seed, &item.content_hash());

        let handle = tokio::task::spawn_blocking(move || {
            // Held until the chain finishes, even when the caller stops waiting.
            let _permit = permit;
            chain.run(&item, &nlp, &indices, &mut rng)
        });

        bounded(handle, self.item_timeout).await
    }

    /// Generate dialogues for a batch in parallel.
    pub async fn generate_batch(
        &self,
        items: Vec<SourceItem>,
        indices: Arc<Indices>,
    ) -> BatchOutcome {
        let mut handles = Vec::with_capacity(items.len());
        let mut outcome = BatchOutcome::default();

        for item in items {
            let hash = item.content_hash();
            outcome.processed.push(hash.clone());
            let pool = self.clone();
            let indices = Arc::clone(&indices);
            let handle = tokio::spawn(async move { (hash, pool.generate(item, indices).await) });
            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok((_, Ok(output))) => outcome.outputs.push(output),
                Ok((hash, Err(e))) => {
                    let item = hash.get(..12).unwrap_or(&hash);
                    if e.is_item_local() {
                        warn!(item, error = %e, "Item dropped");
                    } else {
                        error!(item, error = %e, "Item dropped on unexpected failure");
                    }
                    outcome.dropped += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Task panicked");
                    outcome.dropped += 1;
                }
            }
        }

        outcome
    }
}

/// Await a blocking task, giving up after `limit`.
pub async fn bounded<T>(handle: JoinHandle<Result<T>>, limit: Duration) -> Result<T> {
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(ColloquyError::TaskFailed(join_error.to_string())),
        Err(_) => Err(ColloquyError::Timeout(limit)),
    }
}

/// Per-item random source: reproducible under a seed, entropy otherwise.
pub fn item_rng(seed: Option<u64>, content_hash: &str) -> StdRng {
    match seed {
        Some(seed) => {
            let prefix = content_hash.get(..16).unwrap_or("0");
            let mix = u64::from_str_radix(prefix, 16).unwrap_or(0);
            StdRng::seed_from_u64(seed ^ mix)
        }
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenerationConfig, SourceKind};
    use rand::Rng;

    fn pool(timeout: Duration, seed: Option<u64>) -> WorkerPool {
        let chain = DialogueChain::from_config(&GenerationConfig::default()).unwrap();
        WorkerPool::new(Arc::new(chain), NlpContext::new(0.6), 2, timeout, seed)
    }

    #[tokio::test]
    async fn test_batch_drops_failures_and_keeps_going() {
        let pool = pool(Duration::from_secs(60), Some(7));
        let items = vec![
            SourceItem::new(SourceKind::Book, "Grace reigns through righteousness."),
            SourceItem::new(SourceKind::Book, "   "),
            SourceItem::new(SourceKind::Devotional, "Prayer builds the inner man."),
        ];

        let outcome = pool.generate_batch(items, Arc::new(Indices::default())).await;
        assert_eq!(outcome.outputs.len(), 2);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.processed.len(), 3);
        for out in &outcome.outputs {
            assert!(out.dialogue.roles_alternate());
        }
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let handle = tokio::task::spawn_blocking(|| {
            std::thread::sleep(Duration::from_millis(300));
            Ok::<_, ColloquyError>(1)
        });
        let err = bounded(handle, Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, ColloquyError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let handle = tokio::task::spawn_blocking(|| Ok::<_, ColloquyError>(5));
        assert_eq!(bounded(handle, Duration::from_secs(5)).await.unwrap(), 5);
    }

    #[test]
    fn test_item_rng_is_reproducible_under_seed() {
        let hash = "00ff00ff00ff00ff00ff";
        let a: u64 = item_rng(Some(42), hash).r#gen();
        let b: u64 = item_rng(Some(42), hash).r#gen();
        let c: u64 = item_rng(Some(43), hash).r#gen();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
