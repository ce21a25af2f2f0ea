//! Dialogue generation pipeline.
//!
//! Pipeline flow:
//! Datasets → Scripture Index → Worker Pool (per batch) → Index Deltas merged
//! → Checkpoint → Post-processor → Diversity Selection → Pastoral Review → JSON

use crate::checkpoint::{Checkpoint, CheckpointManager, CheckpointMetadata, dataset_scope};
use crate::dialogue::DialogueChain;
use crate::index::Indices;
use crate::models::{
    ColloquyError, Config, DatasetConfig, Dialogue, Result, RunStats, SourceItem, SourceKind,
};
use crate::nlp::NlpContext;
use crate::pool::WorkerPool;
use crate::quality::{PastoralReviewer, PostProcessor};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Finished run: selected dialogues, statistics and the final indices.
#[derive(Debug)]
pub struct GenerationReport {
    pub dialogues: Vec<Dialogue>,
    pub stats: RunStats,
    pub indices: Indices,
}

/// Outcome of a standalone review pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewSummary {
    pub total: usize,
    /// Dialogues annotated in this pass
    pub reviewed: usize,
    pub flagged: usize,
}

/// Generation pipeline over every configured dataset.
pub struct GenerationPipeline {
    config: Config,
    nlp: NlpContext,
    pool: WorkerPool,
    post: PostProcessor,
}

impl GenerationPipeline {
    /// Create a new pipeline from configuration.
    pub fn new(config: Config, nlp: NlpContext) -> Result<Self> {
        let chain = DialogueChain::from_config(&config.generation)?;
        let pool = WorkerPool::new(
            Arc::new(chain),
            nlp.clone(),
            config.workers.resolved_size(),
            config.workers.item_timeout(),
            config.generation.seed,
        );
        let post = PostProcessor::new(&config.quality);

        Ok(Self {
            config,
            nlp,
            pool,
            post,
        })
    }

    /// Load a JSON array of source items.
    ///
    /// B_i(file readable and well-formed) → otherwise logged, zero items.
    pub fn load_dataset(path: &Path, kind: SourceKind) -> Vec<SourceItem> {
        let parsed = File::open(path)
            .map_err(|e| ColloquyError::io(format!("opening dataset {}", path.display()), e))
            .and_then(|file| {
                serde_json::from_reader::<_, Vec<SourceItem>>(BufReader::new(file))
                    .map_err(|e| ColloquyError::ParseError(format!("{}: {e}", path.display())))
            });

        match parsed {
            Ok(items) => {
                let mismatched = items.iter().filter(|i| i.kind != kind).count();
                if mismatched > 0 {
                    warn!(
                        path = %path.display(),
                        expected = %kind,
                        mismatched,
                        "Items declare a different type than their dataset"
                    );
                }
                info!(path = %path.display(), count = items.len(), "Loaded dataset");
                items
            }
            Err(e) => {
                warn!(error = %e, "Dataset unavailable, continuing with zero items");
                Vec::new()
            }
        }
    }

    /// Random sample without replacement below ratio 1.0, else the leading items.
    pub fn sample<R: rand::Rng + ?Sized>(
        items: &[SourceItem],
        dataset: &DatasetConfig,
        rng: &mut R,
    ) -> Vec<SourceItem> {
        if dataset.sample_ratio < 1.0 {
            let size = ((items.len() as f64 * dataset.sample_ratio) as usize).min(dataset.max_items);
            items.choose_multiple(rng, size).cloned().collect()
        } else {
            items.iter().take(dataset.max_items).cloned().collect()
        }
    }

    /// Scripture index over the leading items of every dataset.
    pub fn build_index(&self, corpora: &[Vec<SourceItem>]) -> Indices {
        let per_dataset = self.config.index.sample_per_dataset;
        let total: usize = corpora.iter().map(|c| c.len().min(per_dataset)).sum();
        let pb = progress_bar(total as u64);
        pb.set_message("indexing scripture");

        let mut indices = Indices::default();
        for item in corpora.iter().flat_map(|c| c.iter().take(per_dataset)) {
            indices.index_item(item, &self.nlp);
            pb.inc(1);
        }
        pb.finish_with_message(format!("{} references", indices.scripture.len()));

        info!(
            references = indices.scripture.len(),
            items = total,
            "Built scripture index"
        );
        indices
    }

    /// Generate, post-process, select, review and save.
    pub async fn run(&self) -> Result<GenerationReport> {
        let start = Instant::now();
        let mut stats = RunStats::default();
        let mut rng = match self.config.generation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let corpora: Vec<Vec<SourceItem>> = self
            .config
            .datasets
            .iter()
            .map(|d| Self::load_dataset(&d.path, d.kind))
            .collect();
        let mut indices = Arc::new(self.build_index(&corpora));

        info!(
            datasets = self.config.datasets.len(),
            workers = self.pool.pool_size(),
            batch_size = self.config.workers.batch_size,
            "Starting generation pipeline"
        );

        let mut all = Vec::new();
        for (dataset, corpus) in self.config.datasets.iter().zip(&corpora) {
            let items = Self::sample(corpus, dataset, &mut rng);
            stats.items += items.len();
            let dialogues = self
                .process_dataset(dataset, items, &mut indices, &mut stats)
                .await?;
            all.extend(dialogues);
        }
        stats.generated = all.len();

        let indices = Arc::unwrap_or_clone(indices);
        let dialogues = self.finalize(all, &indices, &mut stats);
        Self::save_dialogues(
            &self.config.output.path,
            &dialogues,
            self.config.output.backup_existing,
        )?;

        stats.runtime_secs = start.elapsed().as_secs_f64();
        info!(
            items = stats.items,
            generated = stats.generated,
            dropped = stats.dropped,
            selected = stats.selected,
            flagged = stats.flagged_for_review,
            diversity = format!("{:.3}", stats.diversity_score),
            runtime = format!("{:.1}s", stats.runtime_secs),
            "Generation pipeline complete"
        );

        Ok(GenerationReport {
            dialogues,
            stats,
            indices,
        })
    }

    /// Run every batch of one dataset, resuming from its latest snapshot.
    async fn process_dataset(
        &self,
        dataset: &DatasetConfig,
        items: Vec<SourceItem>,
        indices: &mut Arc<Indices>,
        stats: &mut RunStats,
    ) -> Result<Vec<Dialogue>> {
        let checkpoints = if self.config.checkpoint.enabled {
            Some(CheckpointManager::new(
                &self.config.checkpoint.dir,
                self.config.checkpoint.keep_last,
            )?)
        } else {
            None
        };

        let kind = dataset.kind;
        let scope = dataset_scope(kind, &dataset.path);
        let mut dialogues = Vec::new();
        let mut metadata = CheckpointMetadata {
            kind,
            scope: scope.clone(),
            ..Default::default()
        };
        if let Some(checkpoint) = checkpoints.as_ref().and_then(|m| m.load_latest(&scope)) {
            *indices = Arc::new(checkpoint.indices());
            dialogues = checkpoint.data;
            metadata = checkpoint.metadata;
        }

        info!(kind = %kind, items = items.len(), resumed = dialogues.len(), "Processing dataset");

        let pb = progress_bar(items.len() as u64);
        pb.set_message(kind.to_string());

        let batch_size = self.config.workers.batch_size;
        let total_batches = items.len().div_ceil(batch_size);
        let mut dirty = false;

        for (batch_idx, batch) in items.chunks(batch_size).enumerate() {
            let pending: Vec<SourceItem> = batch
                .iter()
                .filter(|item| !metadata.processed.contains(&item.content_hash()))
                .cloned()
                .collect();
            stats.skipped_from_checkpoint += batch.len() - pending.len();
            pb.inc((batch.len() - pending.len()) as u64);

            if pending.is_empty() {
                continue;
            }
            let attempted = pending.len();

            let outcome = self.pool.generate_batch(pending, Arc::clone(indices)).await;
            let merged = Arc::make_mut(indices);
            for output in outcome.outputs {
                merged.merge(output.delta);
                dialogues.push(output.dialogue);
            }
            metadata.processed.extend(outcome.processed);
            metadata.dropped += outcome.dropped;
            metadata.batches_completed = batch_idx + 1;
            stats.dropped += outcome.dropped;
            dirty = true;

            pb.inc(attempted as u64);
            pb.set_message(format!("{kind}: {} dialogues", dialogues.len()));
            debug!(batch = batch_idx + 1, total_batches, "Batch complete");

            if let Some(manager) = &checkpoints {
                if (batch_idx + 1) % self.config.checkpoint.interval == 0 {
                    manager.save(&Checkpoint::new(dialogues.clone(), indices, metadata.clone()))?;
                    dirty = false;
                }
            }

            self.trim_caches();
        }

        if let Some(manager) = &checkpoints {
            if dirty {
                manager.save(&Checkpoint::new(dialogues.clone(), indices, metadata.clone()))?;
            }
        }

        pb.finish_with_message(format!("{kind}: {} dialogues", dialogues.len()));
        Ok(dialogues)
    }

    /// Clear theme/embedding caches once they pass the configured bound.
    fn trim_caches(&self) {
        if let Some(max) = self.config.workers.max_cache_entries {
            let entries = self.nlp.cache_entries();
            if entries > max {
                self.nlp.clear_caches();
                debug!(entries, max, "Cleared language caches");
            }
        }
    }

    /// Quality gate, diversity selection and pastoral review.
    pub fn finalize(
        &self,
        dialogues: Vec<Dialogue>,
        indices: &Indices,
        stats: &mut RunStats,
    ) -> Vec<Dialogue> {
        let kept = self.post.process(dialogues, &self.nlp);
        stats.kept_after_quality_gate = kept.len();

        let selection = self.post.select_diverse(kept);
        stats.selected = selection.dialogues.len();
        stats.diversity_score = selection.diversity_score;
        info!(
            selected = selection.dialogues.len(),
            themes = selection.themes_represented,
            diversity = format!("{:.3}", selection.diversity_score),
            "Diversity selection complete"
        );

        let mut dialogues = selection.dialogues;
        PastoralReviewer::new(&self.nlp, indices).review_all(&mut dialogues);
        stats.flagged_for_review = count_flagged(&dialogues);
        dialogues
    }

    /// Indices matching what a finished run verified against.
    ///
    /// The newest snapshot of the last dataset that has one carries the
    /// indexing pass plus every merged delta; without snapshots the
    /// indexing pass is rebuilt from the datasets.
    pub fn review_indices(&self) -> Result<Indices> {
        if self.config.checkpoint.enabled {
            let manager =
                CheckpointManager::new(&self.config.checkpoint.dir, self.config.checkpoint.keep_last)?;
            let snapshot = self
                .config
                .datasets
                .iter()
                .rev()
                .find_map(|d| manager.load_latest(&dataset_scope(d.kind, &d.path)));
            if let Some(checkpoint) = snapshot {
                return Ok(checkpoint.indices());
            }
        }

        warn!("No checkpoint found, reviewing against a fresh scripture index");
        let corpora: Vec<Vec<SourceItem>> = self
            .config
            .datasets
            .iter()
            .map(|d| Self::load_dataset(&d.path, d.kind))
            .collect();
        Ok(self.build_index(&corpora))
    }

    /// Annotate an existing output file with pastoral review.
    ///
    /// Additive: dialogues that already carry a review are left untouched.
    pub fn review_file(&self, input: &Path, output: &Path) -> Result<ReviewSummary> {
        let mut dialogues = Self::load_dialogues(input)?;
        let indices = self.review_indices()?;

        let reviewed = PastoralReviewer::new(&self.nlp, &indices).review_all(&mut dialogues);
        Self::save_dialogues(output, &dialogues, self.config.output.backup_existing)?;

        let summary = ReviewSummary {
            total: dialogues.len(),
            reviewed,
            flagged: count_flagged(&dialogues),
        };
        info!(
            total = summary.total,
            reviewed = summary.reviewed,
            flagged = summary.flagged,
            "Pastoral review complete"
        );
        Ok(summary)
    }

    /// Load a previously written output file.
    pub fn load_dialogues(path: &Path) -> Result<Vec<Dialogue>> {
        let file = File::open(path).map_err(|e| ColloquyError::io("opening dialogues file", e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ColloquyError::ParseError(format!("{}: {e}", path.display())))
    }

    /// Write dialogues as pretty JSON, moving an existing file aside first.
    ///
    /// Returns the backup path when one was made.
    pub fn save_dialogues(
        path: &Path,
        dialogues: &[Dialogue],
        backup_existing: bool,
    ) -> Result<Option<PathBuf>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ColloquyError::io("creating output dir", e))?;
        }

        let backup = if backup_existing && path.exists() {
            let backup = backup_path(path);
            fs::rename(path, &backup).map_err(|e| ColloquyError::io("backing up output", e))?;
            info!(backup = %backup.display(), "Backed up existing output");
            Some(backup)
        } else {
            None
        };

        let file = File::create(path).map_err(|e| ColloquyError::io("creating output file", e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), dialogues)
            .map_err(|e| ColloquyError::Internal(format!("Serializing dialogues: {e}")))?;

        info!(count = dialogues.len(), path = %path.display(), "Saved dialogues");
        Ok(backup)
    }
}

/// Dialogues whose review asks for a human.
pub fn count_flagged(dialogues: &[Dialogue]) -> usize {
    dialogues
        .iter()
        .filter(|d| d.pastoral_review.as_ref().is_some_and(|r| r.needs_review))
        .count()
}

/// `<stem>_backup_<timestamp>.<ext>` next to the original.
fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map_or_else(|| "output".into(), |s| s.to_string_lossy());
    let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
    let name = match path.extension() {
        Some(ext) => format!("{stem}_backup_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_backup_{stamp}"),
    };
    path.with_file_name(name)
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-"),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckpointConfig, OutputConfig, QualityConfig, WorkerConfig};
    use tempfile::TempDir;

    const CORPUS: &str = r#"[
        {"content": "Faith comes by hearing. Romans 10:17 confirms this truth for every believer.",
         "type": "book", "reference": {"book_name": "The Word", "chapter": 1}},
        {"content": "Grace is the unmerited favor of God. It empowers the believer to live right.",
         "type": "book", "reference": {"book_name": "The Word", "chapter": 2}},
        {"content": "Prayer changes things. Pray without ceasing, as 1 Thessalonians 5:17 teaches.",
         "type": "book", "reference": {"book_name": "The Word", "chapter": 3}}
    ]"#;

    fn config(dir: &Path) -> Config {
        let dataset = dir.join("book.json");
        fs::write(&dataset, CORPUS).unwrap();

        let mut config = Config {
            workers: WorkerConfig {
                size: Some(2),
                batch_size: 2,
                ..Default::default()
            },
            checkpoint: CheckpointConfig {
                dir: dir.join("checkpoints"),
                interval: 1,
                ..Default::default()
            },
            quality: QualityConfig {
                min_coherence: 0.0,
                ..Default::default()
            },
            output: OutputConfig {
                path: dir.join("out").join("dialogues.json"),
                backup_existing: true,
            },
            ..Default::default()
        };
        config.generation.seed = Some(11);
        config.datasets.push(DatasetConfig {
            kind: SourceKind::Book,
            path: dataset,
            sample_ratio: 1.0,
            max_items: 10,
        });
        config
    }

    #[tokio::test]
    async fn test_end_to_end_and_resume() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());

        let pipeline = GenerationPipeline::new(config.clone(), NlpContext::new(0.6)).unwrap();
        let report = pipeline.run().await.unwrap();
        assert_eq!(report.stats.items, 3);
        assert_eq!(report.stats.generated, 3);
        assert_eq!(report.dialogues.len(), 3);
        assert!(report.indices.contains_scripture("Romans 10:17"));
        for d in &report.dialogues {
            assert!(d.roles_alternate());
            assert!(d.metadata.is_some());
            assert!(d.pastoral_review.is_some());
        }

        let saved = GenerationPipeline::load_dialogues(&config.output.path).unwrap();
        assert_eq!(saved.len(), 3);

        // Second run resumes from the final snapshot and regenerates nothing.
        let pipeline = GenerationPipeline::new(config.clone(), NlpContext::new(0.6)).unwrap();
        let report = pipeline.run().await.unwrap();
        assert_eq!(report.stats.skipped_from_checkpoint, 3);
        assert_eq!(report.stats.generated, 3);

        let backups = fs::read_dir(dir.path().join("out"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("_backup_"))
            .count();
        assert_eq!(backups, 1);
    }

    #[tokio::test]
    async fn test_same_kind_datasets_do_not_share_snapshots() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        let second = dir.path().join("book_two.json");
        fs::write(
            &second,
            r#"[
                {"content": "Love is patient and kind. 1 Corinthians 13:4 describes it.",
                 "type": "book", "reference": {"book_name": "Second Book", "chapter": 1}},
                {"content": "Hope anchors the soul. Hebrews 6:19 calls it sure and steadfast.",
                 "type": "book", "reference": {"book_name": "Second Book", "chapter": 2}}
            ]"#,
        )
        .unwrap();
        config.datasets.push(DatasetConfig {
            kind: SourceKind::Book,
            path: second,
            sample_ratio: 1.0,
            max_items: 10,
        });

        let pipeline = GenerationPipeline::new(config, NlpContext::new(0.6)).unwrap();
        let report = pipeline.run().await.unwrap();
        assert_eq!(report.stats.items, 5);
        assert_eq!(report.stats.skipped_from_checkpoint, 0);
        assert_eq!(report.stats.generated, 5);

        let ids: std::collections::HashSet<_> =
            report.dialogues.iter().map(|d| d.dialogue_id.as_str()).collect();
        assert_eq!(ids.len(), report.dialogues.len());
    }

    #[tokio::test]
    async fn test_review_file_is_additive_and_uses_run_indices() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        // Every scripture usage then comes from deltas merged during the run.
        config.index.sample_per_dataset = 0;

        let pipeline = GenerationPipeline::new(config.clone(), NlpContext::new(0.6)).unwrap();
        pipeline.run().await.unwrap();
        let generated = GenerationPipeline::load_dialogues(&config.output.path).unwrap();

        let reviews = |dialogues: &[Dialogue]| {
            dialogues
                .iter()
                .map(|d| (d.dialogue_id.clone(), d.pastoral_review.clone()))
                .collect::<Vec<_>>()
        };
        let expected = reviews(&generated);
        assert!(expected.iter().all(|(_, r)| r.is_some()));

        let reviewer = GenerationPipeline::new(config.clone(), NlpContext::new(0.6)).unwrap();
        let reviewed_path = dir.path().join("reviewed.json");
        let summary = reviewer.review_file(&config.output.path, &reviewed_path).unwrap();
        assert_eq!(summary.reviewed, 0);
        let after = GenerationPipeline::load_dialogues(&reviewed_path).unwrap();
        assert_eq!(reviews(&after), expected);

        // A dialogue missing its annotation gets the same one it had at generation time.
        let mut stripped = generated.clone();
        stripped[0].pastoral_review = None;
        let stripped_path = dir.path().join("stripped.json");
        GenerationPipeline::save_dialogues(&stripped_path, &stripped, false).unwrap();

        let summary = reviewer.review_file(&stripped_path, &reviewed_path).unwrap();
        assert_eq!(summary.reviewed, 1);
        assert_eq!(summary.total, generated.len());
        let after = GenerationPipeline::load_dialogues(&reviewed_path).unwrap();
        assert_eq!(reviews(&after), expected);
    }

    #[tokio::test]
    async fn test_missing_dataset_yields_zero_items() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.datasets[0].path = dir.path().join("absent.json");
        config.checkpoint.enabled = false;

        let pipeline = GenerationPipeline::new(config, NlpContext::new(0.6)).unwrap();
        let report = pipeline.run().await.unwrap();
        assert_eq!(report.stats.items, 0);
        assert!(report.dialogues.is_empty());
    }

    #[test]
    fn test_sampling_respects_ratio_and_cap() {
        let items: Vec<SourceItem> = (0..20)
            .map(|i| SourceItem::new(SourceKind::Devotional, format!("Item {i}")))
            .collect();
        let mut rng = StdRng::seed_from_u64(3);
        let dataset = |ratio: f64, max: usize| DatasetConfig {
            kind: SourceKind::Devotional,
            path: PathBuf::new(),
            sample_ratio: ratio,
            max_items: max,
        };

        assert_eq!(GenerationPipeline::sample(&items, &dataset(0.5, 100), &mut rng).len(), 10);
        assert_eq!(GenerationPipeline::sample(&items, &dataset(0.5, 4), &mut rng).len(), 4);

        let leading = GenerationPipeline::sample(&items, &dataset(1.0, 3), &mut rng);
        assert_eq!(leading[2].content, "Item 2");
    }

    #[test]
    fn test_backup_path_keeps_extension() {
        let backup = backup_path(Path::new("out/dialogues.json"));
        let name = backup.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("dialogues_backup_"));
        assert!(name.ends_with(".json"));
    }
}
