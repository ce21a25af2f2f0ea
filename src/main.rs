//! colloquy CLI - Synthetic dialogue generation from devotional and book corpora.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colloquy::{
    Config, Dialogue, GenerationPipeline, LlmClient, LlmParaphraser, NlpContext, RunStats,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "colloquy")]
#[command(author = "Infernet <dev@infernet.org>")]
#[command(version)]
#[command(about = "Synthetic multi-turn dialogue generation from devotional and book corpora")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate dialogues from the configured datasets
    Generate {
        /// Override the output path from the config
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the random seed from the config
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Re-run pastoral review over an existing dialogues file
    Review {
        /// Dialogues JSON file to review
        input: PathBuf,

        /// Where to write the reviewed dialogues (defaults to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_file(path).with_context(|| format!("Failed to load config from {path:?}"))
}

/// Shared NLP context, wired to the paraphrase endpoint when one is configured.
fn build_nlp(config: &Config) -> Result<NlpContext> {
    let nlp = NlpContext::new(config.generation.topic_diversity);
    let Some(paraphrase) = &config.paraphrase else {
        return Ok(nlp);
    };

    let client = LlmClient::new(paraphrase).context("Failed to create paraphrase client")?;
    info!(model = client.model(), url = %paraphrase.base_url, "Paraphrasing enabled");
    let paraphraser = LlmParaphraser::new(Arc::new(client), tokio::runtime::Handle::current());
    Ok(nlp.with_paraphraser(Arc::new(paraphraser)))
}

fn print_example_config() {
    let example = r#"# colloquy configuration file

[generation]
min_turns = 3
max_turns = 6
max_themes = 5
topic_diversity = 0.6
# "exact" (case-sensitive) or "word" (whole word, case-insensitive)
jargon_matching = "exact"
contradiction_threshold = -0.3
# seed = 42

[generation.persona_weights]
seeker = 0.4
student = 0.4
mature_believer = 0.2

[workers]
# size = 8  # defaults to available CPUs
batch_size = 100
item_timeout_secs = 60
# max_cache_entries = 50000

[checkpoint]
enabled = true
dir = "checkpoints"
interval = 50
keep_last = 3

[quality]
min_coherence = 0.65
# min_answer_relevance = 0.5
max_output = 10000

[index]
sample_per_dataset = 1000

[[datasets]]
kind = "devotional"
path = "data/devotionals.json"
sample_ratio = 1.0
max_items = 5000

[[datasets]]
kind = "book"
path = "data/books.json"
sample_ratio = 0.5
max_items = 5000

[output]
path = "output/dialogues.json"
backup_existing = true

# Optional OpenAI-compatible paraphrasing endpoint
# [paraphrase]
# base_url = "http://localhost:11434/v1"
# model = "llama3.1:8b"
# api_key_env = "PARAPHRASE_API_KEY"
# temperature = 0.7
# max_tokens = 256
# timeout_secs = 30
# max_retries = 3
"#;
    println!("{example}");
}

fn distribution<K: Ord>(keys: impl Iterator<Item = K>) -> BTreeMap<K, usize> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

fn print_summary(stats: &RunStats, dialogues: &[Dialogue], output: &Path) {
    println!("\n=== Dialogue Generation Complete ===");
    println!("Items:       {}", stats.items);
    println!("Resumed:     {}", stats.skipped_from_checkpoint);
    println!("Generated:   {}", stats.generated);
    println!("Dropped:     {}", stats.dropped);
    println!("Kept:        {}", stats.kept_after_quality_gate);
    println!("Selected:    {}", stats.selected);
    println!("Flagged:     {}", stats.flagged_for_review);
    println!("Diversity:   {:.3}", stats.diversity_score);
    println!("Runtime:     {:.1}s", stats.runtime_secs);
    println!("Output:      {output:?}");

    println!("\nPersonas:");
    for (persona, count) in distribution(dialogues.iter().map(|d| d.persona)) {
        println!("  {:<16} {count}", persona.as_str());
    }
    println!("Difficulty:");
    for (difficulty, count) in distribution(dialogues.iter().map(|d| d.difficulty_level)) {
        println!("  {:<16} {count}", difficulty.as_str());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Example => {
            print_example_config();
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;

            if let Some(paraphrase) = &config.paraphrase {
                paraphrase
                    .resolve_api_key()
                    .context("Failed to resolve paraphrase API key")?;
            }

            info!("Configuration is valid");
            info!(
                "  Turns: {}..={}, personas: {:?}",
                config.generation.min_turns,
                config.generation.max_turns,
                config.generation.persona_weights
            );
            info!(
                "  Workers: {} (batch size {})",
                config.workers.resolved_size(),
                config.workers.batch_size
            );
            for dataset in &config.datasets {
                if !dataset.path.exists() {
                    warn!(path = %dataset.path.display(), "Dataset file not found");
                }
                info!(
                    "  Dataset: {} {:?} (ratio {}, max {})",
                    dataset.kind, dataset.path, dataset.sample_ratio, dataset.max_items
                );
            }
            info!(
                "  Paraphrasing: {}",
                if config.paraphrase.is_some() { "enabled" } else { "disabled" }
            );
        }

        Commands::Generate { output, seed } => {
            let mut config = load_config(&cli.config)?;
            if let Some(output) = output {
                config.output.path = output;
            }
            if seed.is_some() {
                config.generation.seed = seed;
            }
            let output = config.output.path.clone();

            let nlp = build_nlp(&config)?;
            let pipeline = GenerationPipeline::new(config, nlp)?;
            let report = pipeline.run().await?;

            print_summary(&report.stats, &report.dialogues, &output);
        }

        Commands::Review { input, output } => {
            let config = load_config(&cli.config)?;
            let output = output.unwrap_or_else(|| input.clone());

            let nlp = NlpContext::new(config.generation.topic_diversity);
            let pipeline = GenerationPipeline::new(config, nlp)?;
            let summary = pipeline
                .review_file(&input, &output)
                .with_context(|| format!("Failed to review dialogues from {input:?}"))?;

            println!("\n=== Pastoral Review Complete ===");
            println!("Dialogues:   {}", summary.total);
            println!("Reviewed:    {}", summary.reviewed);
            println!("Flagged:     {}", summary.flagged);
            println!("Output:      {output:?}");
        }
    }

    Ok(())
}
