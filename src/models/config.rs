//! Configuration models for colloquy.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns at runtime via config file.

use super::{Persona, SourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration for colloquy.
///
/// I^R resolved: All configurable parameters are explicit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Dialogue generation settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub workers: WorkerConfig,

    /// Checkpointing for resumable runs
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Quality gate and diversity selection
    #[serde(default)]
    pub quality: QualityConfig,

    /// Scripture index construction
    #[serde(default)]
    pub index: IndexConfig,

    /// Source datasets, processed in order
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Optional paraphrasing endpoint (absent → pass-through)
    #[serde(default)]
    pub paraphrase: Option<ParaphraseConfig>,
}

/// How persona jargon simplification matches terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JargonMatching {
    /// Exact, case-sensitive substring replacement
    #[default]
    Exact,
    /// Whole-word, case-insensitive replacement
    Word,
}

/// Dialogue generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Minimum number of generated turns after the opening question
    #[serde(default = "default_min_turns")]
    pub min_turns: usize,

    /// Maximum number of generated turns after the opening question
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Themes extracted per source item
    #[serde(default = "default_max_themes")]
    pub max_themes: usize,

    /// MMR diversity coefficient for keyphrase ranking (0.0 - 1.0)
    #[serde(default = "default_topic_diversity")]
    pub topic_diversity: f64,

    /// Relative persona weights, keyed by persona name
    #[serde(default = "default_persona_weights")]
    pub persona_weights: BTreeMap<String, f64>,

    /// Jargon substitution mode for simple-vocabulary personas
    #[serde(default)]
    pub jargon_matching: JargonMatching,

    /// Cosine similarity below which two claims count as contradictory
    #[serde(default = "default_contradiction_threshold")]
    pub contradiction_threshold: f32,

    /// Seed for reproducible runs (unset → entropy)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_min_turns() -> usize {
    2
}

fn default_max_turns() -> usize {
    6
}

fn default_max_themes() -> usize {
    5
}

fn default_topic_diversity() -> f64 {
    0.6
}

fn default_persona_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("seeker".to_string(), 0.4),
        ("student".to_string(), 0.4),
        ("mature_believer".to_string(), 0.2),
    ])
}

fn default_contradiction_threshold() -> f32 {
    -0.3
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            min_turns: default_min_turns(),
            max_turns: default_max_turns(),
            max_themes: default_max_themes(),
            topic_diversity: default_topic_diversity(),
            persona_weights: default_persona_weights(),
            jargon_matching: JargonMatching::default(),
            contradiction_threshold: default_contradiction_threshold(),
            seed: None,
        }
    }
}

impl GenerationConfig {
    /// Parse persona weights into typed pairs.
    pub fn persona_weights(&self) -> Result<Vec<(Persona, f64)>, ConfigError> {
        self.persona_weights
            .iter()
            .map(|(name, weight)| {
                let persona = Persona::from_str(name)
                    .map_err(|_| ConfigError::Invalid(format!("unknown persona '{name}'")))?;
                Ok((persona, *weight))
            })
            .collect()
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers (unset → available parallelism minus one)
    #[serde(default)]
    pub size: Option<usize>,

    /// Items per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-item timeout in seconds
    #[serde(default = "default_item_timeout")]
    pub item_timeout_secs: u64,

    /// Clear theme/embedding caches between batches once they exceed this many entries
    #[serde(default)]
    pub max_cache_entries: Option<usize>,
}

fn default_batch_size() -> usize {
    100
}

fn default_item_timeout() -> u64 {
    60
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            size: None,
            batch_size: default_batch_size(),
            item_timeout_secs: default_item_timeout(),
            max_cache_entries: None,
        }
    }
}

impl WorkerConfig {
    /// Effective pool size.
    pub fn resolved_size(&self) -> usize {
        self.size.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        })
    }

    /// Per-item timeout.
    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }
}

/// Checkpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Whether snapshots are written at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory for snapshot files
    #[serde(default = "default_checkpoint_dir")]
    pub dir: PathBuf,

    /// Save a snapshot every N processed batches
    #[serde(default = "default_checkpoint_interval")]
    pub interval: usize,

    /// Number of most recent snapshots to retain
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
}

fn default_true() -> bool {
    true
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_checkpoint_interval() -> usize {
    50
}

fn default_keep_last() -> usize {
    3
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_checkpoint_dir(),
            interval: default_checkpoint_interval(),
            keep_last: default_keep_last(),
        }
    }
}

/// Quality gate and selection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Minimum overall coherence for a dialogue to be kept
    #[serde(default = "default_min_coherence")]
    pub min_coherence: f64,

    /// Optional minimum answer relevance
    #[serde(default)]
    pub min_answer_relevance: Option<f64>,

    /// Upper bound on the number of selected dialogues
    #[serde(default = "default_max_output")]
    pub max_output: usize,
}

fn default_min_coherence() -> f64 {
    0.65
}

fn default_max_output() -> usize {
    10_000
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_coherence: default_min_coherence(),
            min_answer_relevance: None,
            max_output: default_max_output(),
        }
    }
}

/// Scripture index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Leading items of each dataset scanned when building the index
    #[serde(default = "default_index_sample")]
    pub sample_per_dataset: usize,
}

fn default_index_sample() -> usize {
    1000
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            sample_per_dataset: default_index_sample(),
        }
    }
}

/// A source dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Kind of every item in the file
    pub kind: SourceKind,

    /// Path to a JSON array of source items
    pub path: PathBuf,

    /// Fraction of items to sample (1.0 → take leading items in order)
    #[serde(default = "default_sample_ratio")]
    pub sample_ratio: f64,

    /// Maximum number of items taken from this dataset
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

fn default_sample_ratio() -> f64 {
    1.0
}

fn default_max_items() -> usize {
    5000
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output file path
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    /// Rename an existing output file to a timestamped backup before writing
    #[serde(default = "default_true")]
    pub backup_existing: bool,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("output/dialogues.json")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            backup_existing: true,
        }
    }
}

/// OpenAI-compatible paraphrasing endpoint.
///
/// B_i: Endpoint may be unreachable → generation falls back to the original text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParaphraseConfig {
    /// Base URL for the API (e.g., "http://localhost:11434/v1")
    pub base_url: String,

    /// Model identifier as understood by the endpoint
    pub model: String,

    /// API key (may contain ${ENV_VAR})
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_paraphrase_temperature")]
    pub temperature: f64,

    /// Maximum tokens per paraphrase
    #[serde(default = "default_paraphrase_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_paraphrase_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_paraphrase_temperature() -> f64 {
    0.7
}

fn default_paraphrase_max_tokens() -> u32 {
    256
}

fn default_paraphrase_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl ParaphraseConfig {
    /// Resolve the API key from config or environment.
    ///
    /// No key configured is valid for local endpoints.
    pub fn resolve_api_key(&self) -> Result<Option<String>, ConfigError> {
        if let Some(key) = &self.api_key {
            return Ok(Some(expand_env_vars(key)));
        }

        match &self.api_key_env {
            Some(env_var) => std::env::var(env_var)
                .map(Some)
                .map_err(|_| ConfigError::MissingApiKey {
                    env_var: env_var.clone(),
                }),
            None => Ok(None),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;
        if generation.min_turns == 0 || generation.min_turns > generation.max_turns {
            return Err(ConfigError::Invalid(format!(
                "turn bounds must satisfy 1 <= min_turns <= max_turns (got {}..={})",
                generation.min_turns, generation.max_turns
            )));
        }
        if generation.max_themes == 0 {
            return Err(ConfigError::Invalid("max_themes must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&generation.topic_diversity) {
            return Err(ConfigError::Invalid(
                "topic_diversity must be within [0, 1]".into(),
            ));
        }

        let weights = generation.persona_weights()?;
        if weights.iter().any(|(_, w)| !w.is_finite() || *w < 0.0)
            || weights.iter().all(|(_, w)| *w == 0.0)
        {
            return Err(ConfigError::Invalid(
                "persona weights must be non-negative with at least one positive".into(),
            ));
        }

        if self.workers.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.checkpoint.interval == 0 {
            return Err(ConfigError::Invalid(
                "checkpoint interval must be at least 1".into(),
            ));
        }
        for (i, dataset) in self.datasets.iter().enumerate() {
            if self.datasets[..i]
                .iter()
                .any(|d| d.kind == dataset.kind && d.path == dataset.path)
            {
                return Err(ConfigError::Invalid(format!(
                    "dataset {:?} of kind {} is listed twice",
                    dataset.path, dataset.kind
                )));
            }
            if !(dataset.sample_ratio > 0.0 && dataset.sample_ratio <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "sample_ratio for {:?} must be within (0, 1]",
                    dataset.path
                )));
            }
        }

        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return result;
    };

    for cap in re.captures_iter(s) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Missing or inconsistent values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key for paraphrase endpoint: set {env_var} env var or api_key in config")]
    MissingApiKey { env_var: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [[datasets]]
            kind = "book"
            path = "data/book.json"
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.generation.min_turns, 2);
        assert_eq!(config.generation.max_turns, 6);
        assert_eq!(config.workers.batch_size, 100);
        assert_eq!(config.workers.item_timeout_secs, 60);
        assert_eq!(config.checkpoint.keep_last, 3);
        assert!((config.quality.min_coherence - 0.65).abs() < 1e-9);
        assert_eq!(config.datasets[0].kind, SourceKind::Book);
        assert!(config.paraphrase.is_none());
    }

    #[test]
    fn test_rhapsody_alias_for_devotional() {
        let config: Config = toml::from_str(
            r#"
            [[datasets]]
            kind = "rhapsody"
            path = "data/ror.json"
            sample_ratio = 0.3
            max_items = 10000
            "#,
        )
        .unwrap();
        assert_eq!(config.datasets[0].kind, SourceKind::Devotional);
    }

    #[test]
    fn test_invalid_turn_bounds_rejected() {
        let mut config = Config::default();
        config.generation.min_turns = 5;
        config.generation.max_turns = 3;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_same_kind_datasets_allowed_but_duplicates_rejected() {
        let toml_src = |second: &str| {
            format!(
                r#"
                [[datasets]]
                kind = "book"
                path = "data/a.json"

                [[datasets]]
                kind = "book"
                path = "{second}"
                "#
            )
        };

        let config: Config = toml::from_str(&toml_src("data/b.json")).unwrap();
        config.validate().unwrap();

        let config: Config = toml::from_str(&toml_src("data/a.json")).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_persona_rejected() {
        let mut config = Config::default();
        config
            .generation
            .persona_weights
            .insert("skeptic".to_string(), 1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_all_zero_weights_rejected() {
        let mut config = Config::default();
        config.generation.persona_weights =
            BTreeMap::from([("seeker".to_string(), 0.0), ("student".to_string(), 0.0)]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolved_pool_size_is_positive() {
        let workers = WorkerConfig::default();
        assert!(workers.resolved_size() >= 1);

        let fixed = WorkerConfig {
            size: Some(4),
            ..Default::default()
        };
        assert_eq!(fixed.resolved_size(), 4);
    }

    #[test]
    fn test_expand_env_vars_leaves_unknown_placeholder() {
        assert_eq!(
            expand_env_vars("Bearer ${COLLOQUY_SURELY_UNSET_VAR}"),
            "Bearer ${COLLOQUY_SURELY_UNSET_VAR}"
        );
    }
}
