//! Checkpoint snapshots for resumable generation.
//!
//! Epistemic foundation:
//! - K_i: A snapshot holds every dialogue so far, both indices and the
//!   hashes of processed items
//! - K_i: Snapshots are persisted atomically (write-then-rename)
//! - B_i: The newest snapshot may be missing, corrupt or from another schema
//!   version → `None`, never an error
//! - I^R: Retention (`keep_last`) is configurable

use crate::index::{Indices, ScriptureEntry, TopicEntry};
use crate::models::{ColloquyError, Dialogue, Result, SourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Schema version written into every snapshot.
pub const CHECKPOINT_VERSION: &str = "2.1";

/// Snapshot scope of one configured dataset: `{kind}_{path hash}`.
///
/// K_i: Two datasets of the same kind never share snapshots.
pub fn dataset_scope(kind: SourceKind, path: &Path) -> String {
    let digest = Sha256::digest(format!("{kind}\u{1f}{}", path.display()).as_bytes());
    format!("{kind}_{}", &hex::encode(digest)[..12])
}

/// Progress bookkeeping stored alongside the data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Dataset kind the snapshot belongs to
    pub kind: SourceKind,
    /// Dataset scope, see [`dataset_scope`]
    pub scope: String,
    /// Content hashes of every attempted item
    pub processed: BTreeSet<String>,
    /// Batches completed when the snapshot was taken
    #[serde(default)]
    pub batches_completed: usize,
    /// Items dropped so far
    #[serde(default)]
    pub dropped: usize,
}

/// A full snapshot of a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub data: Vec<Dialogue>,
    pub metadata: CheckpointMetadata,
    pub timestamp: DateTime<Utc>,
    pub topic_index: BTreeMap<String, Vec<TopicEntry>>,
    pub scripture_index: BTreeMap<String, Vec<ScriptureEntry>>,
    pub version: String,
}

impl Checkpoint {
    pub fn new(data: Vec<Dialogue>, indices: &Indices, metadata: CheckpointMetadata) -> Self {
        Self {
            data,
            metadata,
            timestamp: Utc::now(),
            topic_index: indices.topic.clone(),
            scripture_index: indices.scripture.clone(),
            version: CHECKPOINT_VERSION.to_string(),
        }
    }

    /// The indices captured in this snapshot.
    pub fn indices(&self) -> Indices {
        Indices {
            scripture: self.scripture_index.clone(),
            topic: self.topic_index.clone(),
        }
    }

    pub fn is_processed(&self, content_hash: &str) -> bool {
        self.metadata.processed.contains(content_hash)
    }
}

/// Writes, finds and prunes snapshots in one directory.
pub struct CheckpointManager {
    /// Directory for checkpoint files
    dir: PathBuf,
    /// Snapshots retained per dataset scope
    keep_last: usize,
}

impl CheckpointManager {
    /// Create a new checkpoint manager.
    pub fn new(dir: &Path, keep_last: usize) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| ColloquyError::io("creating checkpoint dir", e))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            keep_last: keep_last.max(1),
        })
    }

    /// Persist a snapshot atomically, then prune old ones of the same scope.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<PathBuf> {
        let scope = &checkpoint.metadata.scope;
        if scope.is_empty() {
            return Err(ColloquyError::Internal("Checkpoint without dataset scope".into()));
        }
        let name = format!(
            "checkpoint_{}_{}.json",
            scope,
            checkpoint.timestamp.format("%Y%m%d_%H%M%S_%6f")
        );
        let path = self.dir.join(&name);

        // Write to temp file
        let temp_path = self.dir.join(format!("{name}.tmp"));
        let file = File::create(&temp_path)
            .map_err(|e| ColloquyError::io("creating temp checkpoint", e))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, checkpoint)
            .map_err(|e| ColloquyError::Internal(format!("Serializing checkpoint: {e}")))?;

        // Atomic rename
        fs::rename(&temp_path, &path).map_err(|e| ColloquyError::io("renaming checkpoint", e))?;

        info!(
            path = %path.display(),
            dialogues = checkpoint.data.len(),
            processed = checkpoint.metadata.processed.len(),
            "Checkpoint saved"
        );

        self.prune(scope)?;
        Ok(path)
    }

    /// Snapshot files for a scope, oldest first.
    pub fn list(&self, scope: &str) -> Vec<PathBuf> {
        let pattern = self.dir.join(format!("checkpoint_{scope}_*.json"));
        let Some(pattern) = pattern.to_str() else {
            return Vec::new();
        };

        let mut paths: Vec<PathBuf> = match glob::glob(pattern) {
            Ok(entries) => entries.filter_map(|e| e.ok()).collect(),
            Err(e) => {
                warn!(error = %e, "Invalid checkpoint pattern");
                return Vec::new();
            }
        };
        // Timestamped names sort chronologically.
        paths.sort();
        paths
    }

    /// Most recent snapshot for `scope`, if one exists and is readable.
    pub fn load_latest(&self, scope: &str) -> Option<Checkpoint> {
        let path = self.list(scope).pop()?;

        let checkpoint: Checkpoint = match File::open(&path)
            .map_err(|e| e.to_string())
            .and_then(|f| serde_json::from_reader(BufReader::new(f)).map_err(|e| e.to_string()))
        {
            Ok(c) => c,
            Err(error) => {
                warn!(path = %path.display(), %error, "Ignoring unreadable checkpoint");
                return None;
            }
        };

        if checkpoint.version != CHECKPOINT_VERSION {
            warn!(
                path = %path.display(),
                found = %checkpoint.version,
                expected = CHECKPOINT_VERSION,
                "Ignoring checkpoint with another schema version"
            );
            return None;
        }
        if checkpoint.metadata.scope != scope {
            warn!(path = %path.display(), "Ignoring checkpoint for another dataset");
            return None;
        }

        info!(
            path = %path.display(),
            dialogues = checkpoint.data.len(),
            processed = checkpoint.metadata.processed.len(),
            "Resuming from checkpoint"
        );
        Some(checkpoint)
    }

    /// Delete all but the newest `keep_last` snapshots of a scope.
    pub fn prune(&self, scope: &str) -> Result<usize> {
        let paths = self.list(scope);
        let excess = paths.len().saturating_sub(self.keep_last);

        for path in &paths[..excess] {
            fs::remove_file(path).map_err(|e| ColloquyError::io("removing old checkpoint", e))?;
            debug!(path = %path.display(), "Removed old checkpoint");
        }
        Ok(excess)
    }
}
