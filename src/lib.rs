//! colloquy - Synthetic multi-turn dialogue generation from devotional and book corpora.
//!
//! ## Architecture
//!
//! Every source item runs through a per-item dialogue chain on a bounded
//! worker pool:
//! - **Dialogue chain**: persona → themes → question/answer turns → validation
//! - **Quality**: coherence scoring, gate, diversity selection, pastoral review
//!
//! ## Pipeline
//!
//! Load → Index scripture → Generate per dataset (checkpointed) → Post-process → Save
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Compile-time enforced invariants (types, enums)
//! - B_i (Beliefs): Runtime fallible operations (Result, Option)
//! - I^R (Resolvable): User-configurable parameters
//! - I^B (Bounded): Item failures, timeouts, optional remote paraphrasing

pub mod checkpoint;
pub mod client;
pub mod dialogue;
pub mod index;
pub mod models;
pub mod nlp;
pub mod pipeline;
pub mod pool;
pub mod quality;

// Re-exports for convenience
pub use checkpoint::{Checkpoint, CheckpointManager};
pub use client::{LlmClient, LlmParaphraser};
pub use dialogue::{ChainOutput, DialogueChain};
pub use index::Indices;
pub use models::{ColloquyError, Config, Dialogue, Result, RunStats, SourceItem, SourceKind};
pub use nlp::NlpContext;
pub use pipeline::{GenerationPipeline, GenerationReport, ReviewSummary};
pub use pool::WorkerPool;
pub use quality::PastoralReviewer;
