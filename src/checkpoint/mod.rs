//! Checkpoint module for resumable generation.
//!
//! Provides:
//! - `Checkpoint`: Versioned snapshot of dialogues, indices and processed items
//! - `CheckpointManager`: Atomic persistence, latest-snapshot lookup and retention

mod state;

pub use state::*;
