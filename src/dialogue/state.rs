//! Per-item conversational memory.
//!
//! K_i invariants:
//! - `depth_level` never decreases and never exceeds `MAX_DEPTH`
//! - `discussed_points` only grows
//! - `scripture_references` is append-only (duplicates allowed)

use crate::index::{ScriptureRef, extract_scripture_references};
use crate::models::Persona;
use crate::nlp::{NlpContext, Segmenter, cosine_similarity};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Deepest conversational level.
pub const MAX_DEPTH: u8 = 3;

/// Soft size of a source chunk, in bytes of joined sentences.
pub const CHUNK_SOFT_LIMIT: usize = 200;

/// Register of the assistant's answers, fixed per dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStyle {
    Teaching,
    Exploratory,
    Practical,
}

impl ConversationStyle {
    pub const ALL: [ConversationStyle; 3] = [Self::Teaching, Self::Exploratory, Self::Practical];
}

/// Conversational state for one source item.
#[derive(Debug, Clone)]
pub struct DialogueState {
    pub topic: String,
    pub themes: Vec<String>,
    pub discussed_points: BTreeSet<String>,
    pub scripture_references: Vec<ScriptureRef>,
    pub depth_level: u8,
    pub conversation_style: ConversationStyle,
    pub persona: Persona,
    pub turn_count: usize,
    pub source_chunks: Vec<String>,
}

impl DialogueState {
    pub fn new<R: Rng + ?Sized>(
        topic: impl Into<String>,
        themes: Vec<String>,
        source_content: &str,
        persona: Persona,
        segmenter: &dyn Segmenter,
        rng: &mut R,
    ) -> Self {
        let conversation_style = *ConversationStyle::ALL
            .choose(rng)
            .unwrap_or(&ConversationStyle::Teaching);

        Self {
            topic: topic.into(),
            themes,
            discussed_points: BTreeSet::new(),
            scripture_references: Vec::new(),
            depth_level: 0,
            conversation_style,
            persona,
            turn_count: 0,
            source_chunks: chunk_content(segmenter, source_content),
        }
    }

    /// Fold a finished turn into the state.
    pub fn update(&mut self, turn_content: &str, nlp: &NlpContext) {
        self.discussed_points
            .extend(nlp.themes(turn_content, 3));
        self.scripture_references
            .extend(extract_scripture_references(turn_content));
        self.turn_count += 1;

        if self.turn_count % 2 == 0 {
            self.depth_level = (self.depth_level + 1).min(MAX_DEPTH);
        }
    }

    /// Themes not yet discussed, in theme order.
    pub fn get_unexplored_aspects(&self) -> Vec<&str> {
        self.themes
            .iter()
            .filter(|t| !self.discussed_points.contains(*t))
            .map(String::as_str)
            .collect()
    }

    /// Source chunk best suited to ground the next answer.
    ///
    /// Ranks chunks against the first two unexplored aspects; with nothing
    /// left to explore, walks the chunks by depth.
    pub fn get_relevant_chunk(&self, nlp: &NlpContext) -> String {
        if self.source_chunks.is_empty() {
            return String::new();
        }

        let unexplored = self.get_unexplored_aspects();
        if unexplored.is_empty() {
            let idx = usize::from(self.depth_level).min(self.source_chunks.len() - 1);
            return self.source_chunks[idx].clone();
        }

        let query = unexplored
            .iter()
            .take(2)
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        let query_vec = nlp.embeddings.get(&query);

        let mut best: Option<(f32, &String)> = None;
        for chunk in &self.source_chunks {
            let score = cosine_similarity(&query_vec, &nlp.embeddings.get(chunk));
            // Strictly greater keeps the first chunk on ties.
            if best.is_none_or(|(b, _)| score > b) {
                best = Some((score, chunk));
            }
        }
        best.map(|(_, c)| c.clone()).unwrap_or_default()
    }
}

/// Group consecutive sentences until the joined text passes the soft limit.
pub fn chunk_content(segmenter: &dyn Segmenter, content: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for sentence in segmenter.sentences(content) {
        if !current.is_empty() {
            current_len += 1;
        }
        current_len += sentence.len();
        current.push(sentence);

        if current_len > CHUNK_SOFT_LIMIT {
            chunks.push(current.join(" "));
            current.clear();
            current_len = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}
