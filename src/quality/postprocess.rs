//! Post-processing: repetition removal, quality gate and diversity selection.

use super::coherence::CoherenceScorer;
use crate::models::{DIALOGUE_SCHEMA_VERSION, Dialogue, DialogueMetadata, QualityConfig};
use crate::nlp::NlpContext;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};

/// Leading turns never removed as repetitive.
pub const PROTECTED_TURNS: usize = 3;

/// Themes compared per turn when looking for repetition.
const REPETITION_THEMES: usize = 5;

/// Result of diversity selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub dialogues: Vec<Dialogue>,
    /// `1 − max_theme_frequency / total_selected` (0 when nothing is selected)
    pub diversity_score: f64,
    pub themes_represented: usize,
}

/// Filters and selects finished dialogues.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    min_coherence: f64,
    min_answer_relevance: Option<f64>,
    max_output: usize,
}

impl PostProcessor {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            min_coherence: config.min_coherence,
            min_answer_relevance: config.min_answer_relevance,
            max_output: config.max_output,
        }
    }

    /// Drop turns that add no new theme, keeping role alternation.
    ///
    /// The first three turns are always kept. A dropped turn takes the turn
    /// after it along. Returns the number of removed turns.
    pub fn remove_repetitions(&self, dialogue: &mut Dialogue, nlp: &NlpContext) -> usize {
        let original = std::mem::take(&mut dialogue.turns);
        let total = original.len();
        let mut seen: HashSet<String> = HashSet::new();
        let mut kept = Vec::with_capacity(total);
        let mut skip_next = false;

        for turn in original {
            if skip_next {
                skip_next = false;
                continue;
            }
            let concepts = nlp.themes(&turn.content, REPETITION_THEMES);
            let adds_new = concepts.iter().any(|c| !seen.contains(c));

            if adds_new || kept.len() < PROTECTED_TURNS {
                seen.extend(concepts);
                kept.push(turn);
            } else {
                skip_next = true;
            }
        }

        dialogue.turns = kept;
        total - dialogue.turns.len()
    }

    /// Whether a dialogue clears the quality gate.
    pub fn passes_gate(&self, dialogue: &Dialogue) -> bool {
        dialogue.coherence_score >= self.min_coherence
            && self
                .min_answer_relevance
                .is_none_or(|min| dialogue.quality_metrics.answer_relevance >= min)
    }

    /// Clean, rescore, stamp metadata and gate.
    pub fn process(&self, dialogues: Vec<Dialogue>, nlp: &NlpContext) -> Vec<Dialogue> {
        let scorer = CoherenceScorer::new(nlp);
        let mut kept = Vec::with_capacity(dialogues.len());

        for mut dialogue in dialogues {
            if self.remove_repetitions(&mut dialogue, nlp) > 0 {
                let metrics = scorer.score(&dialogue.turns);
                dialogue.coherence_score = metrics.overall;
                dialogue.quality_metrics = metrics;
            }

            dialogue.metadata = Some(DialogueMetadata {
                generation_date: Utc::now(),
                quality_scores: dialogue.quality_metrics,
                persona_used: dialogue.persona,
                validated: true,
                version: DIALOGUE_SCHEMA_VERSION.to_string(),
            });

            if self.passes_gate(&dialogue) {
                kept.push(dialogue);
            } else {
                tracing::debug!(
                    id = %dialogue.dialogue_id,
                    coherence = dialogue.coherence_score,
                    "Dialogue below quality gate"
                );
            }
        }

        kept
    }

    /// Per-theme quota selection, topped up by global coherence.
    pub fn select_diverse(&self, dialogues: Vec<Dialogue>) -> Selection {
        let target = dialogues.len().min(self.max_output);

        let mut groups: BTreeMap<String, Vec<Dialogue>> = BTreeMap::new();
        for dialogue in dialogues {
            groups
                .entry(dialogue.primary_theme().to_string())
                .or_default()
                .push(dialogue);
        }
        if groups.is_empty() {
            return Selection {
                dialogues: Vec::new(),
                diversity_score: 0.0,
                themes_represented: 0,
            };
        }

        let base = target / groups.len();
        let mut selected = Vec::with_capacity(target);
        let mut leftovers = Vec::new();

        for (_, mut group) in groups {
            group.sort_by(|a, b| b.coherence_score.total_cmp(&a.coherence_score));
            let take = base.min(group.len());
            leftovers.extend(group.split_off(take));
            selected.extend(group);
        }

        let remaining = target.saturating_sub(selected.len());
        if remaining > 0 {
            leftovers.sort_by(|a, b| b.coherence_score.total_cmp(&a.coherence_score));
            selected.extend(leftovers.into_iter().take(remaining));
        }

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for d in &selected {
            *counts.entry(d.primary_theme()).or_default() += 1;
        }
        let diversity_score = match counts.values().max() {
            Some(&max) if !selected.is_empty() => 1.0 - max as f64 / selected.len() as f64,
            _ => 0.0,
        };
        let themes_represented = counts.len();

        Selection {
            dialogues: selected,
            diversity_score,
            themes_represented,
        }
    }
}
