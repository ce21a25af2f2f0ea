//! Per-item dialogue state machine.
//!
//! One source item in, one `Dialogue` plus its index delta out. The chain is
//! synchronous and shared read-only across worker threads; all randomness
//! comes from the caller's `Rng`.

use super::Grounding;
use super::persona::PersonaManager;
use super::question::QuestionGenerator;
use super::response::ResponseGenerator;
use super::state::DialogueState;
use crate::index::{IndexDelta, Indices, source_citation};
use crate::models::{
    ColloquyError, Dialogue, Difficulty, GenerationConfig, Result, SourceItem, Turn,
};
use crate::nlp::{NlpContext, Segmenter, mean_sentence_length};
use crate::quality::{CoherenceScorer, TheologicalValidator};
use chrono::Utc;
use rand::Rng;
use rand::seq::SliceRandom;
use uuid::Uuid;

/// Technical terms counted by the difficulty heuristic.
pub const COMPLEX_TERMS: &[&str] = &[
    "propitiation",
    "sanctification",
    "justification",
    "eschatology",
    "hermeneutics",
    "soteriology",
    "pneumatology",
    "christology",
];

/// Themes considered when drawing the dialogue topic.
const TOPIC_CANDIDATES: usize = 3;

/// Themes kept on the finished dialogue.
const KEY_THEMES: usize = 3;

/// Dialogue generated from one item, plus the index usages it contributed.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub dialogue: Dialogue,
    pub delta: IndexDelta,
}

/// Orchestrates persona, question, answer and validation for one item.
pub struct DialogueChain {
    personas: PersonaManager,
    questions: QuestionGenerator,
    responses: ResponseGenerator,
    validator: TheologicalValidator,
    min_turns: usize,
    max_turns: usize,
    max_themes: usize,
}

impl DialogueChain {
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let weights = config.persona_weights()?;
        Ok(Self {
            personas: PersonaManager::new(&weights, config.jargon_matching)?,
            questions: QuestionGenerator::new(),
            responses: ResponseGenerator::new(),
            validator: TheologicalValidator::new(config.contradiction_threshold),
            min_turns: config.min_turns,
            max_turns: config.max_turns.max(config.min_turns),
            max_themes: config.max_themes,
        })
    }

    /// Generate the dialogue for one item.
    ///
    /// Fails with `NoThemes` when nothing can be extracted; the caller drops
    /// the item.
    pub fn run<R: Rng + ?Sized>(
        &self,
        item: &SourceItem,
        nlp: &NlpContext,
        indices: &Indices,
        rng: &mut R,
    ) -> Result<ChainOutput> {
        let persona = self.personas.select(rng);

        let themes = nlp.themes(&item.content, self.max_themes);
        let topic = themes
            .iter()
            .take(TOPIC_CANDIDATES)
            .collect::<Vec<_>>()
            .choose(rng)
            .map(|t| t.to_string())
            .ok_or_else(|| ColloquyError::NoThemes(item.content_hash()))?;

        let difficulty = determine_difficulty(nlp.segmenter.as_ref(), &item.content);
        let mut state = DialogueState::new(
            topic.clone(),
            themes.clone(),
            &item.content,
            persona,
            nlp.segmenter.as_ref(),
            rng,
        );

        let source = source_citation(item);
        let delta = IndexDelta::for_item(item, &themes, &source);
        let grounding = Grounding { nlp, indices };

        let opening = self.questions.initial(&topic, persona, difficulty, rng);
        let mut turns = vec![Turn::user(
            self.personas.adjust_language_complexity(persona, &opening),
        )];

        let num_turns = rng.gen_range(self.min_turns..=self.max_turns);
        for turn_idx in 0..num_turns {
            let last = turns.last().map(|t| t.content.clone()).unwrap_or_default();
            state.update(&last, nlp);

            if turn_idx % 2 == 0 {
                let chunk = state.get_relevant_chunk(nlp);
                let mut response = self
                    .responses
                    .generate(&state, &chunk, &source, &grounding, rng);

                let validation = self.validator.validate(&response, &item.content, nlp, indices);
                if !validation.passed() {
                    tracing::debug!(issues = ?validation.tags(), "Regenerating response");
                    response = self
                        .responses
                        .generate(&state, &chunk, &source, &grounding, rng);
                }
                turns.push(Turn::assistant(response));
            } else {
                if turn_idx > 2 && !self.personas.should_ask_follow_up(persona, rng) {
                    break;
                }
                let question = self.questions.follow_up(&state, &last, nlp, rng);
                turns.push(Turn::user(
                    self.personas.adjust_language_complexity(persona, &question),
                ));
            }
        }

        let metrics = CoherenceScorer::new(nlp).score(&turns);
        let dialogue = Dialogue {
            dialogue_id: dialogue_id(item, &topic),
            source,
            difficulty_level: difficulty,
            key_themes: themes.into_iter().take(KEY_THEMES).collect(),
            persona,
            turns,
            coherence_score: metrics.overall,
            quality_metrics: metrics,
            metadata: None,
            pastoral_review: None,
        };

        Ok(ChainOutput { dialogue, delta })
    }
}

/// `{kind}_{topic}_{timestamp}_{suffix}`; the random suffix keeps ids unique
/// within a run even when items share a topic and second.
fn dialogue_id(item: &SourceItem, topic: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}",
        item.kind,
        topic.replace(' ', "_"),
        Utc::now().format("%Y%m%d%H%M%S"),
        &suffix[..8]
    )
}

/// Difficulty from mean sentence length and technical vocabulary.
pub fn determine_difficulty(segmenter: &dyn Segmenter, content: &str) -> Difficulty {
    let avg_len = mean_sentence_length(segmenter, content);
    let lower = content.to_lowercase();
    let terms = COMPLEX_TERMS.iter().filter(|t| lower.contains(*t)).count();

    if avg_len > 20.0 && terms > 2 {
        Difficulty::Advanced
    } else if avg_len > 15.0 || terms > 0 {
        Difficulty::Intermediate
    } else {
        Difficulty::Introductory
    }
}
