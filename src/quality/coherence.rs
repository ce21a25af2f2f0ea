//! Four-factor dialogue coherence.
//!
//! K_i: `overall = 0.25·topic_consistency + 0.35·answer_relevance
//!               + 0.20·depth_progression + 0.20·semantic_flow`,
//! every factor in [0, 1], 0.5 when there is not enough data.

use crate::models::{QualityMetrics, Turn};
use crate::nlp::{NlpContext, lexical_complexity};

pub const TOPIC_WEIGHT: f64 = 0.25;
pub const RELEVANCE_WEIGHT: f64 = 0.35;
pub const DEPTH_WEIGHT: f64 = 0.20;
pub const FLOW_WEIGHT: f64 = 0.20;

/// Score used when a factor has no data.
const NEUTRAL: f64 = 0.5;

/// Scores finished dialogues.
pub struct CoherenceScorer<'a> {
    nlp: &'a NlpContext,
}

impl<'a> CoherenceScorer<'a> {
    pub fn new(nlp: &'a NlpContext) -> Self {
        Self { nlp }
    }

    pub fn score(&self, turns: &[Turn]) -> QualityMetrics {
        let topic_consistency = self.topic_consistency(turns);
        let answer_relevance = self.answer_relevance(turns);
        let depth_progression = self.depth_progression(turns);
        let semantic_flow = self.semantic_flow(turns);

        QualityMetrics {
            overall: weighted_overall(
                topic_consistency,
                answer_relevance,
                depth_progression,
                semantic_flow,
            ),
            topic_consistency,
            answer_relevance,
            depth_progression,
            semantic_flow,
        }
    }

    /// Mean similarity between consecutive turns' primary themes.
    pub fn topic_consistency(&self, turns: &[Turn]) -> f64 {
        let primaries: Vec<String> = turns
            .iter()
            .filter_map(|t| self.nlp.themes(&t.content, 2).into_iter().next())
            .collect();

        clamped_mean(
            primaries
                .windows(2)
                .map(|pair| f64::from(self.nlp.similarity(&pair[0], &pair[1]))),
        )
    }

    /// Mean similarity of each (question, answer) pair at even/odd offsets.
    pub fn answer_relevance(&self, turns: &[Turn]) -> f64 {
        clamped_mean(
            turns
                .chunks_exact(2)
                .map(|pair| f64::from(self.nlp.similarity(&pair[0].content, &pair[1].content))),
        )
    }

    /// Fraction of consecutive pairs whose lexical complexity does not drop.
    pub fn depth_progression(&self, turns: &[Turn]) -> f64 {
        if turns.len() < 2 {
            return NEUTRAL;
        }
        let segmenter = self.nlp.segmenter.as_ref();
        let complexity: Vec<f64> = turns
            .iter()
            .map(|t| lexical_complexity(segmenter, &t.content))
            .collect();

        let rising = complexity.windows(2).filter(|w| w[1] >= w[0]).count();
        rising as f64 / (complexity.len() - 1) as f64
    }

    /// Fraction of a turn's themes echoed verbatim by the next turn, averaged.
    pub fn semantic_flow(&self, turns: &[Turn]) -> f64 {
        if turns.len() < 2 {
            return NEUTRAL;
        }

        let scores: Vec<f64> = turns
            .windows(2)
            .map(|pair| {
                let concepts = self.nlp.themes(&pair[0].content, 3);
                let next = pair[1].content.to_lowercase();
                let echoed = concepts
                    .iter()
                    .filter(|c| next.contains(&c.to_lowercase()))
                    .count();
                echoed as f64 / concepts.len().max(1) as f64
            })
            .collect();

        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// The fixed weighted sum of the four factors.
pub fn weighted_overall(topic: f64, relevance: f64, depth: f64, flow: f64) -> f64 {
    TOPIC_WEIGHT * topic + RELEVANCE_WEIGHT * relevance + DEPTH_WEIGHT * depth + FLOW_WEIGHT * flow
}

fn clamped_mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        return NEUTRAL;
    }
    (sum / count as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(texts: &[&str]) -> Vec<Turn> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                if i % 2 == 0 {
                    Turn::user(*t)
                } else {
                    Turn::assistant(*t)
                }
            })
            .collect()
    }

    #[test]
    fn test_insufficient_data_is_neutral() {
        let nlp = NlpContext::new(0.6);
        let scorer = CoherenceScorer::new(&nlp);
        let single = turns(&["What is grace?"]);

        let metrics = scorer.score(&single);
        assert_eq!(metrics.topic_consistency, 0.5);
        assert_eq!(metrics.answer_relevance, 0.5);
        assert_eq!(metrics.depth_progression, 0.5);
        assert_eq!(metrics.semantic_flow, 0.5);
        assert!((metrics.overall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_overall_is_weighted_sum_and_bounded() {
        let nlp = NlpContext::new(0.6);
        let scorer = CoherenceScorer::new(&nlp);
        let dialogue = turns(&[
            "What does the Bible say about faith?",
            "Faith comes by hearing the word of God, and faith grows through hearing.",
            "How does hearing build faith in daily life?",
            "Daily hearing of the word renews the mind and strengthens faith.",
        ]);

        let m = scorer.score(&dialogue);
        let expected = 0.25 * m.topic_consistency
            + 0.35 * m.answer_relevance
            + 0.20 * m.depth_progression
            + 0.20 * m.semantic_flow;
        assert!((m.overall - expected).abs() < 1e-9);
        for v in [
            m.overall,
            m.topic_consistency,
            m.answer_relevance,
            m.depth_progression,
            m.semantic_flow,
        ] {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_depth_progression_counts_non_decreasing_pairs() {
        let nlp = NlpContext::new(0.6);
        let scorer = CoherenceScorer::new(&nlp);
        let dialogue = turns(&[
            "Why?",
            "Because sanctification describes a lifelong transformation of character.",
            "Ok ok ok.",
        ]);
        assert!((scorer.depth_progression(&dialogue) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_clamped_mean_clamps_negative() {
        assert_eq!(clamped_mean([-0.4, -0.2].into_iter()), 0.0);
        assert_eq!(clamped_mean(std::iter::empty()), 0.5);
    }
}
