//! User turn synthesis: opening questions and follow-ups.

use super::state::DialogueState;
use super::template::{fill, pick};
use crate::models::{Difficulty, Persona};
use crate::nlp::NlpContext;
use rand::Rng;
use rand::seq::SliceRandom;

/// Kind of follow-up question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FollowUpKind {
    Clarification,
    Deeper,
    Practical,
    Struggle,
    Scripture,
    Application,
    Connection,
    Theological,
    Hermeneutics,
    Ministry,
    Challenging,
}

fn initial_templates(persona: Persona) -> &'static [&'static str] {
    match persona {
        Persona::Seeker => &[
            "I've been wondering about {topic}. Could you help me understand {aspect}?",
            "What does it mean when the Bible talks about {topic}?",
            "I'm curious about {topic}. How does this apply to {situation}?",
        ],
        Persona::Student => &[
            "Could you explain the biblical foundation for {topic}?",
            "What's the significance of {topic} in {context}?",
            "How does {topic} fit into God's overall plan?",
        ],
        Persona::MatureBeliever => &[
            "What's the deeper theological significance of {topic}?",
            "How does {topic} challenge conventional Christian thinking?",
            "What are the implications of {topic} for {ministry_area}?",
        ],
    }
}

fn follow_up_templates(persona: Persona) -> &'static [(FollowUpKind, &'static str)] {
    use FollowUpKind as K;
    match persona {
        Persona::Seeker => &[
            (K::Clarification, "When you say '{concept}', what does that look like {context}?"),
            (K::Deeper, "This is fascinating. How does {topic} relate to {connection}?"),
            (K::Practical, "How can I start experiencing {topic} in my {area}?"),
            (K::Struggle, "I struggle with {challenge}. How does {topic} help with this?"),
        ],
        Persona::Student => &[
            (K::Clarification, "Can you elaborate on {concept}? I want to understand it better."),
            (K::Scripture, "Are there other scriptures that support this teaching on {topic}?"),
            (K::Application, "What are the practical steps to apply {topic} in {situation}?"),
            (K::Connection, "How does this connect with what we know about {doctrine}?"),
        ],
        Persona::MatureBeliever => &[
            (K::Theological, "How does this understanding of {topic} align with {doctrine}?"),
            (K::Hermeneutics, "What's the original context of this teaching on {topic}?"),
            (K::Ministry, "How can we effectively teach {topic} to {audience}?"),
            (K::Challenging, "Some argue that {objection}. How do we respond?"),
        ],
    }
}

/// Candidate follow-up kinds by conversational depth.
fn kinds_for_depth(depth: u8) -> &'static [FollowUpKind] {
    match depth {
        0 => &[FollowUpKind::Clarification, FollowUpKind::Practical],
        1 => &[
            FollowUpKind::Deeper,
            FollowUpKind::Scripture,
            FollowUpKind::Application,
        ],
        _ => &[
            FollowUpKind::Theological,
            FollowUpKind::Challenging,
            FollowUpKind::Connection,
        ],
    }
}

fn aspect(difficulty: Difficulty) -> &'static [&'static str] {
    match difficulty {
        Difficulty::Introductory => &["the basics of it", "what it means", "how it works"],
        Difficulty::Intermediate => &[
            "its spiritual significance",
            "its practical application",
            "its biblical foundation",
        ],
        Difficulty::Advanced => &[
            "its theological implications",
            "its hermeneutical context",
            "its eschatological significance",
        ],
    }
}

fn context(difficulty: Difficulty) -> &'static [&'static str] {
    match difficulty {
        Difficulty::Introductory => &["Christian living", "our faith journey", "everyday life"],
        Difficulty::Intermediate => &[
            "spiritual growth",
            "ministry effectiveness",
            "biblical understanding",
        ],
        Difficulty::Advanced => &["systematic theology", "church history", "apologetics"],
    }
}

const CHALLENGES: &[(&str, &str)] = &[
    ("faith", "trusting God when I can't see results"),
    ("prayer", "maintaining consistency in prayer"),
    ("grace", "understanding grace vs. license"),
    ("word", "applying scripture to modern situations"),
    ("spirit", "discerning the Spirit's voice"),
];

const OBJECTIONS: &[(&str, &str)] = &[
    ("faith", "faith is just positive thinking"),
    ("grace", "grace promotes sin"),
    ("prosperity", "God wants everyone poor and humble"),
    ("healing", "healing isn't for today"),
    ("tongues", "tongues have ceased"),
];

fn relevant_challenge(topic: &str) -> String {
    let lower = topic.to_lowercase();
    CHALLENGES
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map_or("applying this truth consistently", |(_, c)| *c)
        .to_string()
}

fn common_objection(topic: &str) -> String {
    let lower = topic.to_lowercase();
    OBJECTIONS
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map_or_else(
            || format!("{topic} is not relevant for modern believers"),
            |(_, o)| o.to_string(),
        )
}

/// Template-driven question generator.
#[derive(Debug, Clone, Default)]
pub struct QuestionGenerator;

impl QuestionGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Opening question; difficulty drives the `aspect` and `context` slots.
    pub fn initial<R: Rng + ?Sized>(
        &self,
        topic: &str,
        persona: Persona,
        difficulty: Difficulty,
        rng: &mut R,
    ) -> String {
        let chosen = pick(rng, initial_templates(persona));
        fill(chosen, |slot| {
            let value = match slot {
                "topic" => topic.to_string(),
                "aspect" => pick(rng, aspect(difficulty)).to_string(),
                "context" => pick(rng, context(difficulty)).to_string(),
                "situation" => {
                    pick(rng, &["daily life", "work", "relationships", "spiritual walk"]).to_string()
                }
                "ministry_area" => pick(
                    rng,
                    &["discipleship", "evangelism", "pastoral care", "teaching"],
                )
                .to_string(),
                _ => return None,
            };
            Some(value)
        })
    }

    /// Follow-up kind for the current depth and persona.
    ///
    /// Falls back to a random kind the persona has a template for.
    pub fn select_kind<R: Rng + ?Sized>(
        &self,
        persona: Persona,
        depth: u8,
        rng: &mut R,
    ) -> FollowUpKind {
        let available = follow_up_templates(persona);
        let preferred = kinds_for_depth(depth)
            .choose(rng)
            .copied()
            .unwrap_or(FollowUpKind::Clarification);

        if available.iter().any(|(k, _)| *k == preferred) {
            preferred
        } else {
            available
                .choose(rng)
                .map_or(FollowUpKind::Clarification, |(k, _)| *k)
        }
    }

    /// Follow-up question reacting to the previous answer.
    pub fn follow_up<R: Rng + ?Sized>(
        &self,
        state: &DialogueState,
        previous_response: &str,
        nlp: &NlpContext,
        rng: &mut R,
    ) -> String {
        let kind = self.select_kind(state.persona, state.depth_level, rng);
        let chosen = follow_up_templates(state.persona)
            .iter()
            .find(|(k, _)| *k == kind)
            .map_or("Can you tell me more about {topic}?", |(_, t)| *t);

        let topic = state.topic.as_str();
        fill(chosen, |slot| {
            let value = match slot {
                "concept" => nlp
                    .themes(previous_response, 3)
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| topic.to_string()),
                "topic" => topic.to_string(),
                "context" => pick(
                    rng,
                    &["in practical terms", "for believers today", "in ministry"],
                )
                .to_string(),
                "connection" => state
                    .get_unexplored_aspects()
                    .first()
                    .map_or("our walk with God", |a| *a)
                    .to_string(),
                "area" => pick(
                    rng,
                    &["prayer life", "faith walk", "ministry", "relationships"],
                )
                .to_string(),
                "challenge" => relevant_challenge(topic),
                "doctrine" => pick(
                    rng,
                    &["justification", "sanctification", "glorification", "redemption"],
                )
                .to_string(),
                "situation" => pick(
                    rng,
                    &["workplace", "family life", "church ministry", "personal growth"],
                )
                .to_string(),
                "audience" => pick(
                    rng,
                    &[
                        "new believers",
                        "youth",
                        "those struggling with faith",
                        "church leaders",
                    ],
                )
                .to_string(),
                "objection" => common_objection(topic),
                _ => return None,
            };
            Some(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_initial_question_mentions_topic() {
        let generator = QuestionGenerator::new();
        let mut rng = StdRng::seed_from_u64(4);
        for persona in Persona::ALL {
            for _ in 0..10 {
                let q = generator.initial("faith", persona, Difficulty::Advanced, &mut rng);
                assert!(q.contains("faith"), "{q}");
                assert!(!q.contains('{'), "{q}");
            }
        }
    }

    #[test]
    fn test_depth_zero_kinds_for_student() {
        let generator = QuestionGenerator::new();
        let mut rng = StdRng::seed_from_u64(10);
        for _ in 0..30 {
            let kind = generator.select_kind(Persona::Student, 0, &mut rng);
            // Student has no Practical template, so that draw falls back.
            assert!(
                follow_up_templates(Persona::Student)
                    .iter()
                    .any(|(k, _)| *k == kind)
            );
        }
    }

    #[test]
    fn test_mature_believer_deep_kinds_stay_available() {
        let generator = QuestionGenerator::new();
        let mut rng = StdRng::seed_from_u64(10);
        for _ in 0..30 {
            let kind = generator.select_kind(Persona::MatureBeliever, 3, &mut rng);
            assert!(
                follow_up_templates(Persona::MatureBeliever)
                    .iter()
                    .any(|(k, _)| *k == kind)
            );
        }
    }

    #[test]
    fn test_challenge_and_objection_lookup() {
        assert_eq!(relevant_challenge("Prayer life"), "maintaining consistency in prayer");
        assert_eq!(relevant_challenge("hope"), "applying this truth consistently");
        assert_eq!(common_objection("divine healing"), "healing isn't for today");
        assert_eq!(
            common_objection("hope"),
            "hope is not relevant for modern believers"
        );
    }

    #[test]
    fn test_follow_up_fills_all_slots() {
        let nlp = NlpContext::new(0.6);
        let mut rng = StdRng::seed_from_u64(21);
        let generator = QuestionGenerator::new();

        for persona in Persona::ALL {
            for depth in 0..=3u8 {
                let mut state = DialogueState::new(
                    "grace",
                    vec!["grace".into(), "mercy".into()],
                    "Grace and mercy meet.",
                    persona,
                    nlp.segmenter.as_ref(),
                    &mut rng,
                );
                state.depth_level = depth;
                let q = generator.follow_up(&state, "Grace is unmerited favor.", &nlp, &mut rng);
                assert!(!q.contains('{'), "{q}");
            }
        }
    }
}
