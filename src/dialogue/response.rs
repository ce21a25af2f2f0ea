//! Assistant turn synthesis.

use super::state::{ConversationStyle, DialogueState};
use super::template::{self, fill, pick, truncate_chars};
use super::Grounding;
use crate::index::ScriptureRef;
use rand::Rng;
use rand::seq::SliceRandom;

/// Template family of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateType {
    Intro,
    ScriptureIntegration,
    Practical,
    Deeper,
}

/// Draw above which scripture integration is chosen when references exist.
const SCRIPTURE_INTEGRATION_CUTOFF: f64 = 0.3;

fn templates(style: ConversationStyle, kind: TemplateType) -> Option<&'static [&'static str]> {
    use ConversationStyle as S;
    use TemplateType as T;

    let list: &'static [&'static str] = match (style, kind) {
        (S::Teaching, T::Intro) => &[
            "The Man of God illuminates this truth by explaining that {concept} {elaboration}",
            "In understanding {topic}, we must first recognize that {principle}. {scripture_support}",
            "This revelation about {topic} transforms our perspective because {insight}. {application}",
        ],
        (S::Teaching, T::ScriptureIntegration) => &[
            "As we see in {scripture}, this principle {application} {deeper_meaning}",
            "The Bible validates this in {scripture} where it says '{verse_content}', showing us {explanation}",
            "{scripture} perfectly illustrates how {connection} in our daily walk with Christ",
        ],
        (S::Teaching, T::Practical) => &[
            "In your daily walk, this means {application}. For instance, {example}",
            "Practically speaking, you can apply this by {method}, which will {result}",
            "This transforms your life when you {action}, leading to {transformation}",
        ],
        (S::Teaching, T::Deeper) => &[
            "The deeper implication here reveals {theological_truth} which fundamentally {impact}",
            "This connects to the broader truth of {doctrine} because {connection}",
            "Understanding this in the context of {biblical_theme} shows us {revelation}",
        ],
        (S::Exploratory, T::Intro) => &[
            "Let's explore how {concept} relates to {aspect}. {question}",
            "Consider the implications of {topic} in light of {scripture_principle}",
            "The beauty of {topic} is revealed when we understand {insight}",
        ],
        (S::Exploratory, T::ScriptureIntegration) => &[
            "Interestingly, {scripture} provides insight here: '{verse_content}' - {interpretation}",
            "The biblical foundation in {scripture} suggests {principle} which {application}",
            "When we examine {scripture}, we discover {truth} about {topic}",
        ],
        (S::Exploratory, T::Practical) => &[
            "One way to experience this is through {method}. Have you considered {question}?",
            "This principle becomes real when {scenario}. {encouragement}",
            "In practical terms, {application} helps us {benefit}",
        ],
        (S::Practical, T::Intro) => &[
            "Here's how {concept} works in real life: {example}",
            "The practical outworking of {topic} means {application}",
            "You can immediately apply {topic} by {action}",
        ],
        (S::Practical, T::ScriptureIntegration) => &[
            "{scripture} gives us the blueprint: '{verse_content}' - here's how to apply it: {steps}",
            "Following the pattern in {scripture}, we can {application}",
            "The Word shows us in {scripture} that {principle}, which means {practical_outcome}",
        ],
        (S::Practical, T::Practical) => &[
            "Start by {first_step}, then {next_step}. This leads to {result}",
            "In everyday situations, {application} looks like {example}",
            "The key is to {action} consistently, which produces {fruit}",
        ],
        (S::Exploratory | S::Practical, T::Deeper) => return None,
    };
    Some(list)
}

/// Template-driven answer generator.
#[derive(Debug, Clone, Default)]
pub struct ResponseGenerator;

impl ResponseGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Template family for the current state.
    pub fn select_template_type<R: Rng + ?Sized>(
        &self,
        state: &DialogueState,
        rng: &mut R,
    ) -> TemplateType {
        if state.depth_level == 0 {
            TemplateType::Intro
        } else if !state.scripture_references.is_empty()
            && rng.gen_range(0.0..1.0) > SCRIPTURE_INTEGRATION_CUTOFF
        {
            TemplateType::ScriptureIntegration
        } else if state.depth_level >= 2 {
            match state.conversation_style {
                ConversationStyle::Teaching => TemplateType::Deeper,
                _ => TemplateType::Practical,
            }
        } else {
            TemplateType::Practical
        }
    }

    /// Answer grounded in `content`, suffixed with the source citation.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        state: &DialogueState,
        content: &str,
        source: &str,
        grounding: &Grounding<'_>,
        rng: &mut R,
    ) -> String {
        let kind = self.select_template_type(state, rng);
        let style = state.conversation_style;
        let list = templates(style, kind)
            .or_else(|| templates(style, TemplateType::Intro))
            .unwrap_or_default();
        let chosen = pick(rng, list);

        let filled = self.fill_template(chosen, state, content, grounding, rng);
        format!("{filled} {source}")
    }

    fn fill_template<R: Rng + ?Sized>(
        &self,
        chosen: &str,
        state: &DialogueState,
        content: &str,
        grounding: &Grounding<'_>,
        rng: &mut R,
    ) -> String {
        let nlp = grounding.nlp;
        let topic = state.topic.as_str();
        let persona = state.persona;
        let mut content_themes: Option<Vec<String>> = None;
        let mut reference: Option<Option<&ScriptureRef>> = None;

        fill(chosen, |slot| {
            let mut themes = || {
                content_themes
                    .get_or_insert_with(|| nlp.themes(content, 2))
                    .clone()
            };
            let value = match slot {
                "topic" => topic.to_string(),
                "concept" => themes().into_iter().next().unwrap_or_else(|| topic.to_string()),
                "principle" => template::extract_principle(nlp.segmenter.as_ref(), content),
                "insight" => template::extract_insight(&themes()),
                "elaboration" => nlp.paraphrase(truncate_chars(content, 150)),
                "explanation" => nlp.paraphrase(truncate_chars(content, 100)),
                "interpretation" => nlp.paraphrase(truncate_chars(content, 80)),
                "scripture" => reference
                    .get_or_insert_with(|| state.scripture_references.choose(rng))
                    .map_or_else(|| "the Word".to_string(), |r| r.full.clone()),
                "verse_content" => reference
                    .get_or_insert_with(|| state.scripture_references.choose(rng))
                    .and_then(|r| grounding.indices.scripture_usages(&r.full).first())
                    .map_or_else(
                        || "this truth".to_string(),
                        |entry| format!("{}...", truncate_chars(&entry.context, 100)),
                    ),
                "scripture_support" => reference
                    .get_or_insert_with(|| state.scripture_references.choose(rng))
                    .map_or_else(
                        || "Scripture affirms this throughout.".to_string(),
                        |r| format!("{} affirms this.", r.full),
                    ),
                "application" => template::application(topic, persona, rng),
                "deeper_meaning" => template::deeper_meaning(topic, rng),
                "connection" => {
                    let other = state.themes.choose(rng).map_or(topic, String::as_str);
                    format!("how {topic} relates to {other}")
                }
                "example" => template::example(persona, rng),
                "method" => template::method(topic, rng),
                "result" => template::expected_result(rng),
                "action" => template::action(topic, rng),
                "transformation" => template::transformation(rng),
                "theological_truth" | "truth" => {
                    template::extract_theological_truth(nlp.segmenter.as_ref(), content, topic)
                }
                "impact" => template::impact(rng),
                "doctrine" => pick(
                    rng,
                    &["grace", "faith", "redemption", "sanctification", "the finished work"],
                )
                .to_string(),
                "biblical_theme" => pick(
                    rng,
                    &["covenant", "kingdom life", "righteousness", "divine nature"],
                )
                .to_string(),
                "revelation" => template::extract_revelation(&themes()),
                "aspect" => state
                    .themes
                    .choose(rng)
                    .cloned()
                    .unwrap_or_else(|| topic.to_string()),
                "scripture_principle" => template::extract_scripture_principle(content, rng),
                "question" => template::reflective_question(topic, rng),
                "scenario" => template::scenario(topic, rng),
                "encouragement" => template::encouragement(rng),
                "benefit" => template::benefit(topic, rng),
                "steps" => template::steps(topic),
                "practical_outcome" => template::practical_outcome(topic, rng),
                "first_step" => template::first_step(topic),
                "next_step" => template::next_step(topic),
                "fruit" => template::fruit(rng),
                "situation" => pick(
                    rng,
                    &["prayer life", "work challenges", "relationships", "spiritual growth"],
                )
                .to_string(),
                _ => return None,
            };
            Some(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Indices;
    use crate::models::Persona;
    use crate::nlp::NlpContext;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn make_state(style: ConversationStyle, depth: u8) -> DialogueState {
        let nlp = NlpContext::new(0.6);
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = DialogueState::new(
            "faith",
            vec!["faith".into(), "hearing".into()],
            "Faith comes by hearing. Romans 10:17 confirms this.",
            Persona::Student,
            nlp.segmenter.as_ref(),
            &mut rng,
        );
        state.conversation_style = style;
        state.depth_level = depth;
        state
    }

    #[test]
    fn test_intro_at_depth_zero() {
        let generator = ResponseGenerator::new();
        let state = make_state(ConversationStyle::Practical, 0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(generator.select_template_type(&state, &mut rng), TemplateType::Intro);
    }

    #[test]
    fn test_deeper_only_for_teaching() {
        let generator = ResponseGenerator::new();
        let mut rng = StdRng::seed_from_u64(1);

        let teaching = make_state(ConversationStyle::Teaching, 2);
        assert_eq!(generator.select_template_type(&teaching, &mut rng), TemplateType::Deeper);

        let exploratory = make_state(ConversationStyle::Exploratory, 3);
        assert_eq!(
            generator.select_template_type(&exploratory, &mut rng),
            TemplateType::Practical
        );
    }

    #[test]
    fn test_missing_family_falls_back_to_intro() {
        assert!(templates(ConversationStyle::Practical, TemplateType::Deeper).is_none());
        assert!(templates(ConversationStyle::Practical, TemplateType::Intro).is_some());
    }

    #[test]
    fn test_every_template_slot_resolves() {
        let nlp = NlpContext::new(0.6);
        let indices = Indices::default();
        let grounding = Grounding { nlp: &nlp, indices: &indices };
        let generator = ResponseGenerator::new();
        let state = make_state(ConversationStyle::Teaching, 1);
        let mut rng = StdRng::seed_from_u64(2);

        let known: Vec<&str> = [
            ConversationStyle::Teaching,
            ConversationStyle::Exploratory,
            ConversationStyle::Practical,
        ]
        .into_iter()
        .flat_map(|style| {
            [
                TemplateType::Intro,
                TemplateType::ScriptureIntegration,
                TemplateType::Practical,
                TemplateType::Deeper,
            ]
            .into_iter()
            .filter_map(move |kind| templates(style, kind))
        })
        .flatten()
        .copied()
        .collect();

        for t in known {
            let out = generator.fill_template(t, &state, "Faith comes by hearing.", &grounding, &mut rng);
            assert!(!out.contains('{'), "unfilled slot in: {out}");
        }
    }

    #[test]
    fn test_response_ends_with_source() {
        let nlp = NlpContext::new(0.6);
        let indices = Indices::default();
        let grounding = Grounding { nlp: &nlp, indices: &indices };
        let state = make_state(ConversationStyle::Exploratory, 0);
        let mut rng = StdRng::seed_from_u64(8);

        let out = ResponseGenerator::new().generate(
            &state,
            "Faith comes by hearing.",
            "[SCRIPTURE: Romans 10:17]",
            &grounding,
            &mut rng,
        );
        assert!(out.ends_with(" [SCRIPTURE: Romans 10:17]"));
    }
}
