//! Template filling and the phrase banks behind template slots.
//!
//! K_i: Filling never fails. A slot the resolver does not know stays in the
//! output as its literal `{placeholder}`.

use crate::models::Persona;
use crate::nlp::{Segmenter, is_stopword, tokenize};
use rand::Rng;
use rand::seq::SliceRandom;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn slot_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\{([a-z_]+)\}").ok())
        .as_ref()
}

/// Fill `{slot}` placeholders through `resolve`.
///
/// Each distinct slot is resolved at most once, and only if the template
/// references it.
pub fn fill<F>(template: &str, mut resolve: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(pattern) = slot_pattern() else {
        return template.to_string();
    };
    let mut resolved: HashMap<String, Option<String>> = HashMap::new();
    pattern
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            let value = resolved
                .entry(name.to_string())
                .or_insert_with(|| resolve(name));
            match value {
                Some(v) => v.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Uniform choice from a non-empty static list.
pub fn pick<R: Rng + ?Sized>(rng: &mut R, options: &[&'static str]) -> &'static str {
    options.choose(rng).copied().unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════
// Content extraction
// ═══════════════════════════════════════════════════════════════════════════

const PRINCIPLE_CUES: &[&str] = &["principle", "truth", "means", "shows", "reveals"];
const THEOLOGICAL_CUES: &[&str] = &["god", "christ", "spirit", "truth"];

/// First sentence that states a principle.
pub fn extract_principle(segmenter: &dyn Segmenter, content: &str) -> String {
    segmenter
        .sentences(content)
        .into_iter()
        .find(|s| {
            let lower = s.to_lowercase();
            PRINCIPLE_CUES.iter().any(|cue| lower.contains(cue))
        })
        .map_or_else(|| "this foundational truth".to_string(), str::to_string)
}

pub fn extract_insight(themes: &[String]) -> String {
    match themes {
        [] => "this revelation changes everything".to_string(),
        [only] => format!("understanding {only} transforms how we see God"),
        [first, second, ..] => format!("understanding {first} transforms how we see {second}"),
    }
}

/// First sentence mentioning God, Christ, the Spirit or truth, cut to 100 characters.
pub fn extract_theological_truth(segmenter: &dyn Segmenter, content: &str, topic: &str) -> String {
    segmenter
        .sentences(content)
        .into_iter()
        .find(|s| {
            let lower = s.to_lowercase();
            THEOLOGICAL_CUES.iter().any(|cue| lower.contains(cue))
        })
        .map_or_else(
            || format!("the divine reality of {topic}"),
            |s| truncate_chars(s, 100).to_string(),
        )
}

pub fn extract_revelation(themes: &[String]) -> String {
    match themes.first() {
        Some(theme) => format!("how {theme} actually works in the Kingdom"),
        None => "God's plan for our lives".to_string(),
    }
}

const SCRIPTURE_PRINCIPLES: &[&str] = &[
    "faith comes by hearing",
    "we walk by faith not by sight",
    "God's grace is sufficient",
    "in Christ we are new creations",
];

/// Well-known principle sharing a content word with `content`, else a random one.
pub fn extract_scripture_principle<R: Rng + ?Sized>(content: &str, rng: &mut R) -> String {
    let words: Vec<String> = tokenize(content)
        .into_iter()
        .filter(|w| !is_stopword(w))
        .map(str::to_lowercase)
        .collect();

    SCRIPTURE_PRINCIPLES
        .iter()
        .find(|principle| {
            tokenize(principle)
                .into_iter()
                .filter(|w| !is_stopword(w))
                .any(|w| words.contains(&w.to_lowercase()))
        })
        .copied()
        .unwrap_or_else(|| pick(rng, SCRIPTURE_PRINCIPLES))
        .to_string()
}

/// Prefix of at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Phrase banks
// ═══════════════════════════════════════════════════════════════════════════

pub fn application<R: Rng + ?Sized>(topic: &str, persona: Persona, rng: &mut R) -> String {
    let options: [String; 3] = match persona {
        Persona::Seeker => [
            format!("starting each day acknowledging {topic}"),
            format!("practicing {topic} in small steps"),
            format!("learning to recognize {topic} in your life"),
        ],
        Persona::Student => [
            format!("studying scriptures about {topic} systematically"),
            format!("implementing {topic} in your ministry"),
            format!("teaching others about {topic}"),
        ],
        Persona::MatureBeliever => [
            format!("mentoring others in understanding {topic}"),
            format!("developing a theology of {topic}"),
            format!("leading workshops on {topic}"),
        ],
    };
    choose_owned(rng, options)
}

pub fn deeper_meaning<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> String {
    choose_owned(
        rng,
        [
            "reveals the nature of God's interaction with humanity".to_string(),
            "demonstrates the completeness of Christ's work".to_string(),
            "shows how the Kingdom operates".to_string(),
            "unveils our true identity in Christ".to_string(),
            format!("exposes the enemy's deception about {topic}"),
        ],
    )
}

pub fn example<R: Rng + ?Sized>(persona: Persona, rng: &mut R) -> String {
    let options: &[&'static str] = match persona {
        Persona::Seeker => &[
            "when facing a difficult decision at work",
            "in conversations with family members",
            "during times of uncertainty",
        ],
        Persona::Student => &[
            "when counseling someone struggling with faith",
            "while preparing a Bible study",
            "in your personal devotion time",
        ],
        Persona::MatureBeliever => &[
            "when addressing doctrinal controversies",
            "in strategic ministry planning",
            "while training church leaders",
        ],
    };
    pick(rng, options).to_string()
}

pub fn method<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> String {
    choose_owned(
        rng,
        [
            format!("daily meditation on scriptures about {topic}"),
            format!("practical exercises that develop {topic}"),
            format!("accountability partnerships focused on {topic}"),
            format!("journaling your journey with {topic}"),
        ],
    )
}

pub fn expected_result<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(
        rng,
        &[
            "transformation in your spiritual walk",
            "breakthrough in areas of struggle",
            "deeper intimacy with God",
            "increased effectiveness in ministry",
            "freedom from bondage",
        ],
    )
    .to_string()
}

pub fn action<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> String {
    choose_owned(
        rng,
        [
            format!("declare the truth about {topic}"),
            format!("act on your understanding of {topic}"),
            format!("share {topic} with others"),
            format!("live out {topic} daily"),
        ],
    )
}

pub fn transformation<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(
        rng,
        &[
            "renewed mind and transformed life",
            "victory over previous limitations",
            "manifestation of God's promises",
            "alignment with God's purpose",
        ],
    )
    .to_string()
}

pub fn impact<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(
        rng,
        &[
            "changes how we approach every situation",
            "redefines our understanding of spiritual reality",
            "empowers us for supernatural living",
            "establishes us in Kingdom authority",
        ],
    )
    .to_string()
}

pub fn reflective_question<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> String {
    choose_owned(
        rng,
        [
            format!("How has {topic} been working in your life?"),
            format!("What areas need {topic} the most?"),
            format!("Where do you see {topic} manifesting?"),
            format!("How can {topic} transform your situation?"),
        ],
    )
}

pub fn scenario<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> String {
    choose_owned(
        rng,
        [
            format!("you're faced with a challenge that requires {topic}"),
            format!("someone asks you to explain {topic}"),
            format!("you need to apply {topic} in a crisis"),
            format!("God calls you to demonstrate {topic}"),
        ],
    )
}

pub fn encouragement<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(
        rng,
        &[
            "God is faithful to complete this work in you",
            "The Holy Spirit will guide you every step",
            "You're not alone in this journey",
            "His grace is more than sufficient",
        ],
    )
    .to_string()
}

pub fn benefit<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> String {
    choose_owned(
        rng,
        [
            format!("experience the fullness of {topic}"),
            format!("walk in victory through {topic}"),
            format!("see breakthrough by understanding {topic}"),
            format!("live in freedom through {topic}"),
        ],
    )
}

pub fn steps(topic: &str) -> String {
    format!(
        "1) Meditate on scriptures about {topic}, 2) Apply it in small areas first, 3) Share your testimony"
    )
}

pub fn practical_outcome<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> String {
    choose_owned(
        rng,
        [
            format!("you'll see {topic} working in every area"),
            format!("{topic} becomes your daily reality"),
            format!("others will notice the change {topic} brings"),
            format!("problems bow to the power of {topic}"),
        ],
    )
}

pub fn first_step(topic: &str) -> String {
    format!("acknowledging the truth about {topic}")
}

pub fn next_step(topic: &str) -> String {
    format!("acting on your faith concerning {topic}")
}

pub fn fruit<R: Rng + ?Sized>(rng: &mut R) -> String {
    pick(
        rng,
        &[
            "peace that passes understanding",
            "joy unspeakable",
            "love that transforms",
            "faith that moves mountains",
        ],
    )
    .to_string()
}

fn choose_owned<R: Rng + ?Sized, const N: usize>(rng: &mut R, options: [String; N]) -> String {
    let idx = rng.gen_range(0..N);
    options.into_iter().nth(idx).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::RuleSegmenter;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_fill_known_and_unknown_slots() {
        let out = fill("About {topic}: {mystery} and {topic} again", |slot| match slot {
            "topic" => Some("grace".to_string()),
            _ => None,
        });
        assert_eq!(out, "About grace: {mystery} and grace again");
    }

    #[test]
    fn test_fill_resolves_each_slot_once_and_lazily() {
        let mut calls = Vec::new();
        fill("{a} {b} {a}", |slot| {
            calls.push(slot.to_string());
            Some(slot.to_uppercase())
        });
        assert_eq!(calls, vec!["a", "b"]);
    }

    #[test]
    fn test_fill_does_not_rescan_inserted_values() {
        let out = fill("{x}", |_| Some("{x}".to_string()));
        assert_eq!(out, "{x}");
    }

    #[test]
    fn test_extract_principle_finds_cue_sentence() {
        let seg = RuleSegmenter::new();
        assert_eq!(
            extract_principle(&seg, "Rest well. This shows God's care. Amen."),
            "This shows God's care."
        );
        assert_eq!(extract_principle(&seg, "Rest well."), "this foundational truth");
    }

    #[test]
    fn test_extract_insight_variants() {
        assert_eq!(extract_insight(&[]), "this revelation changes everything");
        assert_eq!(
            extract_insight(&["grace".into()]),
            "understanding grace transforms how we see God"
        );
        assert_eq!(
            extract_insight(&["grace".into(), "works".into()]),
            "understanding grace transforms how we see works"
        );
    }

    #[test]
    fn test_theological_truth_truncated() {
        let seg = RuleSegmenter::new();
        let long = format!("God {}.", "is good ".repeat(30));
        assert_eq!(extract_theological_truth(&seg, &long, "grace").chars().count(), 100);
        assert_eq!(
            extract_theological_truth(&seg, "Rest well.", "grace"),
            "the divine reality of grace"
        );
    }

    #[test]
    fn test_scripture_principle_prefers_overlap() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            extract_scripture_principle("We must keep hearing the word.", &mut rng),
            "faith comes by hearing"
        );
        assert_eq!(
            extract_scripture_principle("New creations are made daily.", &mut rng),
            "in Christ we are new creations"
        );
    }

    #[test]
    fn test_phrase_banks_mention_topic() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10 {
            assert!(application("prayer", Persona::Seeker, &mut rng).contains("prayer"));
            assert!(method("prayer", &mut rng).contains("prayer"));
            assert!(benefit("prayer", &mut rng).contains("prayer"));
        }
    }
}
