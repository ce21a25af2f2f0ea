//! Persona archetypes and selection.
//!
//! I^R: The persona mix is configured as relative weights.
//! B_i: Every probabilistic choice goes through the caller's RNG.

use crate::models::{ColloquyError, ConfigError, JargonMatching, Persona, Result};
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use regex::Regex;

/// Vocabulary register of a persona.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabularyLevel {
    Simple,
    Moderate,
    Advanced,
}

/// Fixed trait bundle of an archetype.
#[derive(Debug)]
pub struct PersonaTraits {
    pub description: &'static str,
    pub question_style: &'static [&'static str],
    pub follow_up_probability: f64,
    pub depth_preference: &'static str,
    pub vocabulary_level: VocabularyLevel,
    pub concerns: &'static [&'static str],
}

static SEEKER: PersonaTraits = PersonaTraits {
    description: "New to faith, asking fundamental questions",
    question_style: &["curious", "exploratory", "basic"],
    follow_up_probability: 0.8,
    depth_preference: "gradual",
    vocabulary_level: VocabularyLevel::Simple,
    concerns: &["understanding basics", "practical application", "personal relevance"],
};

static STUDENT: PersonaTraits = PersonaTraits {
    description: "Growing believer seeking deeper understanding",
    question_style: &["analytical", "scriptural", "application-focused"],
    follow_up_probability: 0.7,
    depth_preference: "structured",
    vocabulary_level: VocabularyLevel::Moderate,
    concerns: &["biblical accuracy", "spiritual growth", "ministry preparation"],
};

static MATURE_BELIEVER: PersonaTraits = PersonaTraits {
    description: "Experienced Christian exploring advanced concepts",
    question_style: &["theological", "challenging", "ministerial"],
    follow_up_probability: 0.6,
    depth_preference: "deep",
    vocabulary_level: VocabularyLevel::Advanced,
    concerns: &["doctrinal precision", "teaching others", "apologetics"],
};

impl Persona {
    pub fn traits(&self) -> &'static PersonaTraits {
        match self {
            Self::Seeker => &SEEKER,
            Self::Student => &STUDENT,
            Self::MatureBeliever => &MATURE_BELIEVER,
        }
    }
}

/// Technical terms and their plain-language substitutes.
pub const JARGON: &[(&str, &str)] = &[
    ("sanctification", "becoming more like Christ"),
    ("justification", "being made right with God"),
    ("propitiation", "sacrifice that satisfies God"),
    ("righteousness", "right standing with God"),
];

/// Draws personas and adapts their language.
#[derive(Debug, Clone)]
pub struct PersonaManager {
    personas: Vec<Persona>,
    distribution: WeightedIndex<f64>,
    matching: JargonMatching,
    word_patterns: Vec<(Regex, &'static str)>,
}

impl PersonaManager {
    /// Build from relative weights (need not sum to one).
    pub fn new(weights: &[(Persona, f64)], matching: JargonMatching) -> Result<Self> {
        let personas: Vec<Persona> = weights.iter().map(|(p, _)| *p).collect();
        let distribution = WeightedIndex::new(weights.iter().map(|(_, w)| *w)).map_err(|e| {
            ColloquyError::Config(ConfigError::Invalid(format!("persona weights: {e}")))
        })?;

        let word_patterns = JARGON
            .iter()
            .map(|(term, plain)| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term)))
                    .map(|re| (re, *plain))
                    .map_err(|e| ColloquyError::Internal(format!("jargon pattern: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            personas,
            distribution,
            matching,
            word_patterns,
        })
    }

    /// Weighted draw of a persona.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> Persona {
        self.personas[self.distribution.sample(rng)]
    }

    /// Bernoulli draw at the persona's follow-up probability.
    pub fn should_ask_follow_up<R: Rng + ?Sized>(&self, persona: Persona, rng: &mut R) -> bool {
        rng.gen_bool(persona.traits().follow_up_probability)
    }

    /// Replace jargon with plain phrases for simple-vocabulary personas.
    pub fn adjust_language_complexity(&self, persona: Persona, text: &str) -> String {
        if persona.traits().vocabulary_level != VocabularyLevel::Simple {
            return text.to_string();
        }

        match self.matching {
            JargonMatching::Exact => JARGON
                .iter()
                .fold(text.to_string(), |acc, (term, plain)| acc.replace(term, plain)),
            JargonMatching::Word => self
                .word_patterns
                .iter()
                .fold(text.to_string(), |acc, (re, plain)| {
                    re.replace_all(&acc, *plain).into_owned()
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn default_weights() -> Vec<(Persona, f64)> {
        vec![
            (Persona::Seeker, 0.4),
            (Persona::Student, 0.4),
            (Persona::MatureBeliever, 0.2),
        ]
    }

    #[test]
    fn test_single_weight_always_selected() {
        let manager = PersonaManager::new(&[(Persona::Seeker, 1.0)], JargonMatching::Exact).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..50).all(|_| manager.select(&mut rng) == Persona::Seeker));
    }

    #[test]
    fn test_unnormalized_weights_and_distribution() {
        let weights: Vec<_> = default_weights().into_iter().map(|(p, w)| (p, w * 10.0)).collect();
        let manager = PersonaManager::new(&weights, JargonMatching::Exact).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let mature = (0..2000)
            .filter(|_| manager.select(&mut rng) == Persona::MatureBeliever)
            .count();
        assert!((250..550).contains(&mature), "got {mature}");
    }

    #[test]
    fn test_invalid_weights_rejected() {
        assert!(PersonaManager::new(&[(Persona::Seeker, 0.0)], JargonMatching::Exact).is_err());
        assert!(PersonaManager::new(&[], JargonMatching::Exact).is_err());
    }

    #[test]
    fn test_follow_up_is_seeded() {
        let manager = PersonaManager::new(&default_weights(), JargonMatching::Exact).unwrap();
        let draws = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20)
                .map(|_| manager.should_ask_follow_up(Persona::Seeker, &mut rng))
                .collect::<Vec<_>>()
        };
        assert_eq!(draws(9), draws(9));
    }

    #[test]
    fn test_exact_jargon_replacement_for_seeker_only() {
        let manager = PersonaManager::new(&default_weights(), JargonMatching::Exact).unwrap();
        let text = "What is sanctification? Sanctification matters.";

        assert_eq!(
            manager.adjust_language_complexity(Persona::Seeker, text),
            "What is becoming more like Christ? Sanctification matters."
        );
        assert_eq!(manager.adjust_language_complexity(Persona::Student, text), text);
    }

    #[test]
    fn test_word_jargon_replacement_is_case_insensitive() {
        let manager = PersonaManager::new(&default_weights(), JargonMatching::Word).unwrap();
        assert_eq!(
            manager.adjust_language_complexity(Persona::Seeker, "Justification and unrighteousness."),
            "being made right with God and unrighteousness."
        );
    }
}
