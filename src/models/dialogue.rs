//! Dialogue records produced by the generator.
//!
//! K_i: These types are the output contract. Field names match the JSON
//! emitted to downstream fine-tuning jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Schema version stamped into dialogue metadata.
pub const DIALOGUE_SCHEMA_VERSION: &str = "2.0";

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// The role expected to speak after this one.
    pub fn next(self) -> Self {
        match self {
            Self::User => Self::Assistant,
            Self::Assistant => Self::User,
        }
    }
}

/// One utterance in a dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Behavioral archetype of the simulated asker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Seeker,
    Student,
    MatureBeliever,
}

impl Persona {
    pub const ALL: [Persona; 3] = [Self::Seeker, Self::Student, Self::MatureBeliever];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seeker => "seeker",
            Self::Student => "student",
            Self::MatureBeliever => "mature_believer",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seeker" => Ok(Self::Seeker),
            "student" => Ok(Self::Student),
            "mature_believer" | "mature" => Ok(Self::MatureBeliever),
            other => Err(format!("unknown persona: {other}")),
        }
    }
}

/// Difficulty of the source material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Introductory,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Introductory => "introductory",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four-factor coherence breakdown.
///
/// K_i: Every field lies in [0, 1] and `overall` is the fixed weighted sum
/// of the other four.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub overall: f64,
    pub topic_consistency: f64,
    pub answer_relevance: f64,
    pub depth_progression: f64,
    pub semantic_flow: f64,
}

/// Metadata stamped by post-processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueMetadata {
    pub generation_date: DateTime<Utc>,
    pub quality_scores: QualityMetrics,
    pub persona_used: Persona,
    pub validated: bool,
    pub version: String,
}

/// Flags raised by the pastoral review layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoFlags {
    #[serde(default)]
    pub critical_issues: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub scripture_issues: Vec<String>,
    #[serde(default)]
    pub doctrine_coverage: Vec<String>,
}

/// Review annotation. Added once, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PastoralReview {
    pub needs_review: bool,
    pub auto_flags: AutoFlags,
    pub validation_score: f64,
    pub reviewed: bool,
    /// `Some(false)` when issues were found, `None` while awaiting a human.
    pub approved: Option<bool>,
}

/// A finished synthetic dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dialogue {
    pub dialogue_id: String,
    pub source: String,
    pub difficulty_level: Difficulty,
    pub key_themes: Vec<String>,
    pub persona: Persona,
    pub turns: Vec<Turn>,
    pub coherence_score: f64,
    pub quality_metrics: QualityMetrics,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DialogueMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pastoral_review: Option<PastoralReview>,
}

impl Dialogue {
    /// Primary theme used for diversity grouping.
    pub fn primary_theme(&self) -> &str {
        self.key_themes
            .first()
            .map(String::as_str)
            .unwrap_or("general")
    }

    /// Whether turns start with the user and strictly alternate.
    pub fn roles_alternate(&self) -> bool {
        let mut expected = Role::User;
        for turn in &self.turns {
            if turn.role != expected {
                return false;
            }
            expected = expected.next();
        }
        true
    }

    /// All turn contents joined by single spaces.
    pub fn joined_text(&self) -> String {
        self.turns
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Summary of a generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub items: usize,
    pub skipped_from_checkpoint: usize,
    pub generated: usize,
    pub dropped: usize,
    pub kept_after_quality_gate: usize,
    pub selected: usize,
    pub flagged_for_review: usize,
    pub diversity_score: f64,
    pub runtime_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_round_trips_through_str() {
        for persona in Persona::ALL {
            assert_eq!(persona.as_str().parse::<Persona>().unwrap(), persona);
        }
        assert!("skeptic".parse::<Persona>().is_err());
    }

    #[test]
    fn test_persona_serializes_snake_case() {
        let json = serde_json::to_string(&Persona::MatureBeliever).unwrap();
        assert_eq!(json, "\"mature_believer\"");
    }

    #[test]
    fn test_roles_alternate() {
        let metrics = QualityMetrics {
            overall: 0.5,
            topic_consistency: 0.5,
            answer_relevance: 0.5,
            depth_progression: 0.5,
            semantic_flow: 0.5,
        };
        let mut dialogue = Dialogue {
            dialogue_id: "book_grace_1".into(),
            source: "[SOURCE: Book, Chapter 1]".into(),
            difficulty_level: Difficulty::Introductory,
            key_themes: vec![],
            persona: Persona::Student,
            turns: vec![Turn::user("Q"), Turn::assistant("A"), Turn::user("Q2")],
            coherence_score: 0.5,
            quality_metrics: metrics,
            metadata: None,
            pastoral_review: None,
        };
        assert!(dialogue.roles_alternate());
        assert_eq!(dialogue.primary_theme(), "general");

        dialogue.turns.swap(0, 1);
        assert!(!dialogue.roles_alternate());
    }

    #[test]
    fn test_optional_sections_omitted_from_json() {
        let dialogue = Dialogue {
            dialogue_id: "x".into(),
            source: "s".into(),
            difficulty_level: Difficulty::Advanced,
            key_themes: vec!["grace".into()],
            persona: Persona::Seeker,
            turns: vec![],
            coherence_score: 0.0,
            quality_metrics: QualityMetrics {
                overall: 0.0,
                topic_consistency: 0.0,
                answer_relevance: 0.0,
                depth_progression: 0.0,
                semantic_flow: 0.0,
            },
            metadata: None,
            pastoral_review: None,
        };
        let value = serde_json::to_value(&dialogue).unwrap();
        assert!(value.get("pastoral_review").is_none());
        assert_eq!(value["difficulty_level"], "advanced");
    }
}
