//! Rule-based theological acceptability checks for generated answers.
//!
//! B_i: Heuristic only. A pass means "no rule fired", not "correct".

use crate::index::{Indices, extract_scripture_references};
use crate::nlp::NlpContext;
use std::collections::HashSet;
use std::fmt;

/// Phrases that always raise a concern.
pub const RED_FLAGS: &[&str] = &[
    "prosperity only",
    "works-based salvation",
    "denying trinity",
    "universalism",
    "antinomianism",
    "legalism",
    "gnosticism",
];

/// Core concepts and the markers expected alongside them.
pub const CORE_CONCEPTS: &[(&str, &[&str])] = &[
    ("salvation", &["grace", "faith", "not works", "gift", "eternal life"]),
    ("trinity", &["father", "son", "holy spirit", "three persons", "one god"]),
    ("christ", &["deity", "humanity", "savior", "lord", "mediator"]),
    ("scripture", &["inspired", "authoritative", "sufficient", "inerrant"]),
    ("grace", &["unmerited favor", "empowerment", "divine ability"]),
    ("faith", &["trust", "belief", "substance", "evidence"]),
];

/// A rule that fired against a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    PotentialContradiction,
    QuestionableScriptureUse(String),
    TheologicalConcern(&'static str),
    IncompleteRepresentation(&'static str),
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PotentialContradiction => f.write_str("potential_contradiction_with_source"),
            Self::QuestionableScriptureUse(r) => write!(f, "questionable_scripture_use: {r}"),
            Self::TheologicalConcern(p) => write!(f, "theological_concern: {p}"),
            Self::IncompleteRepresentation(c) => write!(f, "incomplete_{c}_representation"),
        }
    }
}

/// Outcome of validating one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub issues: Vec<ValidationIssue>,
}

impl Validation {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn tags(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

/// Validates answers against their source and the scripture index.
#[derive(Debug, Clone)]
pub struct TheologicalValidator {
    contradiction_threshold: f32,
}

impl TheologicalValidator {
    pub fn new(contradiction_threshold: f32) -> Self {
        Self {
            contradiction_threshold,
        }
    }

    pub fn validate(
        &self,
        response: &str,
        source_content: &str,
        nlp: &NlpContext,
        indices: &Indices,
    ) -> Validation {
        let mut issues = Vec::new();

        if self.contains_contradiction(response, source_content, nlp) {
            issues.push(ValidationIssue::PotentialContradiction);
        }

        for reference in extract_scripture_references(response) {
            if !scripture_context_matches(&reference.full, response, nlp, indices) {
                issues.push(ValidationIssue::QuestionableScriptureUse(reference.full));
            }
        }

        let lower = response.to_lowercase();
        issues.extend(
            RED_FLAGS
                .iter()
                .filter(|flag| lower.contains(*flag))
                .map(|flag| ValidationIssue::TheologicalConcern(*flag)),
        );

        for (concept, markers) in CORE_CONCEPTS {
            if lower.contains(concept) && !markers.iter().any(|m| lower.contains(m)) {
                issues.push(ValidationIssue::IncompleteRepresentation(*concept));
            }
        }

        Validation { issues }
    }

    /// Any pair of claims whose similarity falls below the threshold.
    fn contains_contradiction(&self, response: &str, source: &str, nlp: &NlpContext) -> bool {
        let response_claims = extract_claims(response, nlp);
        if response_claims.is_empty() {
            return false;
        }
        let source_claims = extract_claims(source, nlp);

        response_claims.iter().any(|r| {
            source_claims
                .iter()
                .any(|s| nlp.similarity(r, s) < self.contradiction_threshold)
        })
    }
}

impl Default for TheologicalValidator {
    fn default() -> Self {
        Self::new(-0.3)
    }
}

/// Declarative sentences that mention a core concept.
pub fn extract_claims<'t>(text: &'t str, nlp: &NlpContext) -> Vec<&'t str> {
    nlp.segmenter
        .sentences(text)
        .into_iter()
        .filter(|s| nlp.segmenter.is_declarative(s))
        .filter(|s| {
            let lower = s.to_lowercase();
            CORE_CONCEPTS.iter().any(|(c, _)| lower.contains(c))
        })
        .collect()
}

/// Whether a response's themes overlap any indexed usage of `reference`.
///
/// References absent from the index get the benefit of the doubt.
fn scripture_context_matches(
    reference: &str,
    response: &str,
    nlp: &NlpContext,
    indices: &Indices,
) -> bool {
    let usages = indices.scripture_usages(reference);
    if usages.is_empty() {
        return true;
    }

    let response_themes: HashSet<String> = nlp.themes(response, 3).into_iter().collect();
    usages
        .iter()
        .any(|u| u.themes.iter().any(|t| response_themes.contains(t)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ScriptureEntry;

    fn validate(response: &str, indices: &Indices) -> Validation {
        let nlp = NlpContext::new(0.6);
        TheologicalValidator::default().validate(response, "Grace is a gift.", &nlp, indices)
    }

    #[test]
    fn test_clean_response_passes() {
        let v = validate("Walk in love every day.", &Indices::default());
        assert!(v.passed(), "{:?}", v.tags());
    }

    #[test]
    fn test_red_flag_and_incomplete_concept() {
        let v = validate("Legalism misunderstands salvation.", &Indices::default());
        let tags = v.tags();
        assert!(tags.contains(&"theological_concern: legalism".to_string()));
        assert!(tags.contains(&"incomplete_salvation_representation".to_string()));
        assert!(!v.passed());
    }

    #[test]
    fn test_markers_are_case_insensitive() {
        let v = validate("The trinity is Father, Son and Holy Spirit.", &Indices::default());
        assert!(
            !v.tags().contains(&"incomplete_trinity_representation".to_string()),
            "{:?}",
            v.tags()
        );
    }

    #[test]
    fn test_unindexed_reference_gets_benefit_of_doubt() {
        let v = validate("James 2:24 speaks of works and love.", &Indices::default());
        assert!(
            !v.tags().iter().any(|t| t.starts_with("questionable_scripture_use")),
            "{:?}",
            v.tags()
        );
    }

    #[test]
    fn test_indexed_reference_without_theme_overlap_is_flagged() {
        let mut indices = Indices::default();
        indices.scripture.insert(
            "John 3:16".into(),
            vec![ScriptureEntry {
                content: String::new(),
                context: String::new(),
                source: String::new(),
                themes: vec!["unrelated banquet logistics".into()],
            }],
        );
        let v = validate("John 3:16 shows love for the world.", &indices);
        assert!(v.tags().contains(&"questionable_scripture_use: John 3:16".to_string()));
    }

    #[test]
    fn test_contradiction_uses_threshold() {
        let nlp = NlpContext::new(0.6);
        let strict = TheologicalValidator::new(1.1);
        let v = strict.validate(
            "Faith is trust in God's word.",
            "Salvation is received by grace.",
            &nlp,
            &Indices::default(),
        );
        assert!(v.issues.contains(&ValidationIssue::PotentialContradiction));

        let lenient = TheologicalValidator::new(-1.1);
        let v = lenient.validate(
            "Faith is trust in God's word.",
            "Salvation is received by grace.",
            &nlp,
            &Indices::default(),
        );
        assert!(!v.issues.contains(&ValidationIssue::PotentialContradiction));
    }
}
