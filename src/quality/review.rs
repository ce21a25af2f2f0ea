//! Pastoral review layer.
//!
//! Additive and idempotent: annotates dialogues with review flags, never
//! touches their content, and skips anything already annotated.

use crate::index::{Indices, extract_scripture_references};
use crate::models::{AutoFlags, Dialogue, PastoralReview};
use crate::nlp::NlpContext;
use std::collections::HashSet;

/// Core doctrines and the keywords that count as representing them.
pub const CORE_DOCTRINES: &[(&str, &[&str])] = &[
    ("trinity", &["father", "son", "holy spirit", "three persons", "one god"]),
    ("deity_of_christ", &["fully god", "fully man", "incarnation", "divine nature"]),
    ("salvation", &["grace through faith", "not by works", "redemption", "atonement"]),
    ("scripture", &["inspired", "inerrant", "authoritative", "sufficient"]),
];

pub const CRITICAL_PHRASES: &[&str] = &[
    "contradicts scripture",
    "denies the",
    "opposed to",
    "not necessary to",
    "doesn't matter if",
    "optional to believe",
];

pub const WARNING_PHRASES: &[&str] = &[
    "some believe",
    "could mean",
    "possibly",
    "might be interpreted as",
    "traditionally thought",
    "alternative view",
];

const WARNING_PENALTY: f64 = 0.1;
const CRITICAL_PENALTY: f64 = 0.3;
const SCRIPTURE_PENALTY: f64 = 0.4;

/// Books whose citations sit badly next to works-based salvation language.
const GRACE_BOOKS: &[&str] = &["john", "romans", "ephesians"];

/// Annotates dialogues for human review.
pub struct PastoralReviewer<'a> {
    nlp: &'a NlpContext,
    indices: &'a Indices,
}

impl<'a> PastoralReviewer<'a> {
    pub fn new(nlp: &'a NlpContext, indices: &'a Indices) -> Self {
        Self { nlp, indices }
    }

    /// Annotate every dialogue without a review. Returns how many were annotated.
    pub fn review_all(&self, dialogues: &mut [Dialogue]) -> usize {
        let mut reviewed = 0;
        for dialogue in dialogues.iter_mut() {
            if dialogue.pastoral_review.is_none() {
                dialogue.pastoral_review = Some(self.review(dialogue));
                reviewed += 1;
            }
        }
        reviewed
    }

    /// Review annotation for one dialogue.
    pub fn review(&self, dialogue: &Dialogue) -> PastoralReview {
        let mut flags = self.analyze(dialogue);
        flags.scripture_issues = self.verify_scriptures(dialogue);

        let has_issues = !flags.critical_issues.is_empty() || !flags.scripture_issues.is_empty();
        PastoralReview {
            needs_review: has_issues,
            validation_score: safety_score(&flags),
            reviewed: false,
            approved: if has_issues { Some(false) } else { None },
            auto_flags: flags,
        }
    }

    /// Doctrine coverage, sensitive phrases and testament balance.
    pub fn analyze(&self, dialogue: &Dialogue) -> AutoFlags {
        let mut flags = AutoFlags::default();
        let text = dialogue.joined_text().to_lowercase();

        for (doctrine, keywords) in CORE_DOCTRINES {
            let represented = keywords.iter().any(|k| text.contains(k));
            let mentioned = text.contains(&doctrine.replace('_', " "));
            if mentioned && !represented {
                flags
                    .warnings
                    .push(format!("incomplete_{doctrine}_representation"));
            }
            let status = if represented { "covered" } else { "missing" };
            flags.doctrine_coverage.push(format!("{doctrine}:{status}"));
        }

        for turn in &dialogue.turns {
            let content = turn.content.to_lowercase();
            for phrase in CRITICAL_PHRASES.iter().filter(|p| content.contains(*p)) {
                flags.critical_issues.push(format!("critical_phrase|{phrase}"));
            }
            for phrase in WARNING_PHRASES.iter().filter(|p| content.contains(*p)) {
                flags.warnings.push(format!("ambiguous_phrase|{phrase}"));
            }
        }

        if text.contains("only old testament") && !text.contains("new testament") {
            flags.warnings.push("old_testament_focus".to_string());
        }
        if text.contains("only new testament") && !text.contains("old testament") {
            flags.warnings.push("new_testament_focus".to_string());
        }

        flags
    }

    /// Cross-check every cited reference against the index.
    pub fn verify_scriptures(&self, dialogue: &Dialogue) -> Vec<String> {
        let text = dialogue.joined_text();
        let references = extract_scripture_references(&text);
        if references.is_empty() {
            return vec!["no_scripture_references".to_string()];
        }

        let lower = text.to_lowercase();
        let mut dialogue_themes: Option<HashSet<String>> = None;
        let mut issues = Vec::new();

        for reference in references {
            let usages = self.indices.scripture_usages(&reference.full);
            if usages.is_empty() {
                issues.push(format!("unverified_verse|{}", reference.full));
                continue;
            }

            let themes = dialogue_themes
                .get_or_insert_with(|| self.nlp.themes(&text, 5).into_iter().collect());
            let context_match = usages
                .iter()
                .flat_map(|u| u.themes.iter())
                .any(|t| themes.contains(t));
            if !context_match {
                issues.push(format!("context_mismatch|{}", reference.full));
            }

            if !theologically_aligned(&reference.book, &reference.full, &lower) {
                issues.push(format!("theological_misalignment|{}", reference.full));
            }
        }

        issues
    }
}

/// Special-case rules for verses that are easily misused.
fn theologically_aligned(book: &str, reference: &str, lower_text: &str) -> bool {
    let book = book.to_lowercase();
    if GRACE_BOOKS.iter().any(|b| book.contains(b)) && lower_text.contains("works-based salvation")
    {
        return false;
    }

    match reference {
        "James 2:24" => {
            !(lower_text.contains("justified by works") && lower_text.contains("not by faith alone"))
        }
        "Matthew 24:36" => {
            !(lower_text.contains("did not know") && lower_text.contains("limited knowledge"))
        }
        _ => true,
    }
}

/// 1.0 minus fixed per-class penalties, clamped to [0, 1].
pub fn safety_score(flags: &AutoFlags) -> f64 {
    let score = 1.0
        - flags.warnings.len() as f64 * WARNING_PENALTY
        - flags.critical_issues.len() as f64 * CRITICAL_PENALTY
        - flags.scripture_issues.len() as f64 * SCRIPTURE_PENALTY;
    score.clamp(0.0, 1.0)
}
