//! Optional paraphrasing collaborator.
//!
//! I^B: A remote paraphraser can fail arbitrarily → callers always fall back
//! to the original text.

use crate::models::Result;

/// Terms whose capitalization must survive paraphrasing.
pub const PRESERVED_TERMS: &[&str] = &["Christ", "God", "Holy Spirit", "salvation", "faith", "grace"];

/// Longest input sent for paraphrasing, in characters.
pub const MAX_PARAPHRASE_INPUT: usize = 400;

/// Meaning-preserving rewrite of a short text.
///
/// Implementations are called from blocking worker threads.
pub trait Paraphraser: Send + Sync {
    fn paraphrase(&self, text: &str) -> Result<String>;
}

/// Paraphrase through `paraphraser`, or return `text` unchanged on absence or failure.
pub fn paraphrase_or_original(paraphraser: Option<&dyn Paraphraser>, text: &str) -> String {
    let Some(paraphraser) = paraphraser else {
        return text.to_string();
    };

    let input: String = text.chars().take(MAX_PARAPHRASE_INPUT).collect();
    match paraphraser.paraphrase(&input) {
        Ok(rewritten) if !rewritten.trim().is_empty() => restore_key_terms(&input, rewritten.trim()),
        Ok(_) => text.to_string(),
        Err(e) => {
            tracing::debug!(error = %e, "Paraphrase failed, keeping original text");
            text.to_string()
        }
    }
}

/// Re-capitalize preserved terms that appear in `original` but were lowercased.
pub fn restore_key_terms(original: &str, paraphrased: &str) -> String {
    let mut result = paraphrased.to_string();
    for term in PRESERVED_TERMS {
        if original.contains(term) && !result.contains(term) {
            result = result.replace(&term.to_lowercase(), term);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColloquyError, ParaphraseError};

    struct Lowercaser;

    impl Paraphraser for Lowercaser {
        fn paraphrase(&self, text: &str) -> Result<String> {
            Ok(text.to_lowercase())
        }
    }

    struct Broken;

    impl Paraphraser for Broken {
        fn paraphrase(&self, _: &str) -> Result<String> {
            Err(ParaphraseError::InvalidResponse("empty choices".into()).into())
        }
    }

    #[test]
    fn test_absent_paraphraser_passes_through() {
        assert_eq!(paraphrase_or_original(None, "Grace abounds."), "Grace abounds.");
    }

    #[test]
    fn test_failure_falls_back_to_original() {
        let broken = Broken;
        assert_eq!(
            paraphrase_or_original(Some(&broken), "Walk in the Spirit."),
            "Walk in the Spirit."
        );
        assert!(matches!(
            broken.paraphrase("x"),
            Err(ColloquyError::Paraphrase(_))
        ));
    }

    #[test]
    fn test_key_terms_are_recapitalized() {
        let out = paraphrase_or_original(Some(&Lowercaser), "Christ reveals God to us.");
        assert_eq!(out, "Christ reveals God to us.");
    }
}
