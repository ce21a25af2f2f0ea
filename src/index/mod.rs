//! Scripture and topic indices.
//!
//! K_i: Indices are append-only maps owned by the coordinator.
//! Workers read an immutable snapshot and return an `IndexDelta` per item,
//! merged centrally after each batch.

mod scripture;

pub use scripture::*;

use crate::models::{SourceItem, SourceKind};
use crate::nlp::NlpContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Characters of context captured either side of a citation.
pub const CONTEXT_RADIUS: usize = 100;

/// Characters kept in item excerpts.
pub const EXCERPT_CHARS: usize = 200;

/// One recorded usage of a scripture reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptureEntry {
    pub content: String,
    pub context: String,
    pub source: String,
    pub themes: Vec<String>,
}

/// One recorded usage of a theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub source: String,
    pub excerpt: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
}

/// Index additions produced while generating one item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDelta {
    pub scripture: Vec<(String, ScriptureEntry)>,
    pub topic: Vec<(String, TopicEntry)>,
}

impl IndexDelta {
    /// Usages contributed by a processed item: its first two themes go to the
    /// topic index, each cited reference to the scripture index.
    pub fn for_item(item: &SourceItem, themes: &[String], source: &str) -> Self {
        let excerpt = excerpt(&item.content);

        let topic = themes
            .iter()
            .take(2)
            .map(|theme| {
                (
                    theme.clone(),
                    TopicEntry {
                        source: source.to_string(),
                        excerpt: excerpt.clone(),
                        kind: item.kind,
                    },
                )
            })
            .collect();

        let scripture = extract_scripture_references(&item.content)
            .into_iter()
            .map(|r| {
                (
                    r.full,
                    ScriptureEntry {
                        content: item.content.clone(),
                        context: excerpt.clone(),
                        source: source.to_string(),
                        themes: themes.iter().take(3).cloned().collect(),
                    },
                )
            })
            .collect();

        Self { scripture, topic }
    }

    pub fn is_empty(&self) -> bool {
        self.scripture.is_empty() && self.topic.is_empty()
    }
}

/// Reference → usages and theme → usages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indices {
    pub scripture: BTreeMap<String, Vec<ScriptureEntry>>,
    pub topic: BTreeMap<String, Vec<TopicEntry>>,
}

impl Indices {
    /// Scan one item's citations into the scripture index.
    ///
    /// Every match contributes an entry with its own context window and themes.
    pub fn index_item(&mut self, item: &SourceItem, nlp: &NlpContext) {
        let refs = extract_scripture_references(&item.content);
        if refs.is_empty() {
            return;
        }
        let source = source_citation(item);

        for r in refs {
            let context = context_window(&item.content, r.span, CONTEXT_RADIUS);
            let entry = ScriptureEntry {
                content: item.content.clone(),
                context: context.to_string(),
                source: source.clone(),
                themes: nlp.themes(context, 3),
            };
            self.scripture.entry(r.full).or_default().push(entry);
        }
    }

    /// Append a worker's delta. Repeats accumulate.
    pub fn merge(&mut self, delta: IndexDelta) {
        for (key, entry) in delta.scripture {
            self.scripture.entry(key).or_default().push(entry);
        }
        for (key, entry) in delta.topic {
            self.topic.entry(key).or_default().push(entry);
        }
    }

    /// Indexed usages of a reference (empty when unknown).
    pub fn scripture_usages(&self, reference: &str) -> &[ScriptureEntry] {
        self.scripture.get(reference).map_or(&[], Vec::as_slice)
    }

    pub fn contains_scripture(&self, reference: &str) -> bool {
        self.scripture.contains_key(reference)
    }
}

/// Citation appended to answers: the first scripture reference in the item,
/// else its bibliographic source.
pub fn source_citation(item: &SourceItem) -> String {
    match extract_scripture_references(&item.content).first() {
        Some(r) => format!("[SCRIPTURE: {}]", r.full),
        None => item.citation(),
    }
}

/// First 200 characters, with an ellipsis when truncated.
pub fn excerpt(content: &str) -> String {
    match content.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(content: &str) -> SourceItem {
        SourceItem::new(SourceKind::Book, content)
    }

    #[test]
    fn test_source_citation_prefers_scripture() {
        assert_eq!(
            source_citation(&item("Faith comes by hearing. Romans 10:17 confirms this.")),
            "[SCRIPTURE: Romans 10:17]"
        );
        assert!(source_citation(&item("No verses here.")).starts_with("[SOURCE: "));
    }

    #[test]
    fn test_excerpt_truncates_with_ellipsis() {
        let long = "a".repeat(250);
        let cut = excerpt(&long);
        assert_eq!(cut.len(), 203);
        assert!(cut.ends_with("..."));
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn test_index_item_accumulates_repeats() {
        let nlp = NlpContext::new(0.6);
        let mut indices = Indices::default();
        indices.index_item(&item("John 3:16 shows love. Later, John 3:16 again."), &nlp);
        indices.index_item(&item("God so loved the world, John 3:16."), &nlp);

        assert_eq!(indices.scripture_usages("John 3:16").len(), 3);
        assert!(indices.scripture_usages("Romans 1:1").is_empty());
    }

    #[test]
    fn test_delta_for_item_and_merge() {
        let themes = vec!["faith".to_string(), "hearing".to_string(), "word".to_string()];
        let source_item = item("Faith comes by hearing. Romans 10:17 confirms this.");
        let delta = IndexDelta::for_item(&source_item, &themes, "[SCRIPTURE: Romans 10:17]");

        assert_eq!(delta.topic.len(), 2);
        assert_eq!(delta.scripture.len(), 1);
        assert_eq!(delta.scripture[0].1.themes.len(), 3);

        let mut indices = Indices::default();
        indices.merge(delta.clone());
        indices.merge(delta);
        assert_eq!(indices.topic["faith"].len(), 2);
        assert!(indices.contains_scripture("Romans 10:17"));
    }
}
