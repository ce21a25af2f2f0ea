//! Source corpus records.
//!
//! K_i: A source item is immutable input. Everything downstream derives from it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Publication named in devotional citations when the record carries none.
pub const DEFAULT_DEVOTIONAL_PUBLICATION: &str = "Rhapsody of Realities";

/// Kind of source material.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Chapter of a book
    #[default]
    Book,
    /// Daily devotional entry
    #[serde(alias = "rhapsody")]
    Devotional,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Devotional => "devotional",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured citation metadata attached to a source item.
///
/// B_i: Corpora are loosely shaped. Every field is optional and unknown
/// fields are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_name: Option<String>,

    /// Chapter number or label (corpora store both)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<serde_json::Value>,

    #[serde(default, alias = "Topic", skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Reference {
    /// Chapter rendered for display ("Unknown Chapter" when absent).
    pub fn chapter_label(&self) -> String {
        match &self.chapter {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => "Unknown Chapter".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// A single item of the input corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    pub content: String,

    #[serde(rename = "type")]
    pub kind: SourceKind,

    #[serde(default)]
    pub reference: Reference,
}

impl SourceItem {
    pub fn new(kind: SourceKind, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind,
            reference: Reference::default(),
        }
    }

    /// Content-addressed identity of this item (hex SHA-256 of its JSON form).
    ///
    /// K_i: Equal items hash equal across runs, so checkpoints can skip them.
    pub fn content_hash(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_else(|_| self.content.clone());
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }

    /// Citation line appended to generated answers for items without scripture.
    pub fn citation(&self) -> String {
        let r = &self.reference;
        match self.kind {
            SourceKind::Book => {
                let book = r.book_name.as_deref().unwrap_or("Unknown Book");
                match r.topic.as_deref().filter(|t| !t.is_empty()) {
                    Some(topic) => {
                        format!("[SOURCE: {book}, Chapter {} - {topic}]", r.chapter_label())
                    }
                    None => format!("[SOURCE: {book}, Chapter {}]", r.chapter_label()),
                }
            }
            SourceKind::Devotional => {
                let publication = r
                    .publication
                    .as_deref()
                    .unwrap_or(DEFAULT_DEVOTIONAL_PUBLICATION);
                let date = r.date.as_deref().unwrap_or("Unknown Date");
                let topic = r
                    .topic
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .unwrap_or("Daily Devotional");
                format!("[SOURCE: {publication}, {date} - {topic}]")
            }
        }
    }
}
