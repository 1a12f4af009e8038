//! Knowledge entry definitions.

use serde::{Deserialize, Serialize};

/// A curated markdown snippet used to augment prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Unique within the store.
    pub id: String,
    pub title: String,
    /// Markdown body.
    pub content: String,
    /// Matched exactly (case-insensitive) against query tokens during retrieval.
    pub category: String,
    /// Free-form citation text shown alongside the content.
    pub sources: String,
}

/// Fields supplied when creating or editing an entry. The id is assigned by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sources: String,
}

impl EntryDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn sources(mut self, sources: impl Into<String>) -> Self {
        self.sources = sources.into();
        self
    }
}
