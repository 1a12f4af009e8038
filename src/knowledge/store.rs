//! In-memory knowledge set backed by the storage port.
//!
//! Every mutation rewrites the whole entry list under [`KNOWLEDGE_KEY`],
//! off the caller's thread via a [`StateWriter`]. Import replaces the set
//! wholesale; there is no merge.

use std::sync::Arc;

use serde_json::Value;

use super::defaults::default_entries;
use super::search::{self, RetrievalResult};
use super::types::{EntryDraft, KnowledgeEntry};
use crate::error::{EngineError, EngineResult, StorageError};
use crate::storage::{StateWriter, StoragePort, KNOWLEDGE_KEY};

pub struct KnowledgeStore {
    writer: StateWriter,
    entries: Vec<KnowledgeEntry>,
    last_persisted: Option<String>,
}

impl KnowledgeStore {
    /// Load the persisted list. Missing, unreadable, or corrupt data yields the
    /// seeded default set; nothing is written until the first mutation.
    pub fn load(storage: Arc<dyn StoragePort>) -> Self {
        let stored = match storage.get(KNOWLEDGE_KEY) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read knowledge base, using defaults");
                None
            }
        };

        let (entries, last_persisted) = match stored {
            Some(json) => match serde_json::from_str::<Vec<KnowledgeEntry>>(&json) {
                Ok(entries) => (entries, Some(json)),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "persisted knowledge base is corrupt, using defaults"
                    );
                    (default_entries(), None)
                }
            },
            None => (default_entries(), None),
        };

        tracing::info!(entries = entries.len(), "knowledge base loaded");
        Self {
            writer: StateWriter::new(storage),
            entries,
            last_persisted,
        }
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    /// Point-in-time copy for retrieval outside the owner's lock.
    pub fn snapshot(&self) -> Vec<KnowledgeEntry> {
        self.entries.clone()
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgeEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn retrieve(&self, query: &str, top_k: usize) -> Vec<RetrievalResult> {
        search::retrieve(&self.entries, query, top_k)
    }

    pub fn add(&mut self, draft: EntryDraft) -> EngineResult<KnowledgeEntry> {
        validate_draft(&draft)?;
        let entry = KnowledgeEntry {
            id: uuid::Uuid::now_v7().to_string(),
            title: draft.title.trim().to_string(),
            content: draft.content,
            category: draft.category.trim().to_string(),
            sources: draft.sources,
        };
        self.entries.push(entry.clone());
        self.persist();
        Ok(entry)
    }

    pub fn update(&mut self, id: &str, draft: EntryDraft) -> EngineResult<KnowledgeEntry> {
        validate_draft(&draft)?;
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| EngineError::EntryNotFound(id.to_string()))?;

        entry.title = draft.title.trim().to_string();
        entry.content = draft.content;
        entry.category = draft.category.trim().to_string();
        entry.sources = draft.sources;
        let updated = entry.clone();

        self.persist();
        Ok(updated)
    }

    pub fn delete(&mut self, id: &str) -> EngineResult<()> {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() == before {
            return Err(EngineError::EntryNotFound(id.to_string()));
        }
        self.persist();
        Ok(())
    }

    /// Replace everything with the seeded default set.
    pub fn reset_to_defaults(&mut self) {
        self.entries = default_entries();
        self.persist();
    }

    /// The full list as pretty-printed JSON.
    pub fn export_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(&self.entries)
            .map_err(|e| EngineError::Storage(StorageError::Serialization(e)))
    }

    /// Replace the in-memory set with the list in `json`. Returns the new entry count.
    ///
    /// The payload must be a JSON array of complete entries with unique ids and
    /// non-blank title and content. On any violation nothing changes.
    pub fn import_json(&mut self, json: &str) -> EngineResult<usize> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| EngineError::Validation(format!("import is not valid JSON: {e}")))?;
        if !value.is_array() {
            return Err(EngineError::Validation(
                "import must be a list of knowledge entries".into(),
            ));
        }

        let entries: Vec<KnowledgeEntry> = serde_json::from_value(value)
            .map_err(|e| EngineError::Validation(format!("invalid knowledge entry: {e}")))?;

        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            if entry.title.trim().is_empty() || entry.content.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "entry {} is missing a title or content",
                    entry.id
                )));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(EngineError::Validation(format!(
                    "duplicate entry id: {}",
                    entry.id
                )));
            }
        }

        let count = entries.len();
        self.entries = entries;
        self.persist();
        tracing::info!(entries = count, "knowledge base imported");
        Ok(count)
    }

    fn persist(&mut self) {
        let json = match serde_json::to_string(&self.entries) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize knowledge base");
                return;
            }
        };
        if self.last_persisted.as_deref() == Some(json.as_str()) {
            return;
        }
        self.writer.submit(KNOWLEDGE_KEY, json.clone());
        self.last_persisted = Some(json);
    }

    /// Block until every submitted snapshot has reached storage.
    pub fn flush(&self) {
        self.writer.flush();
    }
}

fn validate_draft(draft: &EntryDraft) -> EngineResult<()> {
    if draft.title.trim().is_empty() {
        return Err(EngineError::Validation("knowledge entry title is required".into()));
    }
    if draft.content.trim().is_empty() {
        return Err(EngineError::Validation("knowledge entry content is required".into()));
    }
    Ok(())
}
