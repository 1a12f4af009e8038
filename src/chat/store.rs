//! Source of truth for chat sessions and folders.
//!
//! The full `{sessions, folders}` set is written to [`SESSIONS_KEY`] after
//! every mutation, in the background through a [`StateWriter`]. Writes are
//! best-effort: a failed write is logged and the in-memory state stays
//! authoritative. A snapshot identical to the last one submitted is skipped,
//! so persisting twice is invisible from outside.
//!
//! The store always holds at least one session and always has an active one.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::grouping::{self, SessionGroup};
use super::types::{derive_title, ChatFolder, ChatSession, Message, Role, GREETING};
use crate::error::{EngineError, EngineResult};
use crate::storage::{StateWriter, StoragePort, SESSIONS_KEY};

#[derive(Debug, Default, Deserialize)]
struct PersistedState {
    #[serde(default)]
    sessions: Vec<ChatSession>,
    #[serde(default)]
    folders: Vec<ChatFolder>,
}

#[derive(Serialize)]
struct PersistedStateRef<'a> {
    sessions: &'a [ChatSession],
    folders: &'a [ChatFolder],
}

pub struct SessionStore {
    writer: StateWriter,
    sessions: Vec<ChatSession>,
    folders: Vec<ChatFolder>,
    active_id: String,
    last_persisted: Option<String>,
}

impl SessionStore {
    /// Load persisted sessions and folders.
    ///
    /// Unreadable or malformed data is treated as an empty state. Sessions
    /// filed under a folder that no longer exists are dropped. If nothing is
    /// left a fresh session is created; otherwise the most recently updated
    /// session becomes active.
    pub fn load(storage: Arc<dyn StoragePort>) -> Self {
        let stored = match storage.get(SESSIONS_KEY) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read chat sessions, starting empty");
                None
            }
        };

        let (state, last_persisted) = match stored {
            Some(json) => match serde_json::from_str::<PersistedState>(&json) {
                Ok(state) => (state, Some(json)),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "persisted chat sessions are corrupt, starting empty"
                    );
                    (PersistedState::default(), None)
                }
            },
            None => (PersistedState::default(), None),
        };

        let mut store = Self {
            writer: StateWriter::new(storage),
            sessions: state.sessions,
            folders: state.folders,
            active_id: String::new(),
            last_persisted,
        };
        store.normalize();
        store.ensure_active();
        store.persist();

        tracing::info!(
            sessions = store.sessions.len(),
            folders = store.folders.len(),
            active = %store.active_id,
            "chat sessions loaded"
        );
        store
    }

    fn normalize(&mut self) {
        let folder_ids: HashSet<&str> = self.folders.iter().map(|f| f.id.as_str()).collect();
        let before = self.sessions.len();
        self.sessions.retain(|s| match &s.folder_id {
            Some(folder_id) => folder_ids.contains(folder_id.as_str()),
            None => true,
        });
        let dropped = before - self.sessions.len();
        if dropped > 0 {
            tracing::warn!(dropped, "removed sessions filed under missing folders");
        }

        for session in self.sessions.iter_mut().filter(|s| s.messages.is_empty()) {
            session.messages.push(Message::assistant(GREETING));
        }
    }

    /// Keep `active_id` pointing at a live session, creating one if none remain.
    fn ensure_active(&mut self) {
        if self.sessions.iter().any(|s| s.id == self.active_id) {
            return;
        }
        match self.sessions.iter().max_by_key(|s| s.updated_at) {
            Some(latest) => self.active_id = latest.id.clone(),
            None => {
                let session = ChatSession::new(None, Utc::now());
                self.active_id = session.id.clone();
                self.sessions.push(session);
            }
        }
    }

    fn persist(&mut self) {
        let state = PersistedStateRef {
            sessions: &self.sessions,
            folders: &self.folders,
        };
        let json = match serde_json::to_string(&state) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize chat sessions");
                return;
            }
        };
        if self.last_persisted.as_deref() == Some(json.as_str()) {
            return;
        }
        self.writer.submit(SESSIONS_KEY, json.clone());
        self.last_persisted = Some(json);
    }

    /// Block until every submitted snapshot has reached storage.
    pub fn flush(&self) {
        self.writer.flush();
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn session(&self, id: &str) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Folders sorted by name, case-insensitively.
    pub fn folders(&self) -> Vec<&ChatFolder> {
        let mut folders: Vec<&ChatFolder> = self.folders.iter().collect();
        folders.sort_by_key(|f| f.name.to_lowercase());
        folders
    }

    pub fn folder(&self, id: &str) -> Option<&ChatFolder> {
        self.folders.iter().find(|f| f.id == id)
    }

    pub fn active_session_id(&self) -> &str {
        &self.active_id
    }

    pub fn active_session(&self) -> Option<&ChatSession> {
        self.session(&self.active_id)
    }

    /// Sessions filed under `folder_id`, newest first.
    pub fn sessions_in_folder(&self, folder_id: &str) -> Vec<&ChatSession> {
        let mut sessions: Vec<&ChatSession> = self
            .sessions
            .iter()
            .filter(|s| s.folder_id.as_deref() == Some(folder_id))
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Recency buckets for unfoldered sessions. See [`grouping::group_for_display`].
    pub fn group_for_display<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<SessionGroup<'_>> {
        grouping::group_for_display(&self.sessions, now)
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    pub fn set_active(&mut self, id: &str) -> EngineResult<()> {
        self.require_session(id)?;
        self.active_id = id.to_string();
        Ok(())
    }

    /// Create a session (optionally inside an existing folder) and make it active.
    pub fn create_session(&mut self, folder_id: Option<&str>) -> EngineResult<ChatSession> {
        if let Some(folder_id) = folder_id {
            self.require_folder(folder_id)?;
        }
        let session = ChatSession::new(folder_id.map(str::to_string), Utc::now());
        self.active_id = session.id.clone();
        self.sessions.push(session.clone());
        self.persist();

        tracing::debug!(session_id = %session.id, "session created");
        Ok(session)
    }

    pub fn create_folder(&mut self, name: &str) -> EngineResult<ChatFolder> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("folder name must not be blank".into()));
        }
        let folder = ChatFolder {
            id: uuid::Uuid::now_v7().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.folders.push(folder.clone());
        self.persist();
        Ok(folder)
    }

    pub fn rename_session(&mut self, id: &str, title: &str) -> EngineResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(EngineError::Validation("session title must not be blank".into()));
        }
        let session = self.session_mut(id)?;
        session.title = title.to_string();
        self.persist();
        Ok(())
    }

    pub fn rename_folder(&mut self, id: &str, name: &str) -> EngineResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("folder name must not be blank".into()));
        }
        let folder = self
            .folders
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| EngineError::FolderNotFound(id.to_string()))?;
        folder.name = name.to_string();
        self.persist();
        Ok(())
    }

    /// File a session under a folder, or take it out of one with `None`.
    pub fn move_session(&mut self, id: &str, folder_id: Option<&str>) -> EngineResult<()> {
        if let Some(folder_id) = folder_id {
            self.require_folder(folder_id)?;
        }
        let session = self.session_mut(id)?;
        session.folder_id = folder_id.map(str::to_string);
        session.updated_at = Utc::now();
        self.persist();
        Ok(())
    }

    /// Delete a session. Returns the id of the active session afterwards.
    ///
    /// Deleting the active session activates the most recently updated one
    /// left, or a fresh session if none remain.
    pub fn delete_session(&mut self, id: &str) -> EngineResult<String> {
        self.require_session(id)?;
        self.sessions.retain(|s| s.id != id);
        self.ensure_active();
        self.persist();
        Ok(self.active_id.clone())
    }

    /// Delete a folder and every session filed under it. Returns how many sessions went with it.
    pub fn delete_folder(&mut self, id: &str) -> EngineResult<usize> {
        self.require_folder(id)?;
        self.folders.retain(|f| f.id != id);

        let before = self.sessions.len();
        self.sessions.retain(|s| s.folder_id.as_deref() != Some(id));
        let removed = before - self.sessions.len();

        self.ensure_active();
        self.persist();
        tracing::debug!(folder_id = %id, removed, "folder deleted");
        Ok(removed)
    }

    /// Append messages in order and bump `updated_at`.
    ///
    /// The title is derived from the first user message, and only while
    /// appending that message. A session the user later renames to the
    /// default title keeps it.
    pub fn append_messages(
        &mut self,
        session_id: &str,
        messages: Vec<Message>,
    ) -> EngineResult<()> {
        let session = self.session_mut(session_id)?;
        let had_user_message = session.messages.iter().any(|m| m.role == Role::User);
        session.messages.extend(messages);
        if !had_user_message && session.has_default_title() {
            if let Some(title) = derive_title(&session.messages) {
                session.title = title;
            }
        }
        session.updated_at = Utc::now();
        self.persist();
        Ok(())
    }

    /// Replace the text of the user message at `index`. The only in-place edit allowed.
    pub fn edit_user_message(
        &mut self,
        session_id: &str,
        index: usize,
        content: &str,
    ) -> EngineResult<()> {
        if content.trim().is_empty() {
            return Err(EngineError::Validation("message must not be blank".into()));
        }
        let session = self.session_mut(session_id)?;
        let message = session.messages.get_mut(index).ok_or_else(|| {
            EngineError::Validation(format!("session has no message at index {index}"))
        })?;
        if message.role != Role::User {
            return Err(EngineError::Validation(format!(
                "only user messages can be edited, message {index} is {}",
                message.role
            )));
        }
        message.content = content.to_string();
        session.updated_at = Utc::now();
        self.persist();
        Ok(())
    }

    fn session_mut(&mut self, id: &str) -> EngineResult<&mut ChatSession> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    fn require_session(&self, id: &str) -> EngineResult<()> {
        self.session(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::SessionNotFound(id.to_string()))
    }

    fn require_folder(&self, id: &str) -> EngineResult<()> {
        self.folder(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::FolderNotFound(id.to_string()))
    }
}
