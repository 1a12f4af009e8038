//! The send pipeline: one user message in, one assistant message out.
//!
//! ```text
//! user text ─▶ domain gate ──(off-topic)──▶ canned redirect, no model call
//!                  │
//!                  ▼
//!          append to session ─▶ retrieve knowledge ─▶ compose prompt
//!                                                          │
//!                                                          ▼
//!          append reply or error  ◀──────────────  model orchestrator
//! ```
//!
//! Each session is `Idle`, `Sending`, or settled (`Succeeded`/`Failed`). A
//! send for a session that is already `Sending` is rejected, so appends for
//! one session happen strictly in order. Different sessions are independent.
//! Dropping an in-flight send future releases the session back to `Idle`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::prompt::{is_health_related, PromptComposer, OUT_OF_DOMAIN_REPLY};
use super::store::SessionStore;
use super::types::Message;
use crate::config::{RetrievalConfig, VitalConfig};
use crate::error::{EngineError, EngineResult, FailureKind};
use crate::knowledge::{KnowledgeStore, RetrievalResult};
use crate::model::{InferenceBackend, ModelOrchestrator};
use crate::storage::StoragePort;

/// Per-session send state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendState {
    Idle,
    Sending,
    Succeeded,
    Failed,
}

/// What a send produced. The transcript already reflects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SendOutcome {
    /// The model answered.
    Replied {
        reply: String,
        model: String,
        /// Ids of the knowledge entries added to the prompt.
        context_ids: Vec<String>,
    },
    /// Off-topic question; the canned redirect was recorded and no model was called.
    Redirected { reply: String },
    /// The model call failed; `message` was recorded as the assistant reply.
    Failed { failure: FailureKind, message: String },
}

pub struct ChatEngine {
    sessions: Mutex<SessionStore>,
    knowledge: Mutex<KnowledgeStore>,
    models: ModelOrchestrator,
    composer: PromptComposer,
    retrieval: RetrievalConfig,
    send_states: Mutex<HashMap<String, SendState>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a session `Sending` for as long as it lives.
struct SendGuard<'a> {
    states: &'a Mutex<HashMap<String, SendState>>,
    session_id: String,
    settled: bool,
}

impl SendGuard<'_> {
    fn settle(mut self, state: SendState) {
        lock(self.states).insert(self.session_id.clone(), state);
        self.settled = true;
    }

    /// The session went away mid-send; forget it instead of settling.
    fn discard(mut self) {
        lock(self.states).remove(&self.session_id);
        self.settled = true;
    }
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            lock(self.states).insert(self.session_id.clone(), SendState::Idle);
        }
    }
}

impl ChatEngine {
    /// Load sessions and knowledge from `storage` and wire up the model backend.
    pub fn new(
        storage: Arc<dyn StoragePort>,
        backend: Arc<dyn InferenceBackend>,
        config: &VitalConfig,
    ) -> Self {
        Self::from_parts(
            SessionStore::load(Arc::clone(&storage)),
            KnowledgeStore::load(storage),
            ModelOrchestrator::from_config(backend, &config.model),
            config.retrieval.clone(),
        )
    }

    pub fn from_parts(
        sessions: SessionStore,
        knowledge: KnowledgeStore,
        models: ModelOrchestrator,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            sessions: Mutex::new(sessions),
            knowledge: Mutex::new(knowledge),
            models,
            composer: PromptComposer::default(),
            retrieval,
            send_states: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_composer(mut self, composer: PromptComposer) -> Self {
        self.composer = composer;
        self
    }

    /// Exclusive access to the session store. Do not hold across an `.await`.
    pub fn sessions(&self) -> MutexGuard<'_, SessionStore> {
        lock(&self.sessions)
    }

    /// Exclusive access to the knowledge store. Do not hold across an `.await`.
    pub fn knowledge(&self) -> MutexGuard<'_, KnowledgeStore> {
        lock(&self.knowledge)
    }

    pub fn models(&self) -> &ModelOrchestrator {
        &self.models
    }

    /// Number of sessions with a recorded send state.
    pub fn tracked_send_states(&self) -> usize {
        lock(&self.send_states).len()
    }

    pub fn send_state(&self, session_id: &str) -> SendState {
        lock(&self.send_states)
            .get(session_id)
            .copied()
            .unwrap_or(SendState::Idle)
    }

    fn begin_send(&self, session_id: &str) -> EngineResult<SendGuard<'_>> {
        let mut states = lock(&self.send_states);
        if states.get(session_id) == Some(&SendState::Sending) {
            return Err(EngineError::SendInProgress(session_id.to_string()));
        }
        states.insert(session_id.to_string(), SendState::Sending);
        Ok(SendGuard {
            states: &self.send_states,
            session_id: session_id.to_string(),
            settled: false,
        })
    }

    /// Delete a session and forget its send state. Returns the new active id.
    pub fn delete_session(&self, id: &str) -> EngineResult<String> {
        let active = self.sessions().delete_session(id)?;
        self.prune_send_states();
        Ok(active)
    }

    /// Delete a folder with its sessions. Returns how many sessions went with it.
    pub fn delete_folder(&self, id: &str) -> EngineResult<usize> {
        let removed = self.sessions().delete_folder(id)?;
        self.prune_send_states();
        Ok(removed)
    }

    /// Drop settled states for sessions that no longer exist. An in-flight
    /// send keeps its entry until its guard resolves it.
    fn prune_send_states(&self) {
        let sessions = self.sessions();
        lock(&self.send_states)
            .retain(|id, state| *state == SendState::Sending || sessions.session(id).is_some());
    }

    /// Block until queued session and knowledge writes reach storage.
    pub fn flush(&self) {
        self.sessions().flush();
        self.knowledge().flush();
    }

    /// Knowledge to splice into the prompt for `query`, from a point-in-time snapshot.
    pub fn retrieve_context(&self, query: &str) -> Vec<RetrievalResult> {
        if !self.retrieval.enabled {
            return Vec::new();
        }
        self.knowledge().retrieve(query, self.retrieval.max_results)
    }

    /// Run the full pipeline for one user message.
    ///
    /// Returns `Err` only for blank input, an unknown session, or a send
    /// already in flight for the same session. Backend trouble is reported as
    /// [`SendOutcome::Failed`] with an explanatory assistant message appended.
    pub async fn send_message(&self, session_id: &str, text: &str) -> EngineResult<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::Validation("message must not be blank".into()));
        }
        if self.sessions().session(session_id).is_none() {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }

        let guard = self.begin_send(session_id)?;

        if !is_health_related(text) {
            tracing::info!(session_id = %session_id, "off-topic question, skipping model call");
            self.sessions().append_messages(
                session_id,
                vec![Message::user(text), Message::assistant(OUT_OF_DOMAIN_REPLY)],
            )?;
            guard.settle(SendState::Succeeded);
            return Ok(SendOutcome::Redirected {
                reply: OUT_OF_DOMAIN_REPLY.to_string(),
            });
        }

        let history = {
            let mut sessions = self.sessions();
            sessions.append_messages(session_id, vec![Message::user(text)])?;
            sessions
                .session(session_id)
                .map(|s| s.messages.clone())
                .unwrap_or_default()
        };

        let context = self.retrieve_context(text);
        let context_ids: Vec<String> = context.iter().map(|r| r.entry.id.clone()).collect();
        let prompt = self.composer.compose(&history, &context);
        let options = self.models.send_options();

        tracing::debug!(
            session_id = %session_id,
            context = context_ids.len(),
            model = %options.model,
            "dispatching message"
        );

        let (outcome, reply_message, state) = match self.models.send(&prompt, &options).await {
            Ok(reply) => (
                SendOutcome::Replied {
                    reply: reply.clone(),
                    model: options.model,
                    context_ids,
                },
                Message::assistant(reply),
                SendState::Succeeded,
            ),
            Err(e) => {
                let message = e.user_message();
                (
                    SendOutcome::Failed {
                        failure: e.kind(),
                        message: message.clone(),
                    },
                    Message::assistant(message),
                    SendState::Failed,
                )
            }
        };

        let appended = self
            .sessions()
            .append_messages(session_id, vec![reply_message]);
        match appended {
            Ok(()) => guard.settle(state),
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "session gone before reply arrived"
                );
                guard.discard();
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_is_tagged_by_kind() {
        let outcome = SendOutcome::Failed {
            failure: FailureKind::MalformedResponse,
            message: "oops".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "failed");
        assert_eq!(json["failure"], "malformed_response");
    }
}
