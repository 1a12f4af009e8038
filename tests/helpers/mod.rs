#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use vitalchat::chat::ChatEngine;
use vitalchat::config::VitalConfig;
use vitalchat::error::{BackendError, StorageError};
use vitalchat::model::{GenerateRequest, InferenceBackend, RawResponse};
use vitalchat::storage::{MemoryStorage, StoragePort};

/// Scripted inference backend. Replies are consumed in order; once the
/// script runs out every call answers "ok".
#[derive(Default)]
pub struct FakeBackend {
    models: Mutex<Option<RawResponse>>,
    replies: Mutex<VecDeque<Result<RawResponse, BackendError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    /// When set, `generate` waits for a permit before answering.
    gate: Option<Arc<Semaphore>>,
    /// Signalled each time `generate` is entered.
    pub entered: Notify,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `generate` blocks until the returned semaphore gets a permit.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let backend = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (backend, gate)
    }

    pub fn with_models(self, names: &[&str]) -> Self {
        let tags: Vec<_> = names
            .iter()
            .map(|n| serde_json::json!({ "name": n }))
            .collect();
        let body = serde_json::json!({ "models": tags }).to_string();
        *self.models.lock().unwrap() = Some(RawResponse::ok(body));
        self
    }

    pub fn reply(self, text: &str) -> Self {
        let body = serde_json::json!({ "response": text, "done": true }).to_string();
        self.replies.lock().unwrap().push_back(Ok(RawResponse::ok(body)));
        self
    }

    pub fn respond(self, response: Result<RawResponse, BackendError>) -> Self {
        self.replies.lock().unwrap().push_back(response);
        self
    }

    /// Every generate request received so far.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceBackend for FakeBackend {
    async fn fetch_models(&self) -> Result<RawResponse, BackendError> {
        self.models
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BackendError::Unreachable("connection refused".into()))
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<RawResponse, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(RawResponse::ok(
                serde_json::json!({ "response": "ok" }).to_string(),
            ))
        })
    }

    fn endpoint(&self) -> String {
        "fake://backend".into()
    }
}

/// In-memory storage whose writes take `delay`, like a disk under load.
pub struct SlowStorage {
    inner: MemoryStorage,
    delay: Duration,
}

impl SlowStorage {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryStorage::new(),
            delay,
        }
    }
}

impl StoragePort for SlowStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::thread::sleep(self.delay);
        self.inner.set(key, value)
    }
}

/// Engine over fresh in-memory storage and the given backend.
pub fn test_engine(backend: Arc<FakeBackend>) -> ChatEngine {
    test_engine_with_storage(Arc::new(MemoryStorage::new()), backend)
}

pub fn test_engine_with_storage(
    storage: Arc<dyn StoragePort>,
    backend: Arc<FakeBackend>,
) -> ChatEngine {
    ChatEngine::new(storage, backend, &VitalConfig::default())
}

/// Id of the session the engine starts with.
pub fn active_id(engine: &ChatEngine) -> String {
    engine.sessions().active_session_id().to_string()
}
