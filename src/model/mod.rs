//! Model discovery, selection, and invocation.
//!
//! [`InferenceBackend`] is the transport seam: it moves bytes to and from the
//! inference service and reports only transport failures. Everything that
//! interprets those bytes (status classification, body parsing, the selection
//! policy) lives in [`ModelOrchestrator`], so it behaves the same whatever the
//! transport. [`ollama::OllamaBackend`] is the HTTP implementation.

pub mod ollama;

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chat::{Message, Role};
use crate::error::{BackendError, EngineError, EngineResult};

pub use ollama::OllamaBackend;

/// Status and body exactly as the backend sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Body of a generate call. `stream` is always `false`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: GenerateOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub num_predict: u32,
}

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Transport to the inference service.
///
/// Implementations return `Err` only when no response was obtained at all
/// (always [`BackendError::Unreachable`]); any status and body that did
/// arrive is handed back untouched.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Fetch the model listing.
    async fn fetch_models(&self) -> Result<RawResponse, BackendError>;

    /// Submit one non-streaming generate request.
    async fn generate(&self, request: &GenerateRequest) -> Result<RawResponse, BackendError>;

    /// Human-readable location of the service, for diagnostics.
    fn endpoint(&self) -> String {
        String::new()
    }
}

// ── Wire shapes, validated before anything else sees them ─────────────────────

#[derive(Debug, Deserialize)]
struct ModelList {
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// A generate body is either a completion or an error report.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerateReply {
    Completed { response: String },
    Failed { error: String },
}

/// Parse a model listing into names, in discovery order, without duplicates.
pub fn parse_model_list(raw: &RawResponse) -> Result<Vec<String>, BackendError> {
    if !raw.is_success() {
        return Err(BackendError::Rejected {
            status: raw.status,
            body: raw.body.clone(),
        });
    }
    let list: ModelList =
        serde_json::from_str(&raw.body).map_err(|e| BackendError::MalformedResponse {
            reason: e.to_string(),
            raw_body: raw.body.clone(),
        })?;

    let mut names: Vec<String> = Vec::with_capacity(list.models.len());
    for tag in list.models {
        if !tag.name.is_empty() && !names.contains(&tag.name) {
            names.push(tag.name);
        }
    }
    Ok(names)
}

/// Parse a generate body into the reply text.
pub fn parse_generate_reply(raw: &RawResponse) -> Result<String, BackendError> {
    if !raw.is_success() {
        return Err(BackendError::Rejected {
            status: raw.status,
            body: raw.body.clone(),
        });
    }
    let reply: GenerateReply =
        serde_json::from_str(&raw.body).map_err(|e| BackendError::MalformedResponse {
            reason: e.to_string(),
            raw_body: raw.body.clone(),
        })?;

    match reply {
        GenerateReply::Completed { response } => Ok(response),
        GenerateReply::Failed { error } => Err(BackendError::Rejected {
            status: raw.status,
            body: error,
        }),
    }
}

/// Flatten a message list into the single prompt string the generate endpoint takes.
pub fn format_prompt(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for message in messages {
        let label = match message.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(message.content.trim_end());
        prompt.push_str("\n\n");
    }
    prompt.push_str("Assistant:");
    prompt
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Known models and the current selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelCatalog {
    /// Discovery order. Empty until a discovery succeeds.
    pub available: Vec<String>,
    /// Always a member of `available` when that is non-empty.
    pub selected: String,
}

impl ModelCatalog {
    /// `true` once discovery has confirmed the selected model exists.
    pub fn is_verified(&self) -> bool {
        self.available.contains(&self.selected)
    }
}

pub struct ModelOrchestrator {
    backend: std::sync::Arc<dyn InferenceBackend>,
    catalog: RwLock<ModelCatalog>,
    temperature: f32,
    max_tokens: u32,
}

impl ModelOrchestrator {
    pub fn new(
        backend: std::sync::Arc<dyn InferenceBackend>,
        default_model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            backend,
            catalog: RwLock::new(ModelCatalog {
                available: Vec::new(),
                selected: default_model.into(),
            }),
            temperature,
            max_tokens,
        }
    }

    pub fn from_config(
        backend: std::sync::Arc<dyn InferenceBackend>,
        config: &crate::config::ModelConfig,
    ) -> Self {
        Self::new(
            backend,
            config.default_model.clone(),
            config.temperature,
            config.max_tokens,
        )
    }

    pub fn endpoint(&self) -> String {
        self.backend.endpoint()
    }

    pub fn catalog(&self) -> ModelCatalog {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn selected_model(&self) -> String {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .selected
            .clone()
    }

    /// Ask the backend which models it has. Best-effort: any failure yields an empty list.
    pub async fn list_models(&self) -> Vec<String> {
        let result = match self.backend.fetch_models().await {
            Ok(raw) => parse_model_list(&raw),
            Err(e) => Err(e),
        };
        match result {
            Ok(models) => {
                tracing::debug!(count = models.len(), "models discovered");
                models
            }
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind(), "model discovery failed");
                Vec::new()
            }
        }
    }

    /// Discover models and apply the selection policy. Returns the discovered list.
    pub async fn refresh_models(&self) -> Vec<String> {
        let models = self.list_models().await;
        self.apply_discovery(models.clone());
        models
    }

    /// Replace the catalog with `discovered`.
    ///
    /// If the list is non-empty and does not contain the current selection,
    /// the first discovered model is selected. An empty list keeps the current
    /// selection, unverified.
    pub fn apply_discovery(&self, discovered: Vec<String>) {
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(first) = discovered.first() {
            if !discovered.contains(&catalog.selected) {
                tracing::info!(
                    previous = %catalog.selected,
                    selected = %first,
                    "selected model not installed, switching to first available"
                );
                catalog.selected = first.clone();
            }
        }
        catalog.available = discovered;
    }

    /// Select a model explicitly. Must be a known model once any are known.
    pub fn select_model(&self, name: &str) -> EngineResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::Validation("model name must not be blank".into()));
        }
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        if !catalog.available.is_empty() && !catalog.available.iter().any(|m| m == name) {
            return Err(EngineError::Validation(format!("model not available: {name}")));
        }
        catalog.selected = name.to_string();
        Ok(())
    }

    /// Settings for the next call: the selected model plus configured defaults.
    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            model: self.selected_model(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Send `messages` and return the reply text.
    ///
    /// Transport failures, non-2xx statuses, and unparseable bodies all come
    /// back as a classified [`BackendError`]; nothing panics or escapes raw.
    pub async fn send(
        &self,
        messages: &[Message],
        options: &SendOptions,
    ) -> Result<String, BackendError> {
        let request = GenerateRequest {
            model: options.model.clone(),
            prompt: format_prompt(messages),
            stream: false,
            options: GenerateOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        tracing::info!(
            model = %request.model,
            messages = messages.len(),
            prompt_len = request.prompt.len(),
            "sending generate request"
        );

        let raw = match self.backend.generate(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind(), "generate request not delivered");
                return Err(e);
            }
        };
        let reply = parse_generate_reply(&raw);
        if let Err(e) = &reply {
            tracing::warn!(
                error = %e,
                kind = ?e.kind(),
                status = raw.status,
                raw_body = %raw.body,
                "generate request failed"
            );
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Replays canned responses and records generate requests.
    struct ScriptedBackend {
        models: Result<RawResponse, BackendError>,
        reply: Result<RawResponse, BackendError>,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedBackend {
        fn new(
            models: Result<RawResponse, BackendError>,
            reply: Result<RawResponse, BackendError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                models,
                reply,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        async fn fetch_models(&self) -> Result<RawResponse, BackendError> {
            self.models.clone()
        }

        async fn generate(&self, request: &GenerateRequest) -> Result<RawResponse, BackendError> {
            self.requests.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    fn models_body(names: &[&str]) -> RawResponse {
        let models: Vec<_> = names.iter().map(|n| serde_json::json!({ "name": n })).collect();
        RawResponse::ok(serde_json::json!({ "models": models }).to_string())
    }

    fn orchestrator(backend: Arc<ScriptedBackend>) -> ModelOrchestrator {
        ModelOrchestrator::new(backend, "llama3.2", 0.7, 256)
    }

    #[tokio::test]
    async fn missing_default_falls_back_to_first_discovered() {
        let backend = ScriptedBackend::new(
            Ok(models_body(&["llama3", "mistral"])),
            Ok(RawResponse::ok("{}")),
        );
        let orch = orchestrator(backend);

        let models = orch.refresh_models().await;
        assert_eq!(models, vec!["llama3", "mistral"]);
        assert_eq!(orch.selected_model(), "llama3");
        assert!(orch.catalog().is_verified());
    }

    #[tokio::test]
    async fn present_default_is_kept() {
        let backend = ScriptedBackend::new(
            Ok(models_body(&["mistral", "llama3.2"])),
            Ok(RawResponse::ok("{}")),
        );
        let orch = orchestrator(backend);
        orch.refresh_models().await;
        assert_eq!(orch.selected_model(), "llama3.2");
    }

    #[tokio::test]
    async fn discovery_failures_yield_empty_and_keep_default() {
        for models in [
            Err(BackendError::Unreachable("connection refused".into())),
            Ok(RawResponse {
                status: 500,
                body: "boom".into(),
            }),
            Ok(RawResponse::ok("not json")),
            Ok(RawResponse::ok(r#"{"models": "nope"}"#)),
        ] {
            let orch = orchestrator(ScriptedBackend::new(models, Ok(RawResponse::ok("{}"))));
            assert!(orch.refresh_models().await.is_empty());
            let catalog = orch.catalog();
            assert_eq!(catalog.selected, "llama3.2");
            assert!(!catalog.is_verified());
        }
    }

    #[test]
    fn model_list_is_deduplicated_in_order() {
        let names = parse_model_list(&models_body(&["b", "a", "b", ""])).unwrap();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn select_model_validates_against_catalog() {
        let orch = orchestrator(ScriptedBackend::new(
            Ok(models_body(&[])),
            Ok(RawResponse::ok("{}")),
        ));
        // nothing discovered: any non-blank name is accepted unverified
        orch.select_model("phi3").unwrap();
        assert_eq!(orch.selected_model(), "phi3");

        orch.apply_discovery(vec!["llama3".into(), "mistral".into()]);
        assert_eq!(orch.selected_model(), "llama3");
        assert!(orch.select_model("phi3").is_err());
        assert!(orch.select_model(" ").is_err());
        orch.select_model("mistral").unwrap();
        assert_eq!(orch.selected_model(), "mistral");
    }

    #[tokio::test]
    async fn send_builds_non_streaming_request() {
        let backend = ScriptedBackend::new(
            Ok(models_body(&[])),
            Ok(RawResponse::ok(r#"{"response": "Drink water.", "done": true}"#)),
        );
        let orch = orchestrator(backend.clone());
        let messages = vec![Message::system("persona"), Message::user("hydration?")];

        let reply = orch.send(&messages, &orch.send_options()).await.unwrap();
        assert_eq!(reply, "Drink water.");

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert!(!request.stream);
        assert_eq!(request.model, "llama3.2");
        assert_eq!(request.options.num_predict, 256);
        assert_eq!(
            request.prompt,
            "System: persona\n\nUser: hydration?\n\nAssistant:"
        );

        let wire = serde_json::to_value(request).unwrap();
        assert_eq!(wire["stream"], false);
        assert!(wire["options"]["temperature"].is_number());
    }

    #[tokio::test]
    async fn send_classifies_failures() {
        let cases = [
            (
                Err(BackendError::Unreachable("refused".into())),
                crate::error::FailureKind::BackendUnreachable,
            ),
            (
                Ok(RawResponse { status: 404, body: r#"{"error":"model not found"}"#.into() }),
                crate::error::FailureKind::BackendRejected,
            ),
            (
                Ok(RawResponse::ok(r#"{"error":"out of memory"}"#)),
                crate::error::FailureKind::BackendRejected,
            ),
            (
                Ok(RawResponse::ok("<html>gateway</html>")),
                crate::error::FailureKind::MalformedResponse,
            ),
            (
                Ok(RawResponse::ok(r#"{"done": true}"#)),
                crate::error::FailureKind::MalformedResponse,
            ),
        ];

        for (reply, expected) in cases {
            let orch = orchestrator(ScriptedBackend::new(Ok(models_body(&[])), reply));
            let err = orch
                .send(&[Message::user("q")], &orch.send_options())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), expected);
        }
    }

    #[test]
    fn malformed_response_keeps_raw_body() {
        let err = parse_generate_reply(&RawResponse::ok("garbage")).unwrap_err();
        match err {
            BackendError::MalformedResponse { raw_body, .. } => assert_eq!(raw_body, "garbage"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
