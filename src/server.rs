//! HTTP API over a shared [`ChatEngine`].
//!
//! [`router`] builds the axum routes; [`serve`] opens storage, wires up the
//! backend, runs one model discovery and listens until ctrl-c.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{FixedOffset, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::chat::ChatEngine;
use crate::config::VitalConfig;
use crate::error::{EngineError, StorageError};
use crate::knowledge::EntryDraft;
use crate::model::{InferenceBackend, OllamaBackend};
use crate::storage::{SqliteStorage, StoragePort};

type SharedEngine = Arc<ChatEngine>;

/// Error body for every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// [`EngineError`] mapped to an HTTP status.
#[derive(Debug)]
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::SessionNotFound(_)
            | EngineError::FolderNotFound(_)
            | EngineError::EntryNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::SendInProgress(_) => StatusCode::CONFLICT,
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn to_json<T: Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| ApiError(EngineError::Storage(StorageError::Serialization(e))))
}

// ── Request bodies ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Client's offset from UTC in minutes. Server local time when absent.
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectModelRequest {
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

// ── Routes ────────────────────────────────────────────────────────────────────

pub fn router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/sessions/{id}/activate", post(activate_session))
        .route("/sessions/{id}/title", put(rename_session))
        .route("/sessions/{id}/folder", put(move_session))
        .route("/sessions/{id}/messages", post(send_message))
        .route("/sessions/{id}/messages/{index}", put(edit_message))
        .route("/folders", get(list_folders).post(create_folder))
        .route("/folders/{id}", put(rename_folder).delete(delete_folder))
        .route("/models", get(get_models))
        .route("/models/refresh", post(refresh_models))
        .route("/models/selected", put(select_model))
        .route("/knowledge", get(list_knowledge).post(add_entry).put(import_knowledge))
        .route("/knowledge/search", get(search_knowledge))
        .route("/knowledge/reset", post(reset_knowledge))
        .route("/knowledge/{id}", put(update_entry).delete(delete_entry))
        .with_state(engine)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Offsets must stay strictly within a day of UTC.
fn parse_utc_offset(minutes: i32) -> ApiResult<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            ApiError(EngineError::Validation(format!(
                "utc_offset_minutes {minutes} is out of range"
            )))
        })
}

// ── Sessions ──────────────────────────────────────────────────────────────────

async fn list_sessions(
    State(engine): State<SharedEngine>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Value>> {
    let offset = query.utc_offset_minutes.map(parse_utc_offset).transpose()?;
    let store = engine.sessions();
    let groups = match offset {
        Some(offset) => to_json(&store.group_for_display(&Utc::now().with_timezone(&offset)))?,
        None => to_json(&store.group_for_display(&Local::now()))?,
    };

    let mut folders = Vec::new();
    for folder in store.folders() {
        folders.push(json!({
            "folder": to_json(folder)?,
            "sessions": to_json(&store.sessions_in_folder(&folder.id))?,
        }));
    }

    Ok(Json(json!({
        "activeId": store.active_session_id(),
        "groups": groups,
        "folders": folders,
    })))
}

async fn create_session(
    State(engine): State<SharedEngine>,
    body: Option<Json<CreateSessionRequest>>,
) -> ApiResult<impl IntoResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let session = engine
        .sessions()
        .create_session(request.folder_id.as_deref())?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let store = engine.sessions();
    let session = store
        .session(&id)
        .ok_or_else(|| EngineError::SessionNotFound(id.clone()))?;
    let mut body = to_json(session)?;
    body["sendState"] = to_json(&engine.send_state(&id))?;
    Ok(Json(body))
}

async fn delete_session(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let active_id = engine.delete_session(&id)?;
    Ok(Json(json!({ "activeId": active_id })))
}

async fn activate_session(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    engine.sessions().set_active(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rename_session(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<StatusCode> {
    engine.sessions().rename_session(&id, &request.name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn move_session(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
    Json(request): Json<MoveRequest>,
) -> ApiResult<StatusCode> {
    engine
        .sessions()
        .move_session(&id, request.folder_id.as_deref())?;
    Ok(StatusCode::NO_CONTENT)
}

async fn send_message(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<Json<Value>> {
    let outcome = engine.send_message(&id, &request.content).await?;
    Ok(Json(to_json(&outcome)?))
}

async fn edit_message(
    State(engine): State<SharedEngine>,
    Path((id, index)): Path<(String, usize)>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<StatusCode> {
    engine
        .sessions()
        .edit_user_message(&id, index, &request.content)?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Folders ───────────────────────────────────────────────────────────────────

async fn list_folders(State(engine): State<SharedEngine>) -> ApiResult<Json<Value>> {
    let store = engine.sessions();
    Ok(Json(to_json(&store.folders())?))
}

async fn create_folder(
    State(engine): State<SharedEngine>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<impl IntoResponse> {
    let folder = engine.sessions().create_folder(&request.name)?;
    Ok((StatusCode::CREATED, Json(folder)))
}

async fn rename_folder(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> ApiResult<StatusCode> {
    engine.sessions().rename_folder(&id, &request.name)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_folder(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let deleted_sessions = engine.delete_folder(&id)?;
    Ok(Json(json!({
        "deletedSessions": deleted_sessions,
        "activeId": engine.sessions().active_session_id(),
    })))
}

// ── Models ────────────────────────────────────────────────────────────────────

async fn get_models(State(engine): State<SharedEngine>) -> impl IntoResponse {
    Json(engine.models().catalog())
}

async fn refresh_models(State(engine): State<SharedEngine>) -> impl IntoResponse {
    engine.models().refresh_models().await;
    Json(engine.models().catalog())
}

async fn select_model(
    State(engine): State<SharedEngine>,
    Json(request): Json<SelectModelRequest>,
) -> ApiResult<impl IntoResponse> {
    engine.models().select_model(&request.model)?;
    Ok(Json(engine.models().catalog()))
}

// ── Knowledge ─────────────────────────────────────────────────────────────────

async fn list_knowledge(State(engine): State<SharedEngine>) -> impl IntoResponse {
    Json(engine.knowledge().snapshot())
}

async fn search_knowledge(
    State(engine): State<SharedEngine>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    Json(engine.retrieve_context(&query.q))
}

async fn add_entry(
    State(engine): State<SharedEngine>,
    Json(draft): Json<EntryDraft>,
) -> ApiResult<impl IntoResponse> {
    let entry = engine.knowledge().add(draft)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn update_entry(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
    Json(draft): Json<EntryDraft>,
) -> ApiResult<impl IntoResponse> {
    let entry = engine.knowledge().update(&id, draft)?;
    Ok(Json(entry))
}

async fn delete_entry(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    engine.knowledge().delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replace the knowledge base wholesale. The body is taken as raw text so a
/// malformed payload is reported as a validation failure.
async fn import_knowledge(
    State(engine): State<SharedEngine>,
    body: String,
) -> ApiResult<Json<Value>> {
    let count = engine.knowledge().import_json(&body)?;
    Ok(Json(json!({ "imported": count })))
}

async fn reset_knowledge(State(engine): State<SharedEngine>) -> impl IntoResponse {
    let mut knowledge = engine.knowledge();
    knowledge.reset_to_defaults();
    Json(knowledge.snapshot())
}

// ── Startup ───────────────────────────────────────────────────────────────────

/// Open storage, discover models, and serve the API until ctrl-c.
pub async fn serve(config: VitalConfig) -> anyhow::Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let db_path = config.resolved_db_path();
    let backend: Arc<dyn InferenceBackend> = Arc::new(OllamaBackend::new(&config.model)?);
    let engine_config = config.clone();
    // Opening SQLite and loading state is blocking work.
    let engine = tokio::task::spawn_blocking(move || -> anyhow::Result<SharedEngine> {
        let storage: Arc<dyn StoragePort> = Arc::new(SqliteStorage::open(&db_path)?);
        Ok(Arc::new(ChatEngine::new(storage, backend, &engine_config)))
    })
    .await??;

    let models = engine.models().refresh_models().await;
    tracing::info!(
        endpoint = %engine.models().endpoint(),
        discovered = models.len(),
        selected = %engine.models().selected_model(),
        "model backend ready"
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "VitalChat API listening at http://{bind_addr}");

    axum::serve(listener, router(Arc::clone(&engine)))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down API server");
        })
        .await?;

    tokio::task::spawn_blocking(move || engine.flush()).await?;
    Ok(())
}
