//! Error types shared across the engine.
//!
//! [`EngineError`] covers everything a caller can get back as `Err`: rejected
//! input and references to things that do not exist. Backend failures are
//! [`BackendError`]s, which the send pipeline turns into transcript messages
//! instead of propagating.

use serde::Serialize;

/// Engine operation errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Blank name, blank title, malformed import and the like. No state was changed.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("knowledge entry not found: {0}")]
    EntryNotFound(String),

    /// A second send was attempted while one is still outstanding for the session.
    #[error("a message is already being sent for session {0}")]
    SendInProgress(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Storage port errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Inference backend errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Connection refused, DNS failure, timeout: the service is not there.
    #[error("inference backend unreachable: {0}")]
    Unreachable(String),

    /// The service answered with a non-2xx status.
    #[error("inference backend returned HTTP {status}")]
    Rejected { status: u16, body: String },

    /// The body could not be parsed or had the wrong shape. `raw_body` is kept for diagnostics.
    #[error("malformed backend response: {reason}")]
    MalformedResponse { reason: String, raw_body: String },
}

/// Failure classes surfaced to callers of the send pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    BackendUnreachable,
    BackendRejected,
    MalformedResponse,
}

impl BackendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unreachable(_) => FailureKind::BackendUnreachable,
            Self::Rejected { .. } => FailureKind::BackendRejected,
            Self::MalformedResponse { .. } => FailureKind::MalformedResponse,
        }
    }

    /// Text appended to the transcript on the assistant's behalf. Never includes the raw body.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unreachable(_) => "I couldn't reach the local model service. Make sure it is \
                running and try again."
                .to_string(),
            Self::Rejected { status, .. } => format!(
                "The model service declined the request (HTTP {status}). Check that the \
                 selected model is installed and try again."
            ),
            Self::MalformedResponse { .. } => "The model service sent a reply I couldn't \
                understand. Please try again."
                .to_string(),
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
