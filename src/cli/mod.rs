pub mod chat;
pub mod doctor;
pub mod knowledge;
pub mod models;
pub mod sessions;

use std::sync::Arc;

use anyhow::{Context, Result};
use vitalchat::chat::ChatEngine;
use vitalchat::config::VitalConfig;
use vitalchat::model::{InferenceBackend, OllamaBackend};
use vitalchat::storage::{SqliteStorage, StoragePort};

/// Open storage, connect the backend, and load the engine. Does not touch the network.
pub fn open_engine(config: &VitalConfig) -> Result<ChatEngine> {
    let db_path = config.resolved_db_path();
    let storage = SqliteStorage::open(&db_path)
        .with_context(|| format!("failed to open storage at {}", db_path.display()))?;
    let storage: Arc<dyn StoragePort> = Arc::new(storage);

    let backend: Arc<dyn InferenceBackend> = Arc::new(OllamaBackend::new(&config.model)?);

    Ok(ChatEngine::new(storage, backend, config))
}

/// [`open_engine`], then run model discovery once.
pub async fn open_engine_with_models(config: &VitalConfig) -> Result<ChatEngine> {
    let engine = open_engine(config)?;
    let models = engine.models().refresh_models().await;
    if models.is_empty() {
        tracing::warn!(
            endpoint = %engine.models().endpoint(),
            model = %engine.models().selected_model(),
            "no models discovered, using configured default"
        );
    }
    Ok(engine)
}
