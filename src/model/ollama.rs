//! HTTP transport for an Ollama-compatible inference service.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{GenerateRequest, InferenceBackend, RawResponse};
use crate::config::ModelConfig;
use crate::error::BackendError;

/// Talks to a local inference service over plain HTTP.
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: reqwest::Client,
    base_url: String,
    models_path: String,
    generate_path: String,
}

impl OllamaBackend {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            models_path: config.models_path.clone(),
            generate_path: config.generate_path.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Read status and body. Failing to read the body counts as unreachable.
    async fn into_raw(response: reqwest::Response) -> Result<RawResponse, BackendError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Unreachable(format!("failed to read response body: {e}")))?;
        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn fetch_models(&self) -> Result<RawResponse, BackendError> {
        let url = self.url(&self.models_path);
        tracing::debug!(url = %url, "fetching model list");
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(format!("GET {url}: {e}")))?;
        Self::into_raw(response).await
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<RawResponse, BackendError> {
        let url = self.url(&self.generate_path);
        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(format!("POST {url}: {e}")))?;
        Self::into_raw(response).await
    }

    fn endpoint(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_paths() {
        let config = ModelConfig {
            base_url: "http://localhost:11434/".into(),
            ..ModelConfig::default()
        };
        let backend = OllamaBackend::new(&config).unwrap();
        assert_eq!(backend.url("/api/tags"), "http://localhost:11434/api/tags");
        assert_eq!(backend.url("api/generate"), "http://localhost:11434/api/generate");
        assert_eq!(backend.endpoint(), "http://localhost:11434");
    }
}
