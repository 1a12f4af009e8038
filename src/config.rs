use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct VitalConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub model: ModelConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Where the inference backend lives and how replies are generated.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub models_path: String,
    pub generate_path: String,
    /// Selected until discovery says otherwise, even if the backend never confirms it.
    pub default_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub enabled: bool,
    pub max_results: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 8787,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_vitalchat_dir()
            .join("vitalchat.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            models_path: "/api/tags".into(),
            generate_path: "/api/generate".into(),
            default_model: "llama3.2".into(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 120,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: 3,
        }
    }
}

/// Returns `~/.vitalchat/`, or `./.vitalchat/` when no home directory is known.
pub fn default_vitalchat_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vitalchat")
}

/// Returns the default config file path: `~/.vitalchat/config.toml`
pub fn default_config_path() -> PathBuf {
    default_vitalchat_dir().join("config.toml")
}

impl VitalConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            VitalConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (VITALCHAT_DB, VITALCHAT_MODEL, VITALCHAT_BACKEND_URL, VITALCHAT_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VITALCHAT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("VITALCHAT_MODEL") {
            self.model.default_model = val;
        }
        if let Ok(val) = std::env::var("VITALCHAT_BACKEND_URL") {
            self.model.base_url = val;
        }
        if let Ok(val) = std::env::var("VITALCHAT_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = VitalConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.model.default_model, "llama3.2");
        assert_eq!(config.model.base_url, "http://localhost:11434");
        assert_eq!(config.retrieval.max_results, 3);
        assert!(config.retrieval.enabled);
        assert!(config.storage.db_path.ends_with("vitalchat.db"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/test.db"

[model]
default_model = "mistral"
temperature = 0.2

[retrieval]
max_results = 5
"#;
        let config: VitalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.model.default_model, "mistral");
        assert!((config.model.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.max_results, 5);
        // defaults still apply for unset fields
        assert_eq!(config.model.generate_path, "/api/generate");
        assert_eq!(config.server.port, 8787);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = VitalConfig::default();
        std::env::set_var("VITALCHAT_DB", "/tmp/override.db");
        std::env::set_var("VITALCHAT_MODEL", "phi3");
        std::env::set_var("VITALCHAT_BACKEND_URL", "http://10.0.0.2:11434");
        std::env::set_var("VITALCHAT_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.model.default_model, "phi3");
        assert_eq!(config.model.base_url, "http://10.0.0.2:11434");
        assert_eq!(config.server.log_level, "trace");

        // Clean up
        std::env::remove_var("VITALCHAT_DB");
        std::env::remove_var("VITALCHAT_MODEL");
        std::env::remove_var("VITALCHAT_BACKEND_URL");
        std::env::remove_var("VITALCHAT_LOG_LEVEL");
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = VitalConfig::load_from(tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.model.models_path, "/api/tags");
    }
}
