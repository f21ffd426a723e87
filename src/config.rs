// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration for the counsel answering engine.
//!
//! Settings come from a YAML file (`counsel.yaml` in the working directory,
//! or the path given on the command line) with `COUNSEL_*` environment
//! variables taking precedence. API keys are environment-only and never
//! read from the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "counsel.yaml";

/// Chat-completion gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// OpenAI-compatible base URL.
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    /// Deployed chat model name.
    pub model: String,
}

/// Embedding gateway settings. Optional: when absent, retrieval degrades
/// to text-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    /// Deployed embedding model name.
    pub model: String,
}

/// Document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the collection database file.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Source-document storage settings, used only to build citation links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Absolute endpoint of the document host.
    pub endpoint: String,
    /// Container (path segment) holding the corpus files.
    pub container: String,
}

/// Resolved application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub chat: ChatConfig,
    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
    #[serde(default)]
    pub store: StoreConfig,
    pub storage: StorageConfig,
}

fn default_chat_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("counsel")
        .join("documents.db")
}

impl AppConfig {
    /// Load configuration from an explicit path or the default file,
    /// apply environment overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(CONFIG_FILE),
        };

        let raw = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;
        let mut config: AppConfig = serde_yaml::from_str(&raw)?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables win over the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("COUNSEL_CHAT_BASE_URL") {
            self.chat.base_url = v;
        }
        if let Ok(v) = std::env::var("COUNSEL_CHAT_MODEL") {
            self.chat.model = v;
        }
        if let Ok(v) = std::env::var("COUNSEL_STORE_PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("COUNSEL_STORAGE_ENDPOINT") {
            self.storage.endpoint = v;
        }
        if let Ok(v) = std::env::var("COUNSEL_STORAGE_CONTAINER") {
            self.storage.container = v;
        }
    }

    /// Fail fast on settings no component can run without.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.model.trim().is_empty() {
            return Err(ConfigError::MissingField("chat.model".to_string()));
        }
        if self.storage.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("storage.endpoint".to_string()));
        }
        if self.storage.container.trim().is_empty() {
            return Err(ConfigError::MissingField("storage.container".to_string()));
        }
        if let Some(embedding) = &self.embedding {
            if embedding.model.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "embedding.model".to_string(),
                    message: "must not be empty when the embedding section is present"
                        .to_string(),
                });
            }
        }
        Ok(())
    }

    /// API key shared by the chat and embedding gateways. Environment-only.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var("COUNSEL_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| ConfigError::MissingField("COUNSEL_API_KEY".to_string()))
    }

    /// Absolute URL prefix for citation links: storage endpoint joined
    /// with the container path.
    pub fn citation_base_url(&self) -> String {
        format!(
            "{}/{}",
            self.storage.endpoint.trim_end_matches('/'),
            self.storage.container.trim_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, yaml: &str) -> PathBuf {
        let path = dir.path().join("counsel.yaml");
        std::fs::write(&path, yaml).unwrap();
        path
    }

    const MINIMAL: &str = r#"
chat:
  model: gpt-4o
storage:
  endpoint: https://docs.example.net
  container: corpus
"#;

    #[test]
    fn test_load_minimal() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, MINIMAL);

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.chat.model, "gpt-4o");
        assert_eq!(config.chat.base_url, "https://api.openai.com/v1");
        assert!(config.embedding.is_none());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = AppConfig::load(Some(&dir.path().join("nope.yaml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_missing_mandatory_field() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
chat:
  model: ""
storage:
  endpoint: https://docs.example.net
  container: corpus
"#,
        );

        let result = AppConfig::load(Some(&path));
        assert!(matches!(result, Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn test_citation_base_url_join() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
chat:
  model: gpt-4o
storage:
  endpoint: https://docs.example.net/
  container: /corpus/
"#,
        );

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.citation_base_url(), "https://docs.example.net/corpus");
    }

    #[test]
    fn test_embedding_section() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
chat:
  model: gpt-4o
embedding:
  model: text-embedding-3-small
storage:
  endpoint: https://docs.example.net
  container: corpus
"#,
        );

        let config = AppConfig::load(Some(&path)).unwrap();
        let embedding = config.embedding.unwrap();
        assert_eq!(embedding.model, "text-embedding-3-small");
    }
}
