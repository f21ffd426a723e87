// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client lifecycle management.
//!
//! [`ClientRegistry`] is the one place network clients and the store handle
//! are constructed. Each client kind is built lazily on first use and
//! memoized for the process lifetime; concurrent first users are serialized
//! by the cell so exactly one construction happens, and later callers take
//! the lock-free fast path. Interactive requests and batch ingestion share
//! one registry, which is also what keeps collection provisioning from
//! racing.

use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::config::AppConfig;
use crate::embeddings::{EmbeddingProvider, OpenAiEmbeddingProvider};
use crate::error::{ConfigError, StoreError};
use crate::providers::{ChatProvider, OpenAiChatProvider};
use crate::store::DocumentStore;

/// Shared handle to the document store.
pub type SharedStore = Arc<Mutex<DocumentStore>>;

/// Lazily-constructed, process-lifetime clients.
pub struct ClientRegistry {
    config: AppConfig,
    store: OnceCell<SharedStore>,
    chat: OnceCell<Arc<dyn ChatProvider>>,
    embeddings: OnceCell<Option<Arc<dyn EmbeddingProvider>>>,
}

impl ClientRegistry {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            store: OnceCell::new(),
            chat: OnceCell::new(),
            embeddings: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The store handle, provisioning the collection on first use.
    pub async fn store(&self) -> Result<SharedStore, StoreError> {
        self.store
            .get_or_try_init(|| async {
                let store = DocumentStore::open(&self.config.store.path)?;
                store.ensure_collection()?;
                Ok(Arc::new(Mutex::new(store)))
            })
            .await
            .cloned()
    }

    /// The chat-completion gateway. Missing configuration is fatal.
    pub async fn chat(&self) -> Result<Arc<dyn ChatProvider>, ConfigError> {
        self.chat
            .get_or_try_init(|| async {
                let api_key = self.config.api_key()?;
                let provider: Arc<dyn ChatProvider> = Arc::new(OpenAiChatProvider::new(
                    api_key,
                    self.config.chat.model.clone(),
                    self.config.chat.base_url.clone(),
                ));
                Ok(provider)
            })
            .await
            .cloned()
    }

    /// The embedding gateway, or `None` when no embedding section is
    /// configured (retrieval then degrades to text-only).
    pub async fn embeddings(&self) -> Result<Option<Arc<dyn EmbeddingProvider>>, ConfigError> {
        self.embeddings
            .get_or_try_init(|| async {
                let Some(embedding) = &self.config.embedding else {
                    return Ok(None);
                };
                let api_key = self.config.api_key()?;
                let provider: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbeddingProvider::new(
                    api_key,
                    embedding.model.clone(),
                    embedding.base_url.clone(),
                ));
                Ok(Some(provider))
            })
            .await
            .cloned()
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("store", &self.store.initialized())
            .field("chat", &self.chat.initialized())
            .field("embeddings", &self.embeddings.initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChatConfig, StorageConfig, StoreConfig};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> AppConfig {
        AppConfig {
            chat: ChatConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o".to_string(),
            },
            embedding: None,
            store: StoreConfig {
                path: dir.path().join("documents.db"),
            },
            storage: StorageConfig {
                endpoint: "https://docs.example.net".to_string(),
                container: "corpus".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_store_constructed_once() {
        let dir = TempDir::new().unwrap();
        let registry = ClientRegistry::new(test_config(&dir));

        let first = registry.store().await.unwrap();
        let second = registry.store().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_concurrent_first_use_single_construction() {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ClientRegistry::new(test_config(&dir)));

        let a = Arc::clone(&registry);
        let b = Arc::clone(&registry);
        let (first, second) = tokio::join!(
            async move { a.store().await.unwrap() },
            async move { b.store().await.unwrap() },
        );

        // Both callers observe the same provisioned collection.
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.lock().await.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_embeddings_absent_without_config() {
        let dir = TempDir::new().unwrap();
        let registry = ClientRegistry::new(test_config(&dir));

        assert!(registry.embeddings().await.unwrap().is_none());
    }
}
