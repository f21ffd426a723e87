// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Embedding gateway.
//!
//! [`EmbeddingProvider`] wraps a single external embedding call. An empty
//! vector from the upstream means "no usable embedding" and is not an
//! error; callers decide whether they can proceed without one.

pub mod openai;

pub use openai::OpenAiEmbeddingProvider;

use async_trait::async_trait;

use crate::error::ProviderError;

/// Embedding dimension of every vector in the collection.
pub const EMBEDDING_DIM: usize = 1536;

/// An embedding backend. Pure request/response; no retries at this layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Returns an empty vector when the upstream
    /// explicitly produced no embedding.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}
