// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenAI-compatible embedding provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;

use super::EmbeddingProvider;

/// OpenAI-compatible embedding provider.
pub struct OpenAiEmbeddingProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiEmbeddingProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        }
    }
}

/// Carriage returns destabilize embeddings of otherwise-identical text;
/// strip them before submission.
fn normalize(text: &str) -> String {
    text.replace('\r', " ")
}

/// Extract the first embedding from a response body. An empty `data`
/// array yields an empty vector, not an error.
fn parse_embedding_response(body: &str) -> Result<Vec<f32>, ProviderError> {
    let response: EmbeddingResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::ParseError(e.to_string()))?;
    Ok(response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .unwrap_or_default())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: vec![normalize(text)],
        };

        debug!(model = %self.model, chars = text.len(), "embedding request");

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(ProviderError::api(error.error.message, status.as_u16()));
            }
            return Err(ProviderError::api(body, status.as_u16()));
        }

        parse_embedding_response(&body)
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}
