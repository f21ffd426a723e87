// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Chat-completion gateway.
//!
//! [`ChatProvider`] is the thin contract the orchestrator depends on; the
//! [`openai`] module implements it against any OpenAI-compatible API
//! (OpenAI, Azure deployments, local gateways). Retry policy, if any,
//! belongs to the transport beneath this trait — nothing here retries.

pub mod openai;

pub use openai::OpenAiChatProvider;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::ChatTurn;

/// Sampling parameters for one completion call.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop_sequences: Vec<String>,
    /// Hint the model toward a syntactically valid JSON object. Parsing
    /// downstream stays best-effort whether or not the hint is honored.
    pub json_response: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            stop_sequences: Vec::new(),
            json_response: false,
        }
    }
}

/// A chat-completion backend: multi-turn history plus a system instruction
/// in, assistant text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(
        &self,
        turns: &[ChatTurn],
        system: &str,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError>;

    /// The deployed model name, for logging.
    fn model(&self) -> &str;
}
