// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Counsel - grounded legal question answering.
//!
//! Answers natural-language questions about an indexed legal document
//! corpus by retrieving relevant passages and grounding an LLM's answer in
//! them, returning citations and optional follow-up questions.
//!
//! # Architecture
//!
//! - [`types`] - Conversation, request-option, and response types
//! - [`error`] - Error types and result alias
//! - [`config`] - YAML + environment configuration
//! - [`providers`] - Chat-completion gateway (OpenAI-compatible)
//! - [`embeddings`] - Embedding gateway (OpenAI-compatible)
//! - [`store`] - Fixed-schema passage collection with similarity search
//! - [`clients`] - Lazy, memoized client construction shared across callers
//! - [`chat`] - The retrieval-augmented answer orchestrator
//! - [`ingest`] - Embedding and upserting pre-extracted corpus pages
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use counsel::chat::ChatOrchestrator;
//! use counsel::clients::ClientRegistry;
//! use counsel::config::AppConfig;
//! use counsel::types::{ChatTurn, RequestOptions};
//!
//! let config = AppConfig::load(None)?;
//! let registry = Arc::new(ClientRegistry::new(config));
//! let orchestrator = ChatOrchestrator::from_registry(&registry).await?;
//!
//! let history = vec![ChatTurn::user("What did the court hold on anti-steering provisions?")];
//! let response = orchestrator.reply(&history, &RequestOptions::default()).await?;
//! println!("{}", response.message.text);
//! ```

pub mod chat;
pub mod clients;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod providers;
pub mod store;
pub mod types;

// Re-export commonly used types at crate root
pub use chat::ChatOrchestrator;
pub use clients::ClientRegistry;
pub use config::AppConfig;
pub use error::{ChatError, ConfigError, IngestError, ProviderError, Result, StoreError};
pub use types::{
    ChatTurn, DocumentRecord, PageRecord, RequestOptions, RetrievalMode, Role, StructuredResponse,
};

/// Counsel version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
