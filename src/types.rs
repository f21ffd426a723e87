// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Core types for the counsel answering engine.
//!
//! Defines the conversation, request-option, and response structures shared
//! between the orchestrator, the gateways, and the document store.

use serde::{Deserialize, Serialize};

// ============================================================================
// Conversation
// ============================================================================

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn in a conversation. Insertion order is chronological; the
/// last `User` turn is the active question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    /// Create a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Create an assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

// ============================================================================
// Request options
// ============================================================================

/// Which of {lexical query, embedding vector} drive retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Query only; no embedding is computed.
    Text,
    /// Embedding only; no query rewrite occurs.
    Vector,
    /// Both query and embedding.
    Hybrid,
}

impl Default for RetrievalMode {
    fn default() -> Self {
        Self::Hybrid
    }
}

/// Per-request options. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Number of passages to retrieve. Must be greater than zero.
    pub top_k: usize,
    pub retrieval_mode: RetrievalMode,
    pub use_semantic_captions: bool,
    pub use_semantic_ranker: bool,
    /// Exclude passages whose category equals this value.
    pub exclude_category: Option<String>,
    /// Sampling temperature for answer generation.
    pub temperature: f32,
    /// Generate three follow-up questions after the answer.
    pub suggest_followups: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            retrieval_mode: RetrievalMode::Hybrid,
            use_semantic_captions: false,
            use_semantic_ranker: false,
            exclude_category: None,
            temperature: 0.7,
            suggest_followups: false,
        }
    }
}

// ============================================================================
// Retrieval results and responses
// ============================================================================

/// A retrieved passage: source page name as title plus the passage text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub title: String,
    pub content: String,
}

impl DocumentRecord {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// The orchestrator's output. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredResponse {
    /// The assistant's answer, with citation markers and any appended
    /// `<<follow-up>>` markers.
    pub message: ChatTurn,
    /// The passages the answer was grounded in, best match first.
    pub supporting_content: Vec<DocumentRecord>,
    /// Follow-up questions in generation order; empty when not requested.
    pub followup_questions: Vec<String>,
    /// The model's reasoning notes.
    pub thoughts: String,
    /// Configured URL prefix for building citation links downstream.
    pub citation_base_url: String,
}

// ============================================================================
// Corpus pages
// ============================================================================

/// One ingestible corpus page with its source metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    /// Unique record id. Derived from the source when not supplied.
    #[serde(default)]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    pub sourcepage: String,
    pub sourcefile: String,
}

impl PageRecord {
    /// Derive a deterministic id from the source file and page ordinal.
    pub fn derive_id(sourcefile: &str, ordinal: usize) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{}:{}", sourcefile, ordinal).as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        hash[..16].to_string()
    }
}
