// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the counsel answering engine.
//!
//! One enum per subsystem, using `thiserror` for ergonomic definitions and
//! `anyhow` for propagation at the binary's top level.

use thiserror::Error;

/// Errors from the chat and embedding gateways.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Check if this error is retryable. Nothing in this crate retries;
    /// the classification is for transports layered on top.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::NetworkError(_))
    }
}

/// Errors from the document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Caller contract violation, raised before any I/O.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The on-disk collection does not match the fixed schema. Fatal.
    #[error("Collection schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Collection not loaded; call load() before searching")]
    NotLoaded,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Missing required setting: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors from the answer orchestrator.
///
/// Only fatal conditions surface here. Malformed generation output is not
/// an error: it yields the canned fallback response instead.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The conversation contains no active user question.
    #[error("Invalid state: last conversation turn is not from the user")]
    NoUserTurn,

    /// The query-rewrite call returned nothing to search with.
    #[error("Failed to get search query")]
    EmptyQuery,

    #[error("Invalid request options: {0}")]
    InvalidOptions(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from corpus ingestion.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid page: {0}")]
    InvalidPage(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias using anyhow for the binary's top level.
pub type Result<T> = anyhow::Result<T>;
