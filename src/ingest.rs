// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Corpus ingestion.
//!
//! Takes pre-extracted corpus pages, embeds them through the shared
//! embedding gateway, and writes them to the collection in one
//! transaction. Extraction itself (PDF splitting, OCR, blob plumbing)
//! happens upstream; this module starts at "here is the page text".
//!
//! Ingestion is wired from the same [`ClientRegistry`] as interactive
//! requests, so concurrent workers share one store handle and one
//! provisioned collection.

use std::sync::Arc;

use tracing::{info, warn};

use crate::clients::{ClientRegistry, SharedStore};
use crate::embeddings::EmbeddingProvider;
use crate::error::IngestError;
use crate::types::PageRecord;

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Pages written to the collection.
    pub indexed: usize,
    /// Pages dropped because no embedding was available for them.
    pub skipped: usize,
}

/// Embeds and upserts corpus pages.
pub struct DocumentIngestor {
    embeddings: Arc<dyn EmbeddingProvider>,
    store: SharedStore,
}

impl DocumentIngestor {
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>, store: SharedStore) -> Self {
        Self { embeddings, store }
    }

    /// Wire an ingestor from the shared client registry.
    pub async fn from_registry(registry: &ClientRegistry) -> Result<Self, IngestError> {
        let Some(embeddings) = registry.embeddings().await? else {
            return Err(IngestError::InvalidPage(
                "ingestion requires an embedding gateway; none is configured".to_string(),
            ));
        };
        Ok(Self::new(embeddings, registry.store().await?))
    }

    /// Ingest a batch of pages. Pages missing an id get a deterministic
    /// one derived from their source file and position. Pages for which
    /// the embedding service returns no embedding are skipped, not fatal;
    /// everything that embedded is committed in a single transaction.
    pub async fn ingest(&self, pages: Vec<PageRecord>) -> Result<IngestSummary, IngestError> {
        let mut embedded = Vec::with_capacity(pages.len());
        let mut summary = IngestSummary::default();

        for (ordinal, mut page) in pages.into_iter().enumerate() {
            if page.content.trim().is_empty() {
                return Err(IngestError::InvalidPage(format!(
                    "page {} of '{}' has no content",
                    ordinal, page.sourcefile
                )));
            }
            if page.id.is_empty() {
                page.id = PageRecord::derive_id(&page.sourcefile, ordinal);
            }

            let vector = self.embeddings.embed(&page.content).await?;
            if vector.is_empty() {
                warn!(id = %page.id, "no embedding returned; skipping page");
                summary.skipped += 1;
                continue;
            }
            embedded.push((page, vector));
        }

        if !embedded.is_empty() {
            let store = self.store.lock().await;
            summary.indexed = store.upsert(&embedded)?;
        }

        info!(
            indexed = summary.indexed,
            skipped = summary.skipped,
            "ingestion complete"
        );
        Ok(summary)
    }
}
