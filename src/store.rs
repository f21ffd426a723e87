// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Document store: fixed-schema passage collection with similarity search.
//!
//! Backed by SQLite. The collection schema is a process-wide constant: a
//! `documents` table holding passage text, source metadata, and a
//! 1536-dimension embedding, plus an external-content FTS5 index used for
//! query-only (text mode) retrieval. Vector search is an L2 nearest-neighbor
//! scan with the category filter applied in SQL, never after the fact.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::{params, Connection};
use tracing::debug;

use crate::embeddings::EMBEDDING_DIM;
use crate::error::StoreError;
use crate::types::{DocumentRecord, PageRecord};

/// Fixed collection name.
pub const COLLECTION_NAME: &str = "documents";

/// Maximum lengths of the collection's string fields.
pub const MAX_ID_LEN: usize = 100;
pub const MAX_CONTENT_LEN: usize = 65_000;
pub const MAX_CATEGORY_LEN: usize = 10_000;
pub const MAX_SOURCE_LEN: usize = 10_000;

const COLLECTION_COLUMNS: [&str; 6] = [
    "id",
    "content",
    "category",
    "sourcepage",
    "sourcefile",
    "embedding",
];

/// Read consistency requested on a search. SQLite serializes writes and a
/// read always observes all previously committed writes, which satisfies
/// `Strong`; the knob keeps the store contract explicit for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyLevel {
    #[default]
    Strong,
}

/// One similarity-search request.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Lexical query. Drives retrieval only when no embedding is present.
    pub query: Option<String>,
    /// Embedding vector; when present, L2 nearest neighbors win.
    pub embedding: Option<Vec<f32>>,
    /// Maximum number of records to return.
    pub top_k: usize,
    /// Exclude records whose category equals this value.
    pub exclude_category: Option<String>,
    pub consistency: ConsistencyLevel,
}

/// Handle to the passage collection.
pub struct DocumentStore {
    conn: Connection,
    db_path: PathBuf,
    loaded: AtomicBool,
}

impl DocumentStore {
    /// Open or create the store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        Ok(Self {
            conn,
            db_path: path.to_path_buf(),
            loaded: AtomicBool::new(false),
        })
    }

    /// The database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Create the collection if it does not exist; verify it if it does.
    ///
    /// Idempotent, and safe against concurrent callers racing to create
    /// the same collection: a second caller observes the existing
    /// collection and succeeds. The only failure mode for an existing
    /// collection is a schema incompatible with the fixed one, which is
    /// fatal.
    pub fn ensure_collection(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {name} (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                category TEXT,
                sourcepage TEXT NOT NULL,
                sourcefile TEXT NOT NULL,
                embedding BLOB NOT NULL
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS {name}_fts
                USING fts5(content, content='{name}', content_rowid='rowid');

            CREATE TRIGGER IF NOT EXISTS {name}_fts_insert
            AFTER INSERT ON {name} BEGIN
                INSERT INTO {name}_fts(rowid, content) VALUES (new.rowid, new.content);
            END;

            CREATE TRIGGER IF NOT EXISTS {name}_fts_delete
            AFTER DELETE ON {name} BEGIN
                INSERT INTO {name}_fts({name}_fts, rowid, content)
                    VALUES ('delete', old.rowid, old.content);
            END;

            CREATE TRIGGER IF NOT EXISTS {name}_fts_update
            AFTER UPDATE ON {name} BEGIN
                INSERT INTO {name}_fts({name}_fts, rowid, content)
                    VALUES ('delete', old.rowid, old.content);
                INSERT INTO {name}_fts(rowid, content) VALUES (new.rowid, new.content);
            END;

            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
            name = COLLECTION_NAME
        ))?;

        self.conn.execute(
            "INSERT OR IGNORE INTO metadata (key, value) VALUES ('embedding_dim', ?1)",
            params![EMBEDDING_DIM.to_string()],
        )?;

        self.verify_schema()
    }

    /// Check the existing collection against the fixed schema.
    fn verify_schema(&self) -> Result<(), StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", COLLECTION_NAME))?;
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>("name"))?
            .collect::<Result<_, _>>()?;

        for expected in COLLECTION_COLUMNS {
            if !columns.iter().any(|c| c == expected) {
                return Err(StoreError::SchemaMismatch(format!(
                    "collection '{}' is missing field '{}'",
                    COLLECTION_NAME, expected
                )));
            }
        }

        let dim: String = self.conn.query_row(
            "SELECT value FROM metadata WHERE key = 'embedding_dim'",
            [],
            |row| row.get("value"),
        )?;
        if dim != EMBEDDING_DIM.to_string() {
            return Err(StoreError::SchemaMismatch(format!(
                "collection was created with embedding dimension {}, expected {}",
                dim, EMBEDDING_DIM
            )));
        }

        Ok(())
    }

    /// Bring the collection into a searchable state. Idempotent; may be
    /// called before every query.
    pub fn load(&self) -> Result<(), StoreError> {
        // Preparing the scan statement validates that the collection and
        // its FTS index are present and readable.
        self.conn.prepare(&format!(
            "SELECT content, sourcepage, embedding FROM {}",
            COLLECTION_NAME
        ))?;
        self.conn
            .prepare(&format!("SELECT rowid FROM {}_fts LIMIT 1", COLLECTION_NAME))?;
        self.loaded.store(true, Ordering::Release);
        Ok(())
    }

    /// Nearest-neighbor search over the collection.
    ///
    /// With an embedding present, records are ranked by ascending L2
    /// distance; with only a query, by FTS bm25. At most `top_k` records
    /// are returned, best match first, each carrying the source page as
    /// `title` and whitespace-flattened passage text as `content`. Zero
    /// matches is an empty vector, never an error.
    pub fn search(&self, request: &SearchRequest) -> Result<Vec<DocumentRecord>, StoreError> {
        if request.query.is_none() && request.embedding.is_none() {
            return Err(StoreError::InvalidRequest(
                "either a query or an embedding must be provided".to_string(),
            ));
        }
        if !self.loaded.load(Ordering::Acquire) {
            return Err(StoreError::NotLoaded);
        }

        debug!(
            top_k = request.top_k,
            has_embedding = request.embedding.is_some(),
            has_query = request.query.is_some(),
            exclude_category = request.exclude_category.as_deref(),
            "collection search"
        );

        match &request.embedding {
            Some(embedding) => self.search_by_vector(embedding, request),
            None => {
                let query = request.query.as_deref().unwrap_or_default();
                self.search_by_text(query, request)
            }
        }
    }

    fn search_by_vector(
        &self,
        embedding: &[f32],
        request: &SearchRequest,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        if embedding.len() != EMBEDDING_DIM {
            return Err(StoreError::InvalidRequest(format!(
                "embedding has dimension {}, expected {}",
                embedding.len(),
                EMBEDDING_DIM
            )));
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT content, sourcepage, embedding FROM {}
             WHERE ?1 IS NULL OR category IS NULL OR category <> ?1",
            COLLECTION_NAME
        ))?;

        let mut scored: Vec<(f32, DocumentRecord)> = Vec::new();
        let rows = stmt.query_map(params![request.exclude_category], |row| {
            let content: String = row.get("content")?;
            let sourcepage: String = row.get("sourcepage")?;
            let blob: Vec<u8> = row.get("embedding")?;
            Ok((content, sourcepage, blob))
        })?;

        for row in rows {
            let (content, sourcepage, blob) = row?;
            let stored = deserialize_embedding(&blob);
            let distance = l2_distance(embedding, &stored);
            scored.push((distance, to_record(sourcepage, content)));
        }

        // Ascending distance: best match first.
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(request.top_k);

        Ok(scored.into_iter().map(|(_, record)| record).collect())
    }

    fn search_by_text(
        &self,
        query: &str,
        request: &SearchRequest,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        let match_expr = fts_match_expr(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT d.content AS content, d.sourcepage AS sourcepage
             FROM {name}_fts
             JOIN {name} d ON d.rowid = {name}_fts.rowid
             WHERE {name}_fts MATCH ?1
               AND (?2 IS NULL OR d.category IS NULL OR d.category <> ?2)
             ORDER BY bm25({name}_fts)
             LIMIT ?3",
            name = COLLECTION_NAME
        ))?;

        let rows = stmt.query_map(
            params![match_expr, request.exclude_category, request.top_k as i64],
            |row| {
                let content: String = row.get("content")?;
                let sourcepage: String = row.get("sourcepage")?;
                Ok(to_record(sourcepage, content))
            },
        )?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Insert or update passages with their embeddings in one transaction.
    /// Returns the number of records written.
    pub fn upsert(&self, pages: &[(PageRecord, Vec<f32>)]) -> Result<usize, StoreError> {
        for (page, embedding) in pages {
            validate_page(page)?;
            if embedding.len() != EMBEDDING_DIM {
                return Err(StoreError::SchemaMismatch(format!(
                    "page '{}' has embedding dimension {}, expected {}",
                    page.id,
                    embedding.len(),
                    EMBEDDING_DIM
                )));
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (id, content, category, sourcepage, sourcefile, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                     content = excluded.content,
                     category = excluded.category,
                     sourcepage = excluded.sourcepage,
                     sourcefile = excluded.sourcefile,
                     embedding = excluded.embedding",
                COLLECTION_NAME
            ))?;

            for (page, embedding) in pages {
                stmt.execute(params![
                    page.id,
                    page.content,
                    page.category,
                    page.sourcepage,
                    page.sourcefile,
                    serialize_embedding(embedding),
                ])?;
            }
        }
        tx.commit()?;

        Ok(pages.len())
    }

    /// Number of passages in the collection.
    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", COLLECTION_NAME),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn validate_page(page: &PageRecord) -> Result<(), StoreError> {
    if page.id.is_empty() || page.id.len() > MAX_ID_LEN {
        return Err(StoreError::InvalidRequest(format!(
            "page id must be 1..={} characters",
            MAX_ID_LEN
        )));
    }
    if page.content.len() > MAX_CONTENT_LEN {
        return Err(StoreError::InvalidRequest(format!(
            "page '{}' content exceeds {} characters",
            page.id, MAX_CONTENT_LEN
        )));
    }
    if page
        .category
        .as_ref()
        .is_some_and(|c| c.len() > MAX_CATEGORY_LEN)
    {
        return Err(StoreError::InvalidRequest(format!(
            "page '{}' category exceeds {} characters",
            page.id, MAX_CATEGORY_LEN
        )));
    }
    if page.sourcepage.len() > MAX_SOURCE_LEN || page.sourcefile.len() > MAX_SOURCE_LEN {
        return Err(StoreError::InvalidRequest(format!(
            "page '{}' source fields exceed {} characters",
            page.id, MAX_SOURCE_LEN
        )));
    }
    Ok(())
}

/// Collapse embedded line breaks so prompt assembly stays well-formed.
fn to_record(sourcepage: String, content: String) -> DocumentRecord {
    let flattened: String = content
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    DocumentRecord::new(sourcepage, flattened)
}

/// Quote each term so user text cannot inject FTS query syntax.
fn fts_match_expr(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "")))
        .filter(|quoted| quoted.len() > 2)
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap_or([0; 4]);
            f32::from_le_bytes(arr)
        })
        .collect()
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
