//! `SQLite` store implementation.
//!
//! Persists documents, chunks, and embeddings with transaction management
//! and migration support. The FTS5 index over chunk content is kept in
//! sync by triggers and rebuilt explicitly after each ingest run.

// SQLite stores all integers as i64. These casts are intentional and safe
// because we only store non-negative values that fit in usize.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use crate::core::{Chunk, ChunkKind, ChunkMetadata, DocType, Document};
use crate::error::{Result, StoreError};
use crate::store::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, GET_VERSION_SQL, SCHEMA_SQL, SET_VERSION_SQL,
};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Filter applied to vector-store queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    /// Restrict to a document type.
    pub doc_type: Option<DocType>,
    /// Restrict to documents whose ID contains this substring.
    pub doc_id_contains: Option<String>,
}

impl QueryFilter {
    /// Whether the filter matches everything.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.doc_type.is_none() && self.doc_id_contains.is_none()
    }

    /// Stable string form used in cache keys.
    #[must_use]
    pub fn cache_key_part(&self) -> String {
        format!(
            "{}|{}",
            self.doc_type.map_or("", DocType::as_str),
            self.doc_id_contains.as_deref().unwrap_or("")
        )
    }
}

/// Store statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Number of documents stored.
    pub document_count: usize,
    /// Total number of chunks.
    pub chunk_count: usize,
    /// Number of chunk embeddings.
    pub embedding_count: usize,
    /// Schema version.
    pub schema_version: u32,
    /// Database file size in bytes (if applicable).
    pub db_size: Option<u64>,
}

/// SQLite-backed store for documents, chunks, and embeddings.
///
/// # Examples
///
/// ```no_run
/// use clinrag::store::SqliteStore;
///
/// let mut store = SqliteStore::open(".clinrag/clinrag.db").unwrap();
/// store.init().unwrap();
/// ```
pub struct SqliteStore {
    /// `SQLite` connection.
    conn: Connection,
    /// Path to the database file (None for in-memory).
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens or creates a `SQLite` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.to_string()))?;
        }

        let conn = Connection::open(&path).map_err(StoreError::from)?;

        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StoreError::from)?;

        // WAL mode for better concurrent access (returns a row, use query_row)
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StoreError::from)?;

        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Creates an in-memory `SQLite` database.
    ///
    /// Useful for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StoreError::from)?;

        Ok(Self { conn, path: None })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Initializes the schema (idempotent).
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation or migration fails.
    pub fn init(&mut self) -> Result<()> {
        let is_init: i64 = self
            .conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StoreError::from)?;

        if is_init == 0 {
            self.conn
                .execute_batch(SCHEMA_SQL)
                .map_err(StoreError::from)?;
            self.set_schema_version(CURRENT_SCHEMA_VERSION)?;
        } else if let Some(current) = self.schema_version()?
            && current < CURRENT_SCHEMA_VERSION
        {
            for migration in crate::store::schema::get_migrations_from(current) {
                self.conn
                    .execute_batch(migration.sql)
                    .map_err(|e| StoreError::Migration(e.to_string()))?;
            }
            self.set_schema_version(CURRENT_SCHEMA_VERSION)?;
        }

        Ok(())
    }

    /// Checks whether the schema has been created.
    ///
    /// # Errors
    ///
    /// Returns an error if the check cannot be performed.
    pub fn is_initialized(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StoreError::from)?;
        Ok(count > 0)
    }

    /// Deletes all stored data, preserving the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    pub fn reset(&mut self) -> Result<()> {
        self.conn
            .execute_batch(
                r"
            DELETE FROM chunk_embeddings;
            DELETE FROM chunks;
            DELETE FROM documents;
        ",
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    fn schema_version(&self) -> Result<Option<u32>> {
        let version: Option<String> = self
            .conn
            .query_row(GET_VERSION_SQL, [], |row| row.get(0))
            .optional()
            .map_err(StoreError::from)?;
        Ok(version.and_then(|v| v.parse().ok()))
    }

    fn set_schema_version(&self, version: u32) -> Result<()> {
        self.conn
            .execute(SET_VERSION_SQL, params![version.to_string()])
            .map_err(StoreError::from)?;
        Ok(())
    }

    /// Returns current Unix timestamp.
    #[allow(clippy::cast_possible_wrap)]
    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    // ==================== Document Operations ====================

    /// Inserts or replaces a document record.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn upsert_document(&mut self, doc: &Document) -> Result<()> {
        // Plain upsert rather than INSERT OR REPLACE: a REPLACE deletes the
        // existing row first, which would cascade away the current chunk set
        self.conn
            .execute(
                r"
            INSERT INTO documents (doc_id, doc_type, source_path, content_hash, ingested_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(doc_id) DO UPDATE SET
                doc_type = excluded.doc_type,
                source_path = excluded.source_path,
                content_hash = excluded.content_hash,
                ingested_at = excluded.ingested_at
        ",
                params![
                    doc.doc_id,
                    doc.doc_type.as_str(),
                    doc.source_path.to_string_lossy(),
                    doc.content_hash,
                    Self::now(),
                ],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    /// Returns the stored content hash for a document, if ingested.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn document_hash(&self, doc_id: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT content_hash FROM documents WHERE doc_id = ?",
                params![doc_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::from(e).into())
    }

    /// Retrieves a document record.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_document(&self, doc_id: &str) -> Result<Option<Document>> {
        self.conn
            .query_row(
                "SELECT doc_id, doc_type, source_path, content_hash FROM documents WHERE doc_id = ?",
                params![doc_id],
                |row| {
                    Ok(Document {
                        doc_id: row.get(0)?,
                        doc_type: DocType::parse(&row.get::<_, String>(1)?),
                        source_path: PathBuf::from(row.get::<_, String>(2)?),
                        content_hash: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(|e| StoreError::from(e).into())
    }

    /// Lists all document records.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare("SELECT doc_id, doc_type, source_path, content_hash FROM documents ORDER BY doc_id")
            .map_err(StoreError::from)?;
        let documents = stmt
            .query_map([], |row| {
                Ok(Document {
                    doc_id: row.get(0)?,
                    doc_type: DocType::parse(&row.get::<_, String>(1)?),
                    source_path: PathBuf::from(row.get::<_, String>(2)?),
                    content_hash: row.get(3)?,
                })
            })
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        Ok(documents)
    }

    /// Deletes a document and all derived chunks and embeddings.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    pub fn delete_document(&mut self, doc_id: &str) -> Result<()> {
        // Explicit chunk delete so the FTS triggers fire before the
        // document row disappears
        self.conn
            .execute("DELETE FROM chunks WHERE doc_id = ?", params![doc_id])
            .map_err(StoreError::from)?;
        self.conn
            .execute("DELETE FROM documents WHERE doc_id = ?", params![doc_id])
            .map_err(StoreError::from)?;
        Ok(())
    }

    // ==================== Chunk Operations ====================

    /// Replaces the chunk set for a document in one transaction.
    ///
    /// `embeddings` pairs chunk IDs with their vectors; every chunk must
    /// have exactly one embedding. The old chunk set is deleted inside the
    /// same transaction, so a failed upload keeps the previous set.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails (the transaction rolls back).
    pub fn replace_chunks(
        &mut self,
        doc_id: &str,
        chunks: &[Chunk],
        embeddings: &[(String, Vec<f32>)],
        model_name: &str,
    ) -> Result<()> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;

        tx.execute("DELETE FROM chunks WHERE doc_id = ?", params![doc_id])
            .map_err(StoreError::from)?;

        let now = Self::now();
        {
            let mut chunk_stmt = tx
                .prepare(
                    r"
                INSERT INTO chunks (
                    chunk_id, doc_id, doc_type, content, char_start, char_end,
                    page_number, section, kind, parent_id, children, metadata, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
                )
                .map_err(StoreError::from)?;

            for chunk in chunks {
                let children = serde_json::to_string(&chunk.children_ids)
                    .map_err(StoreError::from)?;
                let metadata =
                    serde_json::to_string(&chunk.metadata).map_err(StoreError::from)?;
                chunk_stmt
                    .execute(params![
                        chunk.chunk_id,
                        chunk.doc_id,
                        chunk.doc_type.as_str(),
                        chunk.text,
                        chunk.char_start as i64,
                        chunk.char_end as i64,
                        i64::from(chunk.page_number),
                        chunk.section,
                        chunk.kind.as_str(),
                        chunk.parent_id,
                        children,
                        metadata,
                        now,
                    ])
                    .map_err(StoreError::from)?;
            }

            let mut emb_stmt = tx
                .prepare(
                    r"
                INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding, dimensions, model_name, created_at)
                VALUES (?, ?, ?, ?, ?)
            ",
                )
                .map_err(StoreError::from)?;

            for (chunk_id, vector) in embeddings {
                let bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
                emb_stmt
                    .execute(params![
                        chunk_id,
                        bytes,
                        vector.len() as i64,
                        model_name,
                        now,
                    ])
                    .map_err(StoreError::from)?;
            }
        }

        tx.commit()
            .map_err(|e| StoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
        let children: Option<String> = row.get(10)?;
        let metadata: Option<String> = row.get(11)?;
        Ok(Chunk {
            chunk_id: row.get(0)?,
            doc_id: row.get(1)?,
            doc_type: DocType::parse(&row.get::<_, String>(2)?),
            text: row.get(3)?,
            char_start: row.get::<_, i64>(4)? as usize,
            char_end: row.get::<_, i64>(5)? as usize,
            page_number: row.get::<_, i64>(6)? as u32,
            section: row.get(7)?,
            kind: ChunkKind::parse(&row.get::<_, String>(8)?),
            parent_id: row.get(9)?,
            children_ids: children
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_default(),
            metadata: metadata
                .and_then(|j| serde_json::from_str(&j).ok())
                .unwrap_or_else(ChunkMetadata::default),
        })
    }

    const CHUNK_COLUMNS: &'static str = "chunk_id, doc_id, doc_type, content, char_start, \
        char_end, page_number, section, kind, parent_id, children, metadata";

    /// Retrieves a chunk by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let sql = format!(
            "SELECT {} FROM chunks WHERE chunk_id = ?",
            Self::CHUNK_COLUMNS
        );
        self.conn
            .query_row(&sql, params![chunk_id], Self::row_to_chunk)
            .optional()
            .map_err(|e| StoreError::from(e).into())
    }

    /// Fetches chunks by ID, preserving input order; missing IDs are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn fetch_chunks(&self, chunk_ids: &[String]) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::with_capacity(chunk_ids.len());
        for chunk_id in chunk_ids {
            if let Some(chunk) = self.get_chunk(chunk_id)? {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }

    /// Retrieves all chunks for a document ordered by span start.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn chunks_for_doc(&self, doc_id: &str) -> Result<Vec<Chunk>> {
        let sql = format!(
            "SELECT {} FROM chunks WHERE doc_id = ? ORDER BY char_start, chunk_id",
            Self::CHUNK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).map_err(StoreError::from)?;
        let chunks = stmt
            .query_map(params![doc_id], Self::row_to_chunk)
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        Ok(chunks)
    }

    /// Retrieves every chunk in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let sql = format!(
            "SELECT {} FROM chunks ORDER BY doc_id, char_start",
            Self::CHUNK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).map_err(StoreError::from)?;
        let chunks = stmt
            .query_map([], Self::row_to_chunk)
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        Ok(chunks)
    }

    /// All chunk IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn chunk_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT chunk_id FROM chunks ORDER BY chunk_id")
            .map_err(StoreError::from)?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        Ok(ids)
    }

    /// Total chunk count.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn chunk_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(StoreError::from)?;
        Ok(count as usize)
    }

    // ==================== Embedding Operations ====================

    /// All chunk IDs that have embeddings.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn embedding_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT chunk_id FROM chunk_embeddings ORDER BY chunk_id")
            .map_err(StoreError::from)?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;
        Ok(ids)
    }

    /// Returns all chunk embeddings for similarity search.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT chunk_id, embedding FROM chunk_embeddings")
            .map_err(StoreError::from)?;

        let results = stmt
            .query_map([], |row| {
                let chunk_id: String = row.get(0)?;
                let bytes: Vec<u8> = row.get(1)?;
                let embedding: Vec<f32> = bytes
                    .chunks_exact(4)
                    .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                    .collect();
                Ok((chunk_id, embedding))
            })
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;

        Ok(results)
    }

    /// Performs a cosine-similarity scan over stored embeddings.
    ///
    /// Scores are normalized to [0, 1] via `(cos + 1) / 2`. Results are
    /// sorted descending and truncated to `top_k`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub fn query_similar(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<(String, f32)>> {
        use crate::embedding::{cosine_similarity, normalize_cosine};

        let allowed: Option<std::collections::HashSet<String>> = if filter.is_empty() {
            None
        } else {
            let mut stmt = self
                .conn
                .prepare(
                    r"
                    SELECT chunk_id FROM chunks
                    WHERE (?1 = '' OR doc_type = ?1)
                      AND (?2 = '' OR instr(doc_id, ?2) > 0)
                ",
                )
                .map_err(StoreError::from)?;
            let ids = stmt
                .query_map(
                    params![
                        filter.doc_type.map_or("", DocType::as_str),
                        filter.doc_id_contains.as_deref().unwrap_or(""),
                    ],
                    |row| row.get::<_, String>(0),
                )
                .map_err(StoreError::from)?
                .collect::<std::result::Result<std::collections::HashSet<_>, _>>()
                .map_err(StoreError::from)?;
            Some(ids)
        };

        let mut scored: Vec<(String, f32)> = self
            .all_embeddings()?
            .into_iter()
            .filter(|(id, _)| allowed.as_ref().is_none_or(|a| a.contains(id)))
            .map(|(id, emb)| (id, normalize_cosine(cosine_similarity(vector, &emb))))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    // ==================== Lexical Operations ====================

    /// Performs FTS5 BM25 full-text search.
    ///
    /// Returns chunk IDs and raw BM25 relevance (higher is better).
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    #[allow(clippy::cast_possible_wrap)]
    pub fn search_fts(&self, query: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        // FTS5 bm25() returns negative scores, more negative = better match;
        // negate so higher = better.

        // Convert space-separated terms to OR query for more forgiving
        // search. Each term is quoted to escape FTS5 special characters
        // (?, *, ^, etc.): "CLI tool?" becomes '"CLI" OR "tool?"'.
        let fts_query = query
            .split_whitespace()
            .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ");

        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare(
                r"
                SELECT c.chunk_id, -bm25(chunks_fts) as score
                FROM chunks_fts
                JOIN chunks c ON c.rowid = chunks_fts.rowid
                WHERE chunks_fts MATCH ?
                ORDER BY score DESC
                LIMIT ?
            ",
            )
            .map_err(StoreError::from)?;

        let results = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(StoreError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::from)?;

        Ok(results)
    }

    /// Rebuilds the FTS index from the chunks table.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuild fails.
    pub fn rebuild_fts(&mut self) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO chunks_fts(chunks_fts) VALUES('rebuild')",
                [],
            )
            .map_err(StoreError::from)?;
        Ok(())
    }

    // ==================== Utility Operations ====================

    /// Gathers store statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if statistics cannot be gathered.
    pub fn stats(&self) -> Result<StoreStats> {
        let document_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(StoreError::from)?;
        let chunk_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(StoreError::from)?;
        let embedding_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunk_embeddings", [], |row| row.get(0))
            .map_err(StoreError::from)?;

        let db_size = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len());

        Ok(StoreStats {
            document_count: document_count as usize,
            chunk_count: chunk_count as usize,
            embedding_count: embedding_count as usize,
            schema_version: self.schema_version()?.unwrap_or(0),
            db_size,
        })
    }

    /// Verifies cross-table invariants, returning human-readable issues.
    ///
    /// Checked: every child's parent exists in the same document, and the
    /// chunk and embedding ID sets match.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying queries fail.
    pub fn verify_integrity(&self) -> Result<Vec<String>> {
        let mut issues = Vec::new();

        let orphan_children: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare(
                    r"
                    SELECT c.chunk_id FROM chunks c
                    LEFT JOIN chunks p ON p.chunk_id = c.parent_id
                    WHERE c.parent_id IS NOT NULL
                      AND (p.chunk_id IS NULL OR p.doc_id != c.doc_id)
                ",
                )
                .map_err(StoreError::from)?;
            stmt.query_map([], |row| row.get(0))
                .map_err(StoreError::from)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(StoreError::from)?
        };
        for chunk_id in orphan_children {
            issues.push(format!("child {chunk_id} has a missing or cross-document parent"));
        }

        let chunk_ids: std::collections::BTreeSet<String> =
            self.chunk_ids()?.into_iter().collect();
        let embedding_ids: std::collections::BTreeSet<String> =
            self.embedding_ids()?.into_iter().collect();
        for missing in chunk_ids.difference(&embedding_ids) {
            issues.push(format!("chunk {missing} has no embedding"));
        }
        for dangling in embedding_ids.difference(&chunk_ids) {
            issues.push(format!("embedding {dangling} has no chunk"));
        }

        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChunkKind;

    fn setup() -> SqliteStore {
        let mut store = SqliteStore::in_memory().unwrap();
        store.init().unwrap();
        store
    }

    fn sample_doc() -> Document {
        Document::new(
            "newest-factsheet".into(),
            DocType::Factsheet,
            PathBuf::from("corpus/product/newest.txt"),
            "hash-1".into(),
        )
    }

    fn sample_chunks(doc: &Document) -> Vec<Chunk> {
        vec![
            Chunk::flat(
                &doc.doc_id,
                doc.doc_type,
                0,
                "Newest is a polynucleotide and hyaluronic acid gel.".into(),
                0,
                51,
            ),
            Chunk::flat(
                &doc.doc_id,
                doc.doc_type,
                1,
                "Indicated for face and neck rejuvenation.".into(),
                51,
                92,
            ),
        ]
    }

    fn embeddings_for(chunks: &[Chunk]) -> Vec<(String, Vec<f32>)> {
        chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                #[allow(clippy::cast_precision_loss)]
                let v = vec![1.0 + i as f32, 0.0, 0.5];
                (c.chunk_id.clone(), v)
            })
            .collect()
    }

    fn ingest_sample(store: &mut SqliteStore) -> (Document, Vec<Chunk>) {
        let doc = sample_doc();
        let chunks = sample_chunks(&doc);
        store.upsert_document(&doc).unwrap();
        store
            .replace_chunks(&doc.doc_id, &chunks, &embeddings_for(&chunks), "test-model")
            .unwrap();
        (doc, chunks)
    }

    #[test]
    fn test_init_idempotent() {
        let mut store = setup();
        store.init().unwrap();
        assert!(store.is_initialized().unwrap());
    }

    #[test]
    fn test_document_round_trip() {
        let mut store = setup();
        let doc = sample_doc();
        store.upsert_document(&doc).unwrap();

        let loaded = store.get_document(&doc.doc_id).unwrap().unwrap();
        assert_eq!(loaded, doc);
        assert_eq!(store.document_hash(&doc.doc_id).unwrap().as_deref(), Some("hash-1"));
        assert!(store.document_hash("missing").unwrap().is_none());
    }

    #[test]
    fn test_replace_chunks_and_fetch() {
        let mut store = setup();
        let (_, chunks) = ingest_sample(&mut store);

        let loaded = store.get_chunk(&chunks[0].chunk_id).unwrap().unwrap();
        assert_eq!(loaded, chunks[0]);

        let fetched = store
            .fetch_chunks(&[chunks[1].chunk_id.clone(), "missing".to_string()])
            .unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].chunk_id, chunks[1].chunk_id);
    }

    #[test]
    fn test_replace_chunks_is_atomic_swap() {
        let mut store = setup();
        let (doc, _) = ingest_sample(&mut store);
        assert_eq!(store.chunk_count().unwrap(), 2);

        let replacement = vec![Chunk::flat(
            &doc.doc_id,
            doc.doc_type,
            0,
            "New content entirely.".into(),
            0,
            21,
        )];
        store
            .replace_chunks(
                &doc.doc_id,
                &replacement,
                &embeddings_for(&replacement),
                "test-model",
            )
            .unwrap();
        assert_eq!(store.chunk_count().unwrap(), 1);
        assert_eq!(store.embedding_ids().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_document_cascades() {
        let mut store = setup();
        let (doc, _) = ingest_sample(&mut store);

        store.delete_document(&doc.doc_id).unwrap();
        assert_eq!(store.chunk_count().unwrap(), 0);
        assert!(store.embedding_ids().unwrap().is_empty());
        assert!(store.get_document(&doc.doc_id).unwrap().is_none());
        // FTS emptied via triggers
        assert!(store.search_fts("polynucleotide", 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_fts() {
        let mut store = setup();
        let (_, chunks) = ingest_sample(&mut store);

        let results = store.search_fts("polynucleotide", 10).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].0, chunks[0].chunk_id);

        let none = store.search_fts("zzzznonexistent", 10).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_search_fts_empty_query() {
        let mut store = setup();
        ingest_sample(&mut store);
        assert!(store.search_fts("   ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_query_similar_orders_by_cosine() {
        let mut store = setup();
        let (_, chunks) = ingest_sample(&mut store);

        // Vector aligned with the second chunk's embedding direction
        let results = store
            .query_similar(&[2.0, 0.0, 0.5], 10, &QueryFilter::default())
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].1 >= results[1].1);
        for (_, score) in &results {
            assert!((0.0..=1.0).contains(score));
        }
        assert!(results.iter().any(|(id, _)| id == &chunks[0].chunk_id));
    }

    #[test]
    fn test_query_similar_filter_by_doc_type() {
        let mut store = setup();
        ingest_sample(&mut store);

        let filter = QueryFilter {
            doc_type: Some(DocType::Protocol),
            ..QueryFilter::default()
        };
        let results = store.query_similar(&[1.0, 0.0, 0.5], 10, &filter).unwrap();
        assert!(results.is_empty());

        let filter = QueryFilter {
            doc_type: Some(DocType::Factsheet),
            ..QueryFilter::default()
        };
        let results = store.query_similar(&[1.0, 0.0, 0.5], 10, &filter).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_rebuild_fts() {
        let mut store = setup();
        ingest_sample(&mut store);
        store.rebuild_fts().unwrap();
        assert!(!store.search_fts("rejuvenation", 10).unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let mut store = setup();
        ingest_sample(&mut store);
        let stats = store.stats().unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.embedding_count, 2);
        assert_eq!(stats.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_verify_integrity_clean() {
        let mut store = setup();
        ingest_sample(&mut store);
        assert!(store.verify_integrity().unwrap().is_empty());
    }

    #[test]
    fn test_verify_integrity_detects_missing_embedding() {
        let mut store = setup();
        let doc = sample_doc();
        let chunks = sample_chunks(&doc);
        store.upsert_document(&doc).unwrap();
        // Only embed the first chunk
        let embeddings = embeddings_for(&chunks[..1]);
        store
            .replace_chunks(&doc.doc_id, &chunks, &embeddings, "test-model")
            .unwrap();

        let issues = store.verify_integrity().unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("no embedding"));
    }

    #[test]
    fn test_verify_integrity_detects_orphan_child() {
        let mut store = setup();
        let doc = sample_doc();
        let mut chunks = sample_chunks(&doc);
        chunks[1].kind = ChunkKind::Child;
        chunks[1].parent_id = Some("missing-parent".to_string());
        store.upsert_document(&doc).unwrap();
        store
            .replace_chunks(&doc.doc_id, &chunks, &embeddings_for(&chunks), "test-model")
            .unwrap();

        let issues = store.verify_integrity().unwrap();
        assert!(issues.iter().any(|i| i.contains("missing or cross-document parent")));
    }

    #[test]
    fn test_chunks_for_doc_ordered() {
        let mut store = setup();
        let (doc, _) = ingest_sample(&mut store);
        let chunks = store.chunks_for_doc(&doc.doc_id).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].char_start < chunks[1].char_start);
    }

    #[test]
    fn test_reset() {
        let mut store = setup();
        ingest_sample(&mut store);
        store.reset().unwrap();
        assert_eq!(store.chunk_count().unwrap(), 0);
        assert!(store.list_documents().unwrap().is_empty());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/store.db");
        let mut store = SqliteStore::open(&path).unwrap();
        store.init().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_query_filter_cache_key_part() {
        let filter = QueryFilter {
            doc_type: Some(DocType::Factsheet),
            doc_id_contains: Some("newest".into()),
        };
        assert_eq!(filter.cache_key_part(), "factsheet|newest");
        assert_eq!(QueryFilter::default().cache_key_part(), "|");
    }
}
