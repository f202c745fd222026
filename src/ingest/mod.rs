//! Ingestion pipeline: extract → chunk → enrich → embed → upsert.
//!
//! Ingestion is idempotent per content hash and resumable: a failed
//! document is recorded in the run report with its stage and reason, and
//! the batch continues. The chunk swap for a document is transactional,
//! so a failed upload keeps the previous chunk set. The FTS index is
//! rebuilt once at the end of a run.

use crate::cache::content_key;
use crate::chunking::{chunker_for, extract_protocol_info};
use crate::config::Settings;
use crate::core::{Chunk, DocType, Document};
use crate::embedding::{Embedder, EmbeddingGateway};
use crate::enrich::{enrich_chunks, tag_document};
use crate::error::{ChunkingError, IngestError, IoError, Result};
use crate::io::read_document;
use crate::store::{SharedStore, with_store};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Maximum chunks per embedding sub-batch.
const MAX_EMBED_BATCH: usize = 100;

/// Source file extensions accepted by the directory scan.
const SOURCE_EXTENSIONS: &[&str] = &["txt", "md", "text"];

/// Outcome of one document that could not be ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFailure {
    /// Source path of the document.
    pub path: String,
    /// Pipeline stage that failed.
    pub stage: String,
    /// Failure reason.
    pub reason: String,
}

/// Report for one ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Documents ingested or re-ingested.
    pub documents_processed: usize,
    /// Total chunks produced across processed documents.
    pub chunks_produced: usize,
    /// Documents skipped because their content hash was unchanged.
    pub skipped: Vec<String>,
    /// Per-document failures; a failure never aborts the run.
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    /// Whether every document either processed or skipped cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Companion on-disk index entry for one document, allowing re-enrichment
/// without re-extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocIndexEntry {
    /// Document ID.
    pub doc_id: String,
    /// Content hash the chunks were derived from.
    pub content_hash: String,
    /// The derived chunks.
    pub chunks: Vec<Chunk>,
}

/// The ingestion pipeline.
pub struct IngestPipeline {
    store: SharedStore,
    embedder: Arc<EmbeddingGateway>,
    settings: Settings,
}

impl IngestPipeline {
    /// Creates the pipeline.
    #[must_use]
    pub fn new(store: SharedStore, embedder: Arc<EmbeddingGateway>, settings: Settings) -> Self {
        Self {
            store,
            embedder,
            settings,
        }
    }

    /// Ingests a file or directory tree.
    ///
    /// Directories are scanned recursively for extracted-text files; the
    /// category directory name feeds document-type inference. The FTS
    /// index is rebuilt once at the end of the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist; per-document failures
    /// land in the report instead.
    pub fn ingest_path(&self, path: &Path, force: bool) -> Result<IngestReport> {
        if !path.exists() {
            return Err(IngestError::SourceNotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let files = if path.is_dir() {
            scan_sources(path)?
        } else {
            vec![path.to_path_buf()]
        };

        let mut report = IngestReport::default();
        let total = files.len();
        for (i, file) in files.iter().enumerate() {
            match self.ingest_file(file, force) {
                Ok(DocOutcome::Processed { chunks }) => {
                    report.documents_processed += 1;
                    report.chunks_produced += chunks;
                }
                Ok(DocOutcome::Skipped { doc_id }) => report.skipped.push(doc_id),
                Err((stage, reason)) => {
                    warn!(path = %file.display(), stage, reason = %reason, "document failed to ingest");
                    report.failures.push(IngestFailure {
                        path: file.display().to_string(),
                        stage: stage.to_string(),
                        reason,
                    });
                }
            }
            // Cooperative pacing toward upstream quotas
            if i + 1 < total && !self.settings.ingest_batch_delay.is_zero() {
                std::thread::sleep(self.settings.ingest_batch_delay);
            }
        }

        with_store(&self.store, crate::store::SqliteStore::rebuild_fts)?;
        info!(
            processed = report.documents_processed,
            chunks = report.chunks_produced,
            skipped = report.skipped.len(),
            failures = report.failures.len(),
            "ingest run complete"
        );
        Ok(report)
    }

    /// Ingests a single document; errors carry the failing stage.
    fn ingest_file(&self, path: &Path, force: bool) -> std::result::Result<DocOutcome, (&'static str, String)> {
        let doc_text = read_document(path).map_err(|e| ("read", e.to_string()))?;
        let content_hash = content_key(doc_text.text.as_bytes());
        let doc_id = Document::doc_id_from_path(path);

        let existing = with_store(&self.store, |s| s.document_hash(&doc_id))
            .map_err(|e| ("store", e.to_string()))?;
        if !force && existing.as_deref() == Some(content_hash.as_str()) {
            return Ok(DocOutcome::Skipped { doc_id });
        }

        let mut doc_type = DocType::from_directory(path);
        if doc_type == DocType::Unknown {
            doc_type = DocType::from_content(&doc_text.text);
        }
        let document = Document::new(doc_id.clone(), doc_type, path.to_path_buf(), content_hash.clone());

        let chunker = chunker_for(doc_type);
        let mut chunks = chunker
            .chunk(&document, &doc_text.text, &doc_text.pages)
            .map_err(|e| ("chunk", e.to_string()))?;
        if chunks.is_empty() {
            return Err((
                "chunk",
                ChunkingError::MalformedDocument {
                    doc_id: doc_id.clone(),
                    reason: "document produced no chunks".to_string(),
                }
                .to_string(),
            ));
        }

        // Document-level enrichment: taxonomy tags plus protocol info,
        // copied into every chunk
        let tags = tag_document(&doc_text.text);
        let protocol = extract_protocol_info(&doc_text.text);
        enrich_chunks(&mut chunks, &tags, &protocol);

        // Embed in bounded sub-batches; the gateway retries internally
        let mut embeddings: Vec<(String, Vec<f32>)> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(MAX_EMBED_BATCH) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .map_err(|e| ("embed", e.to_string()))?;
            for (chunk, vector) in batch.iter().zip(vectors) {
                embeddings.push((chunk.chunk_id.clone(), vector));
            }
        }

        let chunk_count = chunks.len();
        let model_name = self.embedder.model_name();
        with_store(&self.store, |s| {
            s.upsert_document(&document)?;
            s.replace_chunks(&doc_id, &chunks, &embeddings, model_name)
        })
        .map_err(|e| ("store", e.to_string()))?;

        self.write_doc_index(&DocIndexEntry {
            doc_id: doc_id.clone(),
            content_hash,
            chunks,
        })
        .map_err(|e| ("index", e.to_string()))?;

        info!(doc_id = %doc_id, doc_type = %doc_type, chunks = chunk_count, "document ingested");
        Ok(DocOutcome::Processed { chunks: chunk_count })
    }

    /// Writes the companion per-document index file.
    fn write_doc_index(&self, entry: &DocIndexEntry) -> Result<()> {
        let dir = &self.settings.index_dir;
        std::fs::create_dir_all(dir).map_err(|e| IoError::DirectoryFailed {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = dir.join(format!("{}.json", entry.doc_id));
        let json = serde_json::to_string_pretty(entry)
            .map_err(|e| crate::error::StoreError::Serialization(e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| IoError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Loads a companion index entry, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry exists but cannot be parsed.
    pub fn load_doc_index(&self, doc_id: &str) -> Result<Option<DocIndexEntry>> {
        let path = self.settings.index_dir.join(format!("{doc_id}.json"));
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| IoError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let entry = serde_json::from_str(&raw)
            .map_err(|e| crate::error::StoreError::Serialization(e.to_string()))?;
        Ok(Some(entry))
    }
}

enum DocOutcome {
    Processed { chunks: usize },
    Skipped { doc_id: String },
}

/// Recursively collects source files under a directory, sorted for
/// deterministic runs.
fn scan_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current).map_err(|e| IoError::ReadFailed {
            path: current.display().to_string(),
            reason: e.to_string(),
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| IoError::ReadFailed {
                path: current.display().to_string(),
                reason: e.to_string(),
            })?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| SOURCE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
