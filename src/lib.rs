//! # clinrag
//!
//! Clinical-knowledge retrieval and answer-grounding core for a medical
//! question-answering assistant.
//!
//! The crate ingests extracted clinical documents (factsheets, protocols,
//! papers, case studies, brochures) into a hybrid searchable store,
//! retrieves and reranks evidence for a question, gates answers on
//! evidence sufficiency, and evaluates answer quality with a three-tier
//! framework (heuristic triad, synthetic Q/A generation, LLM-as-judge).
//!
//! ## Features
//!
//! - **Chunking**: Document-type-specific strategies (hierarchical,
//!   section-based, protocol-aware) with exact offsets
//! - **Hybrid search**: Weighted fusion of vector similarity and FTS5
//!   BM25 over the same chunk corpus
//! - **Reranking**: Provider fallback chain terminating in a
//!   never-failing lexical scorer
//! - **Evidence gating**: Refusal instead of hallucination when retrieved
//!   scores stay below threshold
//! - **Evaluation**: Deterministic triad metrics, synthetic dataset
//!   generation, and a cached four-dimension judge

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped I/O (memmap2)
#![warn(unsafe_code)]

pub mod cache;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod core;
pub mod cost;
pub mod embedding;
pub mod enrich;
pub mod error;
pub mod eval;
pub mod evidence;
pub mod ingest;
pub mod io;
pub mod rerank;
pub mod router;
pub mod search;
pub mod service;
pub mod store;
pub mod text;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{Chunk, ChunkKind, ChunkMetadata, Dataset, DocType, Document, QueryCase};

// Re-export configuration
pub use config::Settings;

// Re-export the service container and query surface
pub use service::{QueryResponse, Services};

// Re-export retrieval types
pub use search::{QueryState, RetrievalBundle, RetrievedChunk, Retriever};

// Re-export the evidence gate
pub use evidence::{CANONICAL_REFUSAL, EvidenceAssessment};

// Re-export embedding types
#[cfg(feature = "fastembed-embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use embedding::{DEFAULT_DIMENSIONS, Embedder, EmbeddingGateway, FallbackEmbedder, cosine_similarity};

// Re-export store types
pub use store::{LexicalIndex, QueryFilter, SqliteStore, VectorStore};

// Re-export router types
pub use router::{QueryType, RetrievalPolicy};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
