//! Core domain types: documents, chunks, and evaluation fixtures.

pub mod case;
pub mod chunk;
pub mod document;

pub use case::{CaseResult, Dataset, QueryCase, ScoringMethod, TriadScores};
pub use chunk::{Chunk, ChunkKind, ChunkMetadata};
pub use document::{DocType, Document};
