//! Error types for clinrag operations.
//!
//! This module provides a comprehensive error hierarchy using `thiserror` for
//! all retrieval-core operations including storage, chunking, embedding,
//! retrieval, ingestion, and evaluation.

use thiserror::Error;

/// Result type alias for clinrag operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for clinrag operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage-related errors (database operations).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Chunking-related errors (text processing).
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    /// Embedding provider errors.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Retrieval orchestration errors.
    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Ingestion pipeline errors.
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Evaluation harness errors.
    #[error("eval error: {0}")]
    Eval(#[from] EvalError),

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Daily cost ceiling exceeded; new provider calls fail fast.
    #[error("daily cost ceiling reached: spent {spent_usd:.2} USD of {ceiling_usd:.2} USD")]
    CostLimit {
        /// Cumulative spend for the current day.
        spent_usd: f64,
        /// Configured daily ceiling.
        ceiling_usd: f64,
    },
}

/// Storage-specific errors for database operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Store not initialized (init command not run).
    #[error("store not initialized. Run: clinrag init")]
    NotInitialized,

    /// Document not found by ID.
    #[error("document not found: {doc_id}")]
    DocumentNotFound {
        /// Document ID that was not found.
        doc_id: String,
    },

    /// Chunk not found by ID.
    #[error("chunk not found: {chunk_id}")]
    ChunkNotFound {
        /// Chunk ID that was not found.
        chunk_id: String,
    },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Chunking-specific errors for text processing.
#[derive(Error, Debug)]
pub enum ChunkingError {
    /// Invalid chunk configuration.
    #[error("invalid chunk configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Overlap exceeds chunk size.
    #[error("overlap {overlap} must be less than chunk size {size}")]
    OverlapTooLarge {
        /// Overlap size.
        overlap: usize,
        /// Chunk size.
        size: usize,
    },

    /// Document content could not be chunked.
    #[error("malformed document {doc_id}: {reason}")]
    MalformedDocument {
        /// Document the failure belongs to.
        doc_id: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(String),
}

/// Embedding-provider errors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider call failed (after local handling, before retries exhaust).
    #[error("embedding provider error: {reason}")]
    Provider {
        /// Reason reported by the provider.
        reason: String,
    },

    /// Retries exhausted against the provider.
    #[error("embedding failed after {attempts} attempts: {reason}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last failure reason.
        reason: String,
    },

    /// Input exceeds the segmentable maximum; never truncated silently.
    #[error("input of {chars} chars exceeds maximum of {max} chars")]
    InputTooLarge {
        /// Input length in characters.
        chars: usize,
        /// Maximum supported length.
        max: usize,
    },

    /// Provider returned a vector of unexpected dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },
}

/// Retrieval orchestration errors.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Empty query string.
    #[error("query must not be empty")]
    EmptyQuery,

    /// A retrieval stage failed terminally.
    #[error("retrieval failed at {stage}: {reason}")]
    Failed {
        /// Pipeline stage name.
        stage: String,
        /// Failure reason.
        reason: String,
    },
}

/// Ingestion pipeline errors.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Source path does not exist.
    #[error("source not found: {path}")]
    SourceNotFound {
        /// Path that was not found.
        path: String,
    },

    /// Store left in an inconsistent state (delete succeeded, upsert failed).
    #[error("inconsistent state for {doc_id}: {reason}; re-run with --force")]
    InconsistentState {
        /// Affected document.
        doc_id: String,
        /// What went wrong.
        reason: String,
    },
}

/// Evaluation harness errors.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Dataset file could not be parsed.
    #[error("invalid dataset: {reason}")]
    InvalidDataset {
        /// Parse or validation failure.
        reason: String,
    },

    /// Dataset version does not match the requested version.
    #[error("dataset version mismatch: expected {expected}, found {actual}")]
    DatasetVersionMismatch {
        /// Version pinned by the caller.
        expected: String,
        /// Version found in the dataset file.
        actual: String,
    },

    /// Judge call failed for a dimension (non-fatal at the case level).
    #[error("judge failure for {dimension}: {reason}")]
    JudgeFailure {
        /// Dimension being scored.
        dimension: String,
        /// Failure reason.
        reason: String,
    },
}

/// I/O-specific errors for file operations.
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to read file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write file.
    #[error("failed to write file: {path}: {reason}")]
    WriteFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Memory mapping error.
    #[error("memory mapping failed: {path}: {reason}")]
    MmapFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Directory creation error.
    #[error("failed to create directory: {path}: {reason}")]
    DirectoryFailed {
        /// Path to the directory.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

/// CLI command-specific errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    /// Command execution failed.
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    /// Output format error.
    #[error("output format error: {0}")]
    OutputFormat(String),
}

// Implement From traits for standard library errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<regex::Error> for ChunkingError {
    fn from(err: regex::Error) -> Self {
        Self::Regex(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidDataset {
            reason: err.to_string(),
        }
    }
}
