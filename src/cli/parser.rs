//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// clinrag: clinical-knowledge retrieval and answer-grounding core.
///
/// Ingests extracted clinical documents into a hybrid searchable store,
/// answers evidence queries with sufficiency gating, and runs the
/// automated evaluation tiers.
#[derive(Parser, Debug)]
#[command(name = "clinrag")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the clinrag database file.
    ///
    /// Defaults to `.clinrag/clinrag.db` in the current directory.
    #[arg(short, long, env = "CLINRAG_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the clinrag database.
    ///
    /// Creates the database file and schema if they don't exist.
    Init {
        /// Force re-initialization (destroys existing data).
        #[arg(short, long)]
        force: bool,
    },

    /// Show store status and statistics.
    Status,

    /// Ingest a document file or directory tree.
    Ingest {
        /// Path to an extracted-text file or a category directory tree.
        path: PathBuf,

        /// Re-ingest even when the content hash is unchanged.
        #[arg(short, long)]
        force: bool,
    },

    /// Run a question through retrieval and the evidence gate.
    Query {
        /// The question.
        question: String,

        /// Number of chunks to return.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Run the evaluation harness over a dataset.
    RunEval {
        /// Path to the dataset JSON file.
        #[arg(long)]
        dataset: PathBuf,

        /// Pinned dataset version; a mismatch fails the gate.
        #[arg(long)]
        dataset_version: Option<String>,

        /// Where to write the report JSON.
        #[arg(long)]
        report: PathBuf,
    },

    /// Generate a synthetic Q/A dataset from the chunk store.
    GenerateSynthetic {
        /// Target number of cases.
        #[arg(long, default_value = "25")]
        chunks: usize,

        /// Output dataset path.
        #[arg(long)]
        output: PathBuf,
    },

    /// Score a dataset with the LLM judge (cached).
    JudgeEval {
        /// Path to the dataset JSON file.
        #[arg(long)]
        dataset: PathBuf,

        /// Where to write the judge report JSON.
        #[arg(long)]
        report: PathBuf,

        /// Bypass the persistent judge cache.
        #[arg(long)]
        no_cache: bool,
    },
}

impl Cli {
    /// Returns the database path, using the default if not specified.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::config::DEFAULT_DB_PATH))
    }
}
