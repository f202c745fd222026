//! Runtime configuration loaded from environment variables.
//!
//! Every recognized variable has a default so a bare environment works
//! out of the box. Values are read once into a [`Settings`] struct that is
//! passed explicitly to the components that need it; no component reads the
//! environment on its own.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default database path relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".clinrag/clinrag.db";

/// Default companion document-index directory.
pub const DEFAULT_INDEX_DIR: &str = ".clinrag/doc-index";

/// Default judge-cache directory.
pub const DEFAULT_JUDGE_CACHE_DIR: &str = ".clinrag/judge-cache";

/// Which reranker implementations the chain should try, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankerProvider {
    /// Full fallback chain: remote, then local model, then lexical overlap.
    Chain,
    /// Local cross-encoder model only (plus the lexical terminal fallback).
    Local,
    /// Lexical overlap scoring only.
    Lexical,
}

impl RerankerProvider {
    /// Parses a provider name. Unknown names fall back to the full chain.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "local" => Self::Local,
            "lexical" => Self::Lexical,
            _ => Self::Chain,
        }
    }
}

/// Runtime settings for the retrieval core.
///
/// Defaults match the documented environment contract; see `Settings::from_env`
/// for the variable names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Score at or above which a chunk counts as a strong match.
    pub strong_match_threshold: f32,
    /// Threshold for the evidence-sufficiency gate (same scale, tunable
    /// independently of `strong_match_threshold`).
    pub evidence_sufficiency_threshold: f32,
    /// Weight of the semantic branch in hybrid fusion.
    pub hybrid_vector_weight: f32,
    /// Weight of the lexical (BM25) branch in hybrid fusion.
    pub hybrid_bm25_weight: f32,
    /// Whether reranking is applied at all.
    pub reranker_enabled: bool,
    /// Final number of chunks returned by a query when the caller does not
    /// specify one.
    pub rerank_top_k: usize,
    /// Which reranker implementations to use.
    pub reranker_provider: RerankerProvider,
    /// Fixed embedding dimension for this deployment.
    pub embedding_dimension: usize,
    /// TTL for the embedding cache.
    pub embedding_cache_ttl: Duration,
    /// TTL for the vector-query cache.
    pub vector_cache_ttl: Duration,
    /// Daily cost ceiling in USD; `None` disables the circuit breaker.
    pub daily_cost_threshold_usd: Option<f64>,
    /// Directory holding the persistent judge cache.
    pub judge_cache_dir: PathBuf,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Companion per-document index directory.
    pub index_dir: PathBuf,
    /// Cooperative delay between ingest embedding batches.
    pub ingest_batch_delay: Duration,
    /// Per-call timeout for embedding providers.
    pub embed_timeout: Duration,
    /// Per-call timeout for vector-store queries.
    pub vector_timeout: Duration,
    /// Per-call timeout for a single reranker implementation.
    pub rerank_timeout: Duration,
    /// Per-call timeout for judge calls.
    pub judge_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strong_match_threshold: 0.50,
            evidence_sufficiency_threshold: 0.50,
            hybrid_vector_weight: 0.7,
            hybrid_bm25_weight: 0.3,
            reranker_enabled: true,
            rerank_top_k: 5,
            reranker_provider: RerankerProvider::Chain,
            embedding_dimension: 1536,
            embedding_cache_ttl: Duration::from_secs(3600),
            vector_cache_ttl: Duration::from_secs(1800),
            daily_cost_threshold_usd: None,
            judge_cache_dir: PathBuf::from(DEFAULT_JUDGE_CACHE_DIR),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            ingest_batch_delay: Duration::from_secs(2),
            embed_timeout: Duration::from_secs(5),
            vector_timeout: Duration::from_secs(3),
            rerank_timeout: Duration::from_secs(2),
            judge_timeout: Duration::from_secs(20),
        }
    }
}

impl Settings {
    /// Loads settings from the environment, falling back to defaults.
    ///
    /// Recognized variables: `STRONG_MATCH_THRESHOLD`,
    /// `EVIDENCE_SUFFICIENCY_THRESHOLD`, `HYBRID_VECTOR_WEIGHT`,
    /// `HYBRID_BM25_WEIGHT`, `RERANKER_ENABLED`, `RERANK_TOP_K`,
    /// `RERANKER_PROVIDER`, `EMBEDDING_DIMENSION`,
    /// `EMBEDDING_CACHE_TTL_SECONDS`, `VECTOR_CACHE_TTL_SECONDS`,
    /// `DAILY_COST_THRESHOLD_USD`, `JUDGE_CACHE_DIR`, `CLINRAG_DB_PATH`,
    /// `CLINRAG_INDEX_DIR`, `INGEST_BATCH_DELAY_MS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();

        settings.strong_match_threshold =
            env_parse("STRONG_MATCH_THRESHOLD", settings.strong_match_threshold)?;
        settings.evidence_sufficiency_threshold = env_parse(
            "EVIDENCE_SUFFICIENCY_THRESHOLD",
            settings.evidence_sufficiency_threshold,
        )?;
        settings.hybrid_vector_weight =
            env_parse("HYBRID_VECTOR_WEIGHT", settings.hybrid_vector_weight)?;
        settings.hybrid_bm25_weight =
            env_parse("HYBRID_BM25_WEIGHT", settings.hybrid_bm25_weight)?;
        settings.reranker_enabled = env_parse("RERANKER_ENABLED", settings.reranker_enabled)?;
        settings.rerank_top_k = env_parse("RERANK_TOP_K", settings.rerank_top_k)?;
        if let Ok(v) = std::env::var("RERANKER_PROVIDER") {
            settings.reranker_provider = RerankerProvider::parse(&v);
        }
        settings.embedding_dimension =
            env_parse("EMBEDDING_DIMENSION", settings.embedding_dimension)?;
        settings.embedding_cache_ttl = Duration::from_secs(env_parse(
            "EMBEDDING_CACHE_TTL_SECONDS",
            settings.embedding_cache_ttl.as_secs(),
        )?);
        settings.vector_cache_ttl = Duration::from_secs(env_parse(
            "VECTOR_CACHE_TTL_SECONDS",
            settings.vector_cache_ttl.as_secs(),
        )?);
        if let Ok(v) = std::env::var("DAILY_COST_THRESHOLD_USD") {
            let ceiling: f64 = v.parse().map_err(|_| Error::Config {
                message: format!("DAILY_COST_THRESHOLD_USD is not a number: {v}"),
            })?;
            settings.daily_cost_threshold_usd = Some(ceiling);
        }
        if let Ok(v) = std::env::var("JUDGE_CACHE_DIR") {
            settings.judge_cache_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CLINRAG_DB_PATH") {
            settings.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CLINRAG_INDEX_DIR") {
            settings.index_dir = PathBuf::from(v);
        }
        settings.ingest_batch_delay = Duration::from_millis(env_parse(
            "INGEST_BATCH_DELAY_MS",
            u64::try_from(settings.ingest_batch_delay.as_millis()).unwrap_or(2000),
        )?);

        settings.validate()?;
        Ok(settings)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the fusion weights are not positive or
    /// the thresholds are outside [0, 1].
    pub fn validate(&self) -> Result<()> {
        if self.hybrid_vector_weight < 0.0 || self.hybrid_bm25_weight < 0.0 {
            return Err(Error::Config {
                message: "hybrid weights must be non-negative".to_string(),
            });
        }
        if self.hybrid_vector_weight + self.hybrid_bm25_weight <= 0.0 {
            return Err(Error::Config {
                message: "hybrid weights must not both be zero".to_string(),
            });
        }
        for (name, value) in [
            ("STRONG_MATCH_THRESHOLD", self.strong_match_threshold),
            (
                "EVIDENCE_SUFFICIENCY_THRESHOLD",
                self.evidence_sufficiency_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config {
                    message: format!("{name} must be within [0, 1], got {value}"),
                });
            }
        }
        if self.rerank_top_k == 0 {
            return Err(Error::Config {
                message: "RERANK_TOP_K must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// A settings profile suited to tests: in-memory-friendly paths and no
    /// cooperative delays.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            ingest_batch_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Parses an environment variable into `T`, returning `default` when unset.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| Error::Config {
            message: format!("{key} could not be parsed: {raw}"),
        }),
        Err(_) => Ok(default),
    }
}
