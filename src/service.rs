//! Typed service container and the query entry point.
//!
//! All components are wired here with explicit constructor dependencies;
//! there are no global singletons, so tests swap in doubles by building
//! the container from parts.

use crate::config::Settings;
use crate::cost::CostTracker;
use crate::embedding::{EmbeddingGateway, create_embedder};
use crate::error::Result;
use crate::evidence::{CANONICAL_REFUSAL, EvidenceAssessment, assess};
use crate::ingest::{IngestPipeline, IngestReport};
use crate::rerank::RerankerChain;
use crate::router::{QueryType, policy_for};
use crate::search::{QueryState, RetrievalBundle, Retriever};
use crate::store::{LexicalIndex, SharedStore, SqliteStore, StoreStats, VectorStore, shared, with_store};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Response of the query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// The question asked.
    pub question: String,
    /// Classified query type.
    pub query_type: QueryType,
    /// Terminal query state (`answered` or `refused`).
    pub state: QueryState,
    /// The retrieved evidence bundle.
    pub retrieved: RetrievalBundle,
    /// Evidence assessment.
    pub evidence: EvidenceAssessment,
    /// The canonical refusal text when the state is `refused`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

/// The wired service container.
pub struct Services {
    /// Runtime settings.
    pub settings: Settings,
    /// Shared backing store.
    pub store: SharedStore,
    /// Embedding gateway.
    pub embedder: Arc<EmbeddingGateway>,
    /// Retrieval orchestrator.
    pub retriever: Retriever,
    /// Ingestion pipeline.
    pub ingest: IngestPipeline,
    /// Cost circuit breaker shared by provider-facing components.
    pub costs: Arc<CostTracker>,
}

impl Services {
    /// Opens the on-disk store and wires every component.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or a component
    /// fails to initialize.
    pub fn open(settings: Settings) -> Result<Self> {
        let mut store = SqliteStore::open(&settings.db_path)?;
        store.init()?;
        Self::from_store(store, settings)
    }

    /// Builds the container over an in-memory store (tests, dry runs).
    ///
    /// # Errors
    ///
    /// Returns an error if a component fails to initialize.
    pub fn in_memory(settings: Settings) -> Result<Self> {
        let mut store = SqliteStore::in_memory()?;
        store.init()?;
        Self::from_store(store, settings)
    }

    fn from_store(store: SqliteStore, settings: Settings) -> Result<Self> {
        let store = shared(store);
        let costs = Arc::new(CostTracker::new(settings.daily_cost_threshold_usd));

        let provider = create_embedder(settings.embedding_dimension)?;
        let embedder = Arc::new(EmbeddingGateway::new(
            provider,
            settings.embedding_cache_ttl,
            Arc::clone(&costs),
        ));

        let vector = VectorStore::new(Arc::clone(&store), settings.vector_cache_ttl);
        let lexical = LexicalIndex::new(Arc::clone(&store));
        let reranker = settings.reranker_enabled.then(|| {
            RerankerChain::for_provider(settings.reranker_provider, settings.rerank_timeout)
        });
        let retriever = Retriever::new(vector, lexical, Arc::clone(&embedder), reranker);

        let ingest = IngestPipeline::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            settings.clone(),
        );

        Ok(Self {
            settings,
            store,
            embedder,
            retriever,
            ingest,
            costs,
        })
    }

    /// Ingests a path and refreshes the retrieval caches.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is missing; per-document failures
    /// land in the report.
    pub fn ingest_path(&self, path: &Path, force: bool) -> Result<IngestReport> {
        let report = self.ingest.ingest_path(path, force)?;
        self.retriever.invalidate_caches();
        Ok(report)
    }

    /// Runs the full query pipeline: classify, retrieve, gate.
    ///
    /// The returned state is `refused` when evidence is insufficient; the
    /// generator downstream must then emit the canonical refusal.
    ///
    /// # Errors
    ///
    /// Returns an error on empty questions or terminal retrieval
    /// failures.
    pub fn query(&self, question: &str, top_k: Option<usize>) -> Result<QueryResponse> {
        let final_k = top_k.unwrap_or(self.settings.rerank_top_k);
        let policy = policy_for(question, &self.settings);
        let bundle = self.retriever.retrieve(question, &policy, final_k)?;
        let evidence = assess(&bundle, &self.settings, policy.query_type);

        let state = if evidence.sufficient {
            QueryState::Answered
        } else {
            QueryState::Refused
        };
        info!(
            query_type = policy.query_type.as_str(),
            sufficient = evidence.sufficient,
            strong_matches = evidence.strong_matches,
            "query evaluated"
        );

        Ok(QueryResponse {
            question: question.to_string(),
            query_type: policy.query_type,
            state,
            retrieved: bundle,
            evidence,
            refusal: (state == QueryState::Refused).then(|| CANONICAL_REFUSAL.to_string()),
        })
    }

    /// Answer verification hook: heuristic triad over an externally
    /// generated answer.
    #[must_use]
    pub fn verify_answer(
        &self,
        question: &str,
        bundle: &RetrievalBundle,
        answer: &str,
    ) -> crate::core::TriadScores {
        crate::eval::triad_scores(question, answer, bundle, 1.0, false)
    }

    /// Store statistics for the status command.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn stats(&self) -> Result<StoreStats> {
        with_store(&self.store, |s| s.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let product = dir.path().join("product");
        std::fs::create_dir_all(&product).unwrap();
        std::fs::write(
            product.join("newest-factsheet.txt"),
            "Newest Overview\nNewest is an injectable polynucleotide and hyaluronic acid gel.\n\
             Treatment Areas\nFace and neck rejuvenation for skin elasticity.\n",
        )
        .unwrap();
        dir
    }

    fn services(dir: &tempfile::TempDir) -> Services {
        let settings = Settings {
            index_dir: dir.path().join("index"),
            ..Settings::for_tests()
        };
        Services::in_memory(settings).unwrap()
    }

    #[test]
    fn test_query_after_ingest() {
        let dir = corpus_dir();
        let services = services(&dir);
        let report = services.ingest_path(dir.path(), false).unwrap();
        assert!(report.is_clean());

        let response = services.query("What is Newest?", None).unwrap();
        assert_eq!(response.query_type, QueryType::ProductInfo);
        assert!(!response.retrieved.chunks.is_empty());
        assert!(response
            .retrieved
            .chunks
            .iter()
            .any(|c| c.chunk.doc_id == "newest-factsheet"));
    }

    #[test]
    fn test_refusal_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let services = services(&dir);
        let response = services.query("What is the capital of France?", None).unwrap();
        assert_eq!(response.state, QueryState::Refused);
        assert!(!response.evidence.sufficient);
        assert_eq!(response.refusal.as_deref(), Some(CANONICAL_REFUSAL));
    }

    #[test]
    fn test_empty_question_errors() {
        let dir = tempfile::tempdir().unwrap();
        let services = services(&dir);
        assert!(services.query("", None).is_err());
    }

    #[test]
    fn test_top_k_override() {
        let dir = corpus_dir();
        let services = services(&dir);
        services.ingest_path(dir.path(), false).unwrap();
        let response = services.query("Newest polynucleotide gel", Some(1)).unwrap();
        assert!(response.retrieved.chunks.len() <= 1);
    }

    #[test]
    fn test_verify_answer_hook() {
        let dir = corpus_dir();
        let services = services(&dir);
        services.ingest_path(dir.path(), false).unwrap();
        let response = services.query("What is Newest?", None).unwrap();
        let triad = services.verify_answer(
            "What is Newest?",
            &response.retrieved,
            "The gel Newest combines polynucleotide and hyaluronic components.",
        );
        assert!(triad.combined() > 0.0);
    }

    #[test]
    fn test_stats() {
        let dir = corpus_dir();
        let services = services(&dir);
        services.ingest_path(dir.path(), false).unwrap();
        let stats = services.stats().unwrap();
        assert_eq!(stats.document_count, 1);
        assert!(stats.chunk_count > 0);
    }
}
