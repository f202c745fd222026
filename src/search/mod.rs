//! Retrieval orchestration: hybrid search, hierarchy expansion, boosting,
//! reranking, and the retrieval-details trace.
//!
//! The orchestrator runs the semantic and lexical branches over the same
//! expanded query, fuses them by weighted rank, attaches parent context
//! for child chunks, applies the router's policy boosts, reranks the top
//! pool, and truncates to the final budget. Every step is recorded in a
//! [`RetrievalDetails`] struct for the evaluation harness and API
//! consumers.

pub mod fusion;

pub use fusion::{FusedCandidate, Origin, fuse};

use crate::core::Chunk;
use crate::embedding::{Embedder, EmbeddingGateway};
use crate::error::{Result, RetrievalError};
use crate::rerank::RerankerChain;
use crate::router::{RetrievalPolicy, expand_query};
use crate::store::{LexicalIndex, QueryFilter, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Multiplicative boost applied when a child and its parent are both
/// retrieved.
const PARENT_CHILD_BOOST: f32 = 1.1;

/// Rerank pool multiplier over the final budget.
const RERANK_POOL_MULTIPLIER: usize = 3;

/// Lifecycle states of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    /// Router has classified the question.
    Classified,
    /// Candidates retrieved and fused.
    Retrieved,
    /// Rerank pass applied (or skipped with fused ordering).
    Reranked,
    /// Evidence gate evaluated.
    EvidenceEvaluated,
    /// Evidence sufficient; the generator may answer.
    Answered,
    /// Evidence insufficient; the canonical refusal applies.
    Refused,
}

/// One retrieved chunk with its scoring trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// The chunk.
    pub chunk: Chunk,
    /// Effective score: rerank score when available, boosted fused score
    /// otherwise. Raw (may exceed 1.0); use [`Self::display_score`] for
    /// presentation.
    pub score: f32,
    /// Fused score before reranking (after boosts).
    pub original_score: f32,
    /// Rerank score, if the chain produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    /// Parent chunk text for child candidates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_context: Option<String>,
    /// Which branch produced the candidate.
    pub origin: Origin,
    /// Labels of the policy boosts that applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_boosts: Vec<String>,
}

impl RetrievedChunk {
    /// Display score, capped at 1.0; internal ordering keeps raw values.
    #[must_use]
    pub fn display_score(&self) -> f32 {
        self.score.min(1.0)
    }
}

/// Per-candidate trace entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDetail {
    /// Chunk ID.
    pub chunk_id: String,
    /// Which branch produced the candidate.
    pub origin: Origin,
    /// Score after fusion.
    pub fused_score: f32,
    /// Score after hierarchy and policy boosts.
    pub boosted_score: f32,
    /// Rerank score, if reranked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    /// Labels of the boosts that applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applied_boosts: Vec<String>,
}

/// Trace of one retrieval run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalDetails {
    /// The query after policy expansion.
    pub expanded_query: String,
    /// Candidates from the semantic branch.
    pub semantic_count: usize,
    /// Candidates from the lexical branch.
    pub lexical_count: usize,
    /// Name of the reranker implementation used, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_provider: Option<String>,
    /// Per-candidate trace for the rerank pool.
    pub candidates: Vec<CandidateDetail>,
}

/// The ordered evidence bundle returned by retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalBundle {
    /// Retrieved chunks, best first, truncated to the final budget.
    pub chunks: Vec<RetrievedChunk>,
    /// Retrieval trace.
    pub details: RetrievalDetails,
    /// False when the whole reranker chain was unavailable.
    pub reranker_available: bool,
    /// True when the reranker returned only negative scores.
    pub low_confidence: bool,
}

impl RetrievalBundle {
    /// An empty bundle for queries with no candidates.
    #[must_use]
    pub fn empty(expanded_query: String) -> Self {
        Self {
            chunks: Vec::new(),
            details: RetrievalDetails {
                expanded_query,
                semantic_count: 0,
                lexical_count: 0,
                reranker_provider: None,
                candidates: Vec::new(),
            },
            reranker_available: true,
            low_confidence: false,
        }
    }

    /// Top effective score in the bundle.
    #[must_use]
    pub fn top_score(&self) -> Option<f32> {
        self.chunks.first().map(|c| c.score)
    }
}

/// Hybrid retrieval orchestrator.
pub struct Retriever {
    vector: VectorStore,
    lexical: LexicalIndex,
    embedder: Arc<EmbeddingGateway>,
    reranker: Option<RerankerChain>,
}

impl Retriever {
    /// Creates the orchestrator. Pass `None` for `reranker` to disable
    /// reranking entirely.
    #[must_use]
    pub fn new(
        vector: VectorStore,
        lexical: LexicalIndex,
        embedder: Arc<EmbeddingGateway>,
        reranker: Option<RerankerChain>,
    ) -> Self {
        Self {
            vector,
            lexical,
            embedder,
            reranker,
        }
    }

    /// Invalidate query caches after the corpus changes.
    pub fn invalidate_caches(&self) {
        self.vector.invalidate_cache();
    }

    /// Runs the full retrieval algorithm for a question under a policy.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::EmptyQuery`] for a blank question, or a
    /// stage-tagged [`RetrievalError::Failed`] when a branch fails
    /// terminally.
    #[instrument(skip(self, policy), fields(query_type = policy.query_type.as_str()))]
    pub fn retrieve(
        &self,
        question: &str,
        policy: &RetrievalPolicy,
        final_k: usize,
    ) -> Result<RetrievalBundle> {
        if question.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery.into());
        }

        // 1. Expand per policy
        let expanded = expand_query(question, policy);
        let budget = policy.retrieval_multiplier.max(1) * final_k.max(1);

        // 2. Semantic branch
        let query_vector = self
            .embedder
            .embed(&expanded)
            .map_err(|e| RetrievalError::Failed {
                stage: "embed".to_string(),
                reason: e.to_string(),
            })?;
        let semantic = self
            .vector
            .query(&query_vector, budget, &QueryFilter::default())
            .map_err(|e| RetrievalError::Failed {
                stage: "vector".to_string(),
                reason: e.to_string(),
            })?;

        // 3. Lexical branch (fusion is a pure function of both outputs)
        let lexical = self
            .lexical
            .search(&expanded, budget)
            .map_err(|e| RetrievalError::Failed {
                stage: "lexical".to_string(),
                reason: e.to_string(),
            })?;

        debug!(
            semantic = semantic.len(),
            lexical = lexical.len(),
            "retrieval branches complete"
        );

        // 4. Fuse by weighted rank
        let fused = fuse(&semantic, &lexical, policy.vector_weight, policy.lexical_weight);
        if fused.is_empty() {
            return Ok(RetrievalBundle::empty(expanded));
        }

        // Limit further work to the rerank pool
        let pool_size = (RERANK_POOL_MULTIPLIER * final_k).min(fused.len());
        let pool = &fused[..pool_size];

        let fused_by_id: HashMap<String, f32> = pool
            .iter()
            .map(|c| (c.chunk_id.clone(), c.fused_score))
            .collect();

        let ids: Vec<String> = pool.iter().map(|c| c.chunk_id.clone()).collect();
        let fetched = self
            .vector
            .fetch(&ids)
            .map_err(|e| RetrievalError::Failed {
                stage: "fetch".to_string(),
                reason: e.to_string(),
            })?;
        let by_id: HashMap<&str, &Chunk> =
            fetched.iter().map(|c| (c.chunk_id.as_str(), c)).collect();

        // 5-6. Hierarchy expansion and policy boosts
        let mut retrieved: Vec<RetrievedChunk> = Vec::with_capacity(pool.len());
        for candidate in pool {
            let Some(chunk) = by_id.get(candidate.chunk_id.as_str()) else {
                // Chunk deleted between query and fetch; skip quietly
                continue;
            };
            let mut chunk = (*chunk).clone();
            let mut score = candidate.fused_score;
            let mut applied_boosts = Vec::new();

            // Parent context for children; a parent deleted mid-query
            // simply yields no context
            let mut parent_context = None;
            if let Some(parent_id) = chunk.parent_id.clone() {
                let parent_chunk = by_id.get(parent_id.as_str()).map(|p| (*p).clone()).map_or_else(
                    || self.vector.get(&parent_id).ok().flatten(),
                    Some,
                );
                if let Some(parent) = parent_chunk {
                    parent_context = Some(parent.text.clone());
                    if by_id.contains_key(parent_id.as_str()) {
                        score *= PARENT_CHILD_BOOST;
                        applied_boosts.push("parent+child match".to_string());
                    }
                }
            } else if !chunk.children_ids.is_empty()
                && chunk
                    .children_ids
                    .iter()
                    .any(|id| by_id.contains_key(id.as_str()))
            {
                score *= PARENT_CHILD_BOOST;
                applied_boosts.push("parent+child match".to_string());
            }

            for boost in &policy.boosts {
                if boost.applies(&chunk) {
                    score += boost.amount;
                    applied_boosts.push(boost.label.clone());
                }
            }

            // The doc-type mirror travels with the chunk regardless of how
            // it was stored
            if chunk.metadata.doc_type.is_empty() {
                chunk.metadata.doc_type = chunk.doc_type.as_str().to_string();
            }

            retrieved.push(RetrievedChunk {
                chunk,
                score,
                original_score: score,
                rerank_score: None,
                parent_context,
                origin: candidate.origin,
                applied_boosts,
            });
        }

        retrieved.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });

        // 7. Rerank the pool
        let mut reranker_available = true;
        let mut reranker_provider = None;
        let mut low_confidence = false;

        if let Some(chain) = &self.reranker {
            let texts: Vec<String> = retrieved
                .iter()
                .map(|r| {
                    r.parent_context.as_ref().map_or_else(
                        || r.chunk.text.clone(),
                        |ctx| format!("{ctx}\n\n{}", r.chunk.text),
                    )
                })
                .collect();

            if let Some(chain_scores) = chain.rerank(&expanded, &texts) {
                reranker_provider = Some(chain_scores.provider.to_string());
                for (entry, rerank_score) in retrieved.iter_mut().zip(&chain_scores.scores) {
                    entry.rerank_score = Some(*rerank_score);
                    entry.score = *rerank_score;
                }
                retrieved.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(
                            b.original_score
                                .partial_cmp(&a.original_score)
                                .unwrap_or(std::cmp::Ordering::Equal),
                        )
                        .then(a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
                });
                low_confidence = !chain_scores.scores.is_empty()
                    && chain_scores.scores.iter().all(|s| *s < 0.0);
            } else {
                // Whole chain unavailable: keep the fused ordering
                reranker_available = false;
            }
        }

        let candidates: Vec<CandidateDetail> = retrieved
            .iter()
            .map(|r| CandidateDetail {
                chunk_id: r.chunk.chunk_id.clone(),
                origin: r.origin,
                fused_score: fused_by_id
                    .get(&r.chunk.chunk_id)
                    .copied()
                    .unwrap_or(r.original_score),
                boosted_score: r.original_score,
                rerank_score: r.rerank_score,
                applied_boosts: r.applied_boosts.clone(),
            })
            .collect();

        // 8. Truncate to the final budget
        retrieved.truncate(final_k);

        Ok(RetrievalBundle {
            chunks: retrieved,
            details: RetrievalDetails {
                expanded_query: expanded,
                semantic_count: semantic.len(),
                lexical_count: lexical.len(),
                reranker_provider,
                candidates,
            },
            reranker_available,
            low_confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::core::{ChunkKind, DocType, Document};
    use crate::cost::CostTracker;
    use crate::embedding::FallbackEmbedder;
    use crate::router::policy_for;
    use crate::store::{SqliteStore, shared};
    use std::path::PathBuf;
    use std::time::Duration;

    const DIMS: usize = 128;

    fn build_retriever(with_reranker: bool) -> Retriever {
        let mut store = SqliteStore::in_memory().unwrap();
        store.init().unwrap();

        let embedder = FallbackEmbedder::new(DIMS);

        // Factsheet with flat chunks
        let factsheet = Document::new(
            "newest-factsheet".into(),
            DocType::Factsheet,
            PathBuf::from("newest.txt"),
            "h1".into(),
        );
        store.upsert_document(&factsheet).unwrap();
        let mut fs_chunks = vec![
            Chunk::flat(
                &factsheet.doc_id,
                factsheet.doc_type,
                0,
                "Newest is an injectable gel combining polynucleotides and hyaluronic acid for face and neck.".into(),
                0,
                94,
            ),
            Chunk::flat(
                &factsheet.doc_id,
                factsheet.doc_type,
                1,
                "Composition: polynucleotides 20 mg and hyaluronic acid 20 mg per vial.".into(),
                94,
                164,
            ),
        ];
        fs_chunks[0].section = "Indications".into();
        fs_chunks[1].section = "Composition".into();

        // Paper with a parent and child pair
        let paper = Document::new(
            "pn-study".into(),
            DocType::ClinicalPaper,
            PathBuf::from("study.txt"),
            "h2".into(),
        );
        store.upsert_document(&paper).unwrap();
        let mut parent = Chunk::flat(
            &paper.doc_id,
            paper.doc_type,
            0,
            "A study of polynucleotide treatment outcomes across facial zones over twelve weeks.".into(),
            0,
            83,
        );
        parent.kind = ChunkKind::Parent;
        let mut child = Chunk::flat(
            &paper.doc_id,
            paper.doc_type,
            1,
            "Hydration improved significantly in the polynucleotide group.".into(),
            0,
            61,
        );
        child.kind = ChunkKind::Child;
        child.parent_id = Some(parent.chunk_id.clone());
        parent.children_ids = vec![child.chunk_id.clone()];
        let paper_chunks = vec![parent, child];

        for (doc, chunks) in [(&factsheet, &fs_chunks), (&paper, &paper_chunks)] {
            let embeddings: Vec<(String, Vec<f32>)> = chunks
                .iter()
                .map(|c| (c.chunk_id.clone(), embedder.embed(&c.text).unwrap()))
                .collect();
            store
                .replace_chunks(&doc.doc_id, chunks, &embeddings, "test")
                .unwrap();
        }

        let store = shared(store);
        let vector = VectorStore::new(Arc::clone(&store), Duration::from_secs(60));
        let lexical = LexicalIndex::new(Arc::clone(&store));
        let gateway = Arc::new(EmbeddingGateway::new(
            Box::new(FallbackEmbedder::new(DIMS)),
            Duration::from_secs(60),
            Arc::new(CostTracker::unlimited()),
        ));
        let reranker = with_reranker.then(|| {
            RerankerChain::for_provider(
                crate::config::RerankerProvider::Lexical,
                Duration::from_secs(1),
            )
        });
        Retriever::new(vector, lexical, gateway, reranker)
    }

    #[test]
    fn test_empty_query_rejected() {
        let retriever = build_retriever(true);
        let policy = policy_for("anything", &Settings::default());
        let err = retriever.retrieve("   ", &policy, 5).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Retrieval(RetrievalError::EmptyQuery)
        ));
    }

    #[test]
    fn test_retrieve_finds_relevant_chunk() {
        let retriever = build_retriever(true);
        let settings = Settings::default();
        let policy = policy_for("What is Newest?", &settings);
        let bundle = retriever.retrieve("What is Newest?", &policy, 5).unwrap();

        assert!(!bundle.chunks.is_empty());
        assert!(bundle.chunks.iter().any(|c| c.chunk.doc_id == "newest-factsheet"));
        assert!(bundle.reranker_available);
        assert_eq!(bundle.details.reranker_provider.as_deref(), Some("overlap"));
    }

    #[test]
    fn test_retrieve_no_candidates_yields_empty_bundle() {
        let retriever = build_retriever(true);
        let settings = Settings::default();
        let policy = policy_for("zzz qqq xxyyzz", &settings);
        let bundle = retriever.retrieve("zzz qqq xxyyzz", &policy, 5).unwrap();
        // Semantic branch always returns something; lexical may not. The
        // bundle is still well-formed and bounded.
        assert!(bundle.chunks.len() <= 5);
    }

    #[test]
    fn test_child_gets_parent_context() {
        let retriever = build_retriever(true);
        let settings = Settings::default();
        let question = "Did hydration improve in the polynucleotide group?";
        let policy = policy_for(question, &settings);
        let bundle = retriever.retrieve(question, &policy, 5).unwrap();

        let child = bundle
            .chunks
            .iter()
            .find(|c| c.chunk.kind == ChunkKind::Child)
            .expect("child chunk retrieved");
        let ctx = child.parent_context.as_deref().expect("parent context attached");
        assert!(ctx.contains("study of polynucleotide"));
        assert!(child.applied_boosts.iter().any(|b| b.contains("parent+child")));
    }

    #[test]
    fn test_rerank_replaces_scores_and_keeps_original() {
        let retriever = build_retriever(true);
        let settings = Settings::default();
        let policy = policy_for("What is Newest?", &settings);
        let bundle = retriever.retrieve("What is Newest?", &policy, 5).unwrap();

        for chunk in &bundle.chunks {
            assert!(chunk.rerank_score.is_some());
            assert!((chunk.score - chunk.rerank_score.unwrap()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_without_reranker_keeps_fused_ordering() {
        let retriever = build_retriever(false);
        let settings = Settings::default();
        let policy = policy_for("What is Newest?", &settings);
        let bundle = retriever.retrieve("What is Newest?", &policy, 5).unwrap();

        for chunk in &bundle.chunks {
            assert!(chunk.rerank_score.is_none());
        }
        assert!(bundle.details.reranker_provider.is_none());
    }

    #[test]
    fn test_truncates_to_final_k() {
        let retriever = build_retriever(true);
        let settings = Settings::default();
        let policy = policy_for("polynucleotides", &settings);
        let bundle = retriever.retrieve("polynucleotides", &policy, 2).unwrap();
        assert!(bundle.chunks.len() <= 2);
        // The trace keeps the wider pool
        assert!(bundle.details.candidates.len() >= bundle.chunks.len());
    }

    #[test]
    fn test_policy_boosts_recorded() {
        let retriever = build_retriever(true);
        let settings = Settings::default();
        // ProductInfo boosts factsheets
        let policy = policy_for("What is Newest?", &settings);
        let bundle = retriever.retrieve("What is Newest?", &policy, 5).unwrap();

        let factsheet_chunk = bundle
            .chunks
            .iter()
            .find(|c| c.chunk.doc_type == DocType::Factsheet)
            .unwrap();
        assert!(factsheet_chunk
            .applied_boosts
            .iter()
            .any(|b| b.contains("factsheet")));
    }

    #[test]
    fn test_display_score_capped() {
        let chunk = RetrievedChunk {
            chunk: Chunk::flat("d", DocType::Factsheet, 0, "t".into(), 0, 1),
            score: 3.4,
            original_score: 0.9,
            rerank_score: Some(3.4),
            parent_context: None,
            origin: Origin::Both,
            applied_boosts: vec![],
        };
        assert!((chunk.display_score() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic_retrieval() {
        let retriever = build_retriever(true);
        let settings = Settings::default();
        let policy = policy_for("What is Newest?", &settings);
        let first = retriever.retrieve("What is Newest?", &policy, 5).unwrap();
        let second = retriever.retrieve("What is Newest?", &policy, 5).unwrap();
        let first_ids: Vec<&str> = first.chunks.iter().map(|c| c.chunk.chunk_id.as_str()).collect();
        let second_ids: Vec<&str> = second.chunks.iter().map(|c| c.chunk.chunk_id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
    }
}
