//! Query-document reranking with a provider fallback chain.
//!
//! Rerankers return a typed outcome rather than raising: either a score
//! vector or an "unavailable" signal. The chain tries an ordered list of
//! implementations with a per-call timeout; the terminal lexical-overlap
//! implementation never fails, so retrieval always has an ordering signal
//! unless reranking is disabled outright.
//!
//! Scores are monotonic ordering signals, not probabilities: cross-encoder
//! implementations may return values outside [0, 1]. Display-facing code
//! caps at 1.0; internal ordering keeps raw values.

pub mod overlap;

#[cfg(feature = "fastembed-embeddings")]
mod fastembed_impl;

pub use overlap::OverlapReranker;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed_impl::LocalCrossEncoder;

use crate::config::RerankerProvider;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of one reranker implementation.
#[derive(Debug, Clone, PartialEq)]
pub enum RerankOutcome {
    /// One score per input text, in input order.
    Scored(Vec<f32>),
    /// The implementation could not score this call.
    Unavailable {
        /// Why the implementation was unavailable.
        reason: String,
    },
}

/// Trait for query-document relevance scorers.
///
/// Implementations must be deterministic: the same input always yields
/// the same scores.
pub trait Reranker: Send + Sync {
    /// Scores each text against the query.
    fn rerank(&self, query: &str, texts: &[String]) -> RerankOutcome;

    /// Implementation name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Scores produced by the chain, tagged with the implementation that
/// produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainScores {
    /// One score per input text.
    pub scores: Vec<f32>,
    /// Name of the implementation that produced the scores.
    pub provider: &'static str,
}

/// Ordered fallback chain of rerankers.
pub struct RerankerChain {
    rerankers: Vec<Arc<dyn Reranker>>,
    timeout: Duration,
}

impl RerankerChain {
    /// Creates a chain from an ordered list of implementations.
    #[must_use]
    pub fn new(rerankers: Vec<Arc<dyn Reranker>>, timeout: Duration) -> Self {
        Self { rerankers, timeout }
    }

    /// Builds the configured chain for a provider selection.
    ///
    /// The lexical-overlap implementation always terminates the chain.
    #[must_use]
    pub fn for_provider(provider: RerankerProvider, timeout: Duration) -> Self {
        let mut rerankers: Vec<Arc<dyn Reranker>> = Vec::new();

        #[cfg(feature = "fastembed-embeddings")]
        if matches!(provider, RerankerProvider::Chain | RerankerProvider::Local) {
            rerankers.push(Arc::new(fastembed_impl::LocalCrossEncoder::new()));
        }
        #[cfg(not(feature = "fastembed-embeddings"))]
        let _ = provider;

        rerankers.push(Arc::new(OverlapReranker::new()));
        Self::new(rerankers, timeout)
    }

    /// Number of implementations in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rerankers.len()
    }

    /// Whether the chain has no implementations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rerankers.is_empty()
    }

    /// Tries each implementation in order, honoring the per-call timeout.
    ///
    /// Returns `None` only when every implementation is unavailable (an
    /// empty chain, or every call timing out).
    #[must_use]
    pub fn rerank(&self, query: &str, texts: &[String]) -> Option<ChainScores> {
        if texts.is_empty() {
            return Some(ChainScores {
                scores: Vec::new(),
                provider: "none",
            });
        }

        for reranker in &self.rerankers {
            let name = reranker.name();
            match Self::call_with_timeout(Arc::clone(reranker), query, texts, self.timeout) {
                RerankOutcome::Scored(scores) if scores.len() == texts.len() => {
                    debug!(provider = name, "reranker produced scores");
                    return Some(ChainScores {
                        scores,
                        provider: name,
                    });
                }
                RerankOutcome::Scored(scores) => {
                    warn!(
                        provider = name,
                        got = scores.len(),
                        want = texts.len(),
                        "reranker returned wrong score count; trying next"
                    );
                }
                RerankOutcome::Unavailable { reason } => {
                    warn!(provider = name, reason = %reason, "reranker unavailable; trying next");
                }
            }
        }
        None
    }

    /// Runs one implementation on a worker thread, abandoning it on
    /// timeout. Partial results from an abandoned call are discarded.
    fn call_with_timeout(
        reranker: Arc<dyn Reranker>,
        query: &str,
        texts: &[String],
        timeout: Duration,
    ) -> RerankOutcome {
        let (tx, rx) = mpsc::channel();
        let query = query.to_string();
        let texts = texts.to_vec();
        std::thread::spawn(move || {
            let outcome = reranker.rerank(&query, &texts);
            let _ = tx.send(outcome);
        });

        rx.recv_timeout(timeout).unwrap_or_else(|_| RerankOutcome::Unavailable {
            reason: format!("timed out after {timeout:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedReranker {
        scores: Vec<f32>,
    }

    impl Reranker for FixedReranker {
        fn rerank(&self, _query: &str, _texts: &[String]) -> RerankOutcome {
            RerankOutcome::Scored(self.scores.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct BrokenReranker;

    impl Reranker for BrokenReranker {
        fn rerank(&self, _query: &str, _texts: &[String]) -> RerankOutcome {
            RerankOutcome::Unavailable {
                reason: "provider down".to_string(),
            }
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    struct SlowReranker;

    impl Reranker for SlowReranker {
        fn rerank(&self, _query: &str, texts: &[String]) -> RerankOutcome {
            std::thread::sleep(Duration::from_millis(250));
            RerankOutcome::Scored(vec![0.0; texts.len()])
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {i}")).collect()
    }

    #[test]
    fn test_first_working_provider_wins() {
        let chain = RerankerChain::new(
            vec![
                Arc::new(BrokenReranker),
                Arc::new(FixedReranker { scores: vec![1.0, 2.0] }),
                Arc::new(OverlapReranker::new()),
            ],
            Duration::from_secs(1),
        );
        let result = chain.rerank("query", &texts(2)).unwrap();
        assert_eq!(result.provider, "fixed");
        assert_eq!(result.scores, vec![1.0, 2.0]);
    }

    #[test]
    fn test_timeout_falls_through() {
        let chain = RerankerChain::new(
            vec![Arc::new(SlowReranker), Arc::new(OverlapReranker::new())],
            Duration::from_millis(20),
        );
        let result = chain.rerank("query terms", &texts(2)).unwrap();
        assert_eq!(result.provider, "overlap");
    }

    #[test]
    fn test_wrong_score_count_falls_through() {
        let chain = RerankerChain::new(
            vec![
                Arc::new(FixedReranker { scores: vec![1.0] }),
                Arc::new(OverlapReranker::new()),
            ],
            Duration::from_secs(1),
        );
        let result = chain.rerank("query", &texts(3)).unwrap();
        assert_eq!(result.provider, "overlap");
    }

    #[test]
    fn test_empty_chain_returns_none() {
        let chain = RerankerChain::new(vec![], Duration::from_secs(1));
        assert!(chain.rerank("query", &texts(2)).is_none());
        assert!(chain.is_empty());
    }

    #[test]
    fn test_all_unavailable_returns_none() {
        let chain = RerankerChain::new(
            vec![Arc::new(BrokenReranker), Arc::new(BrokenReranker)],
            Duration::from_secs(1),
        );
        assert!(chain.rerank("query", &texts(2)).is_none());
    }

    #[test]
    fn test_empty_texts_short_circuit() {
        let chain = RerankerChain::new(vec![Arc::new(BrokenReranker)], Duration::from_secs(1));
        let result = chain.rerank("query", &[]).unwrap();
        assert!(result.scores.is_empty());
    }

    #[test]
    fn test_for_provider_terminates_with_overlap() {
        let chain =
            RerankerChain::for_provider(RerankerProvider::Lexical, Duration::from_secs(1));
        assert!(!chain.is_empty());
        let result = chain.rerank("face treatment", &texts(2)).unwrap();
        assert_eq!(result.scores.len(), 2);
    }
}
