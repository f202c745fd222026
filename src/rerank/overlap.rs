//! Lexical-overlap reranker: the terminal, never-failing fallback.

use crate::rerank::{RerankOutcome, Reranker};
use crate::text::{content_terms, singularize};
use std::collections::HashSet;

/// Scores each document by the fraction of query content terms it
/// contains.
///
/// Scores are in [0, 1] and purely lexical; this implementation exists so
/// the fallback chain always terminates with a usable ordering signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlapReranker;

impl OverlapReranker {
    /// Creates the overlap reranker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    #[allow(clippy::cast_precision_loss)]
    fn score(query_terms: &[String], text: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let text_terms: HashSet<String> = content_terms(text)
            .iter()
            .map(|t| singularize(t))
            .collect();
        let hits = query_terms
            .iter()
            .filter(|term| text_terms.contains(*term))
            .count();
        hits as f32 / query_terms.len() as f32
    }
}

impl Reranker for OverlapReranker {
    fn rerank(&self, query: &str, texts: &[String]) -> RerankOutcome {
        let query_terms: Vec<String> = {
            let mut seen = HashSet::new();
            content_terms(query)
                .iter()
                .map(|t| singularize(t))
                .filter(|t| seen.insert(t.clone()))
                .collect()
        };
        RerankOutcome::Scored(
            texts
                .iter()
                .map(|text| Self::score(&query_terms, text))
                .collect(),
        )
    }

    fn name(&self) -> &'static str {
        "overlap"
    }
}
