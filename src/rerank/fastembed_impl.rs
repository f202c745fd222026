//! Local cross-encoder reranker backed by `fastembed`.
//!
//! Only available with the `fastembed-embeddings` feature. Cross-encoder
//! scores are unbounded logits; downstream treats them as ordering
//! signals.

use crate::rerank::{RerankOutcome, Reranker};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::OnceLock;

/// Thread-safe singleton for the reranker model, lazily loaded on first
/// use.
static RERANK_MODEL: OnceLock<std::sync::Mutex<fastembed::TextRerank>> = OnceLock::new();

/// Local cross-encoder reranker (BGE reranker base).
pub struct LocalCrossEncoder {
    model_name: &'static str,
}

impl LocalCrossEncoder {
    /// Creates the local cross-encoder; the model loads lazily.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            model_name: "bge-reranker-base",
        }
    }

    /// Returns the model name.
    #[must_use]
    pub const fn model_name(&self) -> &'static str {
        self.model_name
    }

    fn get_model() -> Result<&'static std::sync::Mutex<fastembed::TextRerank>, String> {
        if let Some(model) = RERANK_MODEL.get() {
            return Ok(model);
        }

        let options =
            fastembed::RerankInitOptions::new(fastembed::RerankerModel::BGERerankerBase)
                .with_show_download_progress(false);
        let model = fastembed::TextRerank::try_new(options)
            .map_err(|e| format!("failed to load reranker model: {e}"))?;

        let _ = RERANK_MODEL.set(std::sync::Mutex::new(model));
        RERANK_MODEL
            .get()
            .ok_or_else(|| "model initialization race condition".to_string())
    }
}

impl Default for LocalCrossEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Reranker for LocalCrossEncoder {
    fn rerank(&self, query: &str, texts: &[String]) -> RerankOutcome {
        let model = match Self::get_model() {
            Ok(model) => model,
            Err(reason) => return RerankOutcome::Unavailable { reason },
        };
        let Ok(mut model) = model.lock() else {
            return RerankOutcome::Unavailable {
                reason: "reranker model lock poisoned".to_string(),
            };
        };

        let documents: Vec<&str> = texts.iter().map(String::as_str).collect();

        // ONNX runtime can panic on malformed inputs; degrade to the next
        // chain entry instead
        let result = catch_unwind(AssertUnwindSafe(|| {
            model.rerank(query, documents, false, None)
        }));

        match result {
            Ok(Ok(mut ranked)) => {
                // fastembed returns results sorted by score; restore input order
                ranked.sort_by_key(|r| r.index);
                RerankOutcome::Scored(ranked.into_iter().map(|r| r.score).collect())
            }
            Ok(Err(e)) => RerankOutcome::Unavailable {
                reason: format!("rerank failed: {e}"),
            },
            Err(_) => RerankOutcome::Unavailable {
                reason: "ONNX runtime panic".to_string(),
            },
        }
    }

    fn name(&self) -> &'static str {
        "local-cross-encoder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name() {
        assert_eq!(LocalCrossEncoder::new().model_name(), "bge-reranker-base");
    }

    // Scoring tests require a model download; run with:
    // cargo test --features fastembed-embeddings -- --ignored

    #[test]
    #[ignore = "requires fastembed model download"]
    fn test_rerank_orders_relevant_first() {
        let encoder = LocalCrossEncoder::new();
        let texts = vec![
            "Plinest Hair requires four sessions.".to_string(),
            "Unrelated cooking recipe.".to_string(),
        ];
        match encoder.rerank("How many sessions for Plinest Hair?", &texts) {
            RerankOutcome::Scored(scores) => assert!(scores[0] > scores[1]),
            RerankOutcome::Unavailable { reason } => panic!("unavailable: {reason}"),
        }
    }
}
