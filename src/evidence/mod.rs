//! Evidence-sufficiency gating and confidence scoring.
//!
//! The gate decides whether the retrieved bundle supports an answer at
//! all. When it does not, the downstream answer must be the canonical
//! refusal: the generator is never free to paraphrase absent evidence as
//! present.

use crate::config::Settings;
use crate::router::QueryType;
use crate::search::RetrievalBundle;
use serde::{Deserialize, Serialize};

/// The fixed response emitted when evidence is insufficient. Carries no
/// citations.
pub const CANONICAL_REFUSAL: &str = "I could not find supporting documentation for this \
question in the available clinical materials, so I cannot provide an answer.";

/// Rerank score above which a single top hit is treated as high
/// confidence regardless of the strong-match count.
const HIGH_CONFIDENCE_RERANK_CUTOFF: f32 = 0.9;

/// Evidence assessment for one retrieval bundle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EvidenceAssessment {
    /// Whether the gate allows an answer.
    pub sufficient: bool,
    /// Number of chunks at or above the strong-match threshold.
    pub strong_matches: usize,
    /// Overall confidence in [0, 1].
    pub confidence: f32,
    /// The query type the bundle was retrieved under.
    pub query_type: QueryType,
}

/// Assesses a retrieval bundle against the configured thresholds.
///
/// A bundle is sufficient when at least one chunk scores at or above
/// `strong_match_threshold`, or when the top rerank score exceeds the
/// high-confidence cutoff. Scores above 1.0 (cross-encoder territory) map
/// to confidence via `min(0.85 + (top − 1.0)·0.1, 0.95)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn assess(
    bundle: &RetrievalBundle,
    settings: &Settings,
    query_type: QueryType,
) -> EvidenceAssessment {
    let strong_matches = bundle
        .chunks
        .iter()
        .filter(|c| c.score >= settings.strong_match_threshold)
        .count();

    let top = bundle.top_score().unwrap_or(0.0);
    let top_rerank = bundle
        .chunks
        .iter()
        .filter_map(|c| c.rerank_score)
        .fold(f32::NEG_INFINITY, f32::max);

    let sufficient = (strong_matches >= 1 && top >= settings.evidence_sufficiency_threshold)
        || (top_rerank.is_finite() && top_rerank > HIGH_CONFIDENCE_RERANK_CUTOFF);

    let confidence = if bundle.chunks.is_empty() {
        0.0
    } else if top > 1.0 {
        // Cross-encoder top score beyond the unit interval
        (0.85 + (top - 1.0) * 0.1).min(0.95)
    } else {
        let strong_part = (strong_matches.min(5) as f32) / 5.0;
        (top.max(0.0) * 0.7 + strong_part * 0.3).clamp(0.0, 1.0)
    };

    let confidence = if bundle.low_confidence {
        confidence.min(0.3)
    } else {
        confidence
    };

    EvidenceAssessment {
        sufficient,
        strong_matches,
        confidence,
        query_type,
    }
}
