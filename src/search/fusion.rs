//! Weighted rank fusion of the semantic and lexical branches.
//!
//! Fusion is a pure function of the two branch outputs: candidates are
//! merged by chunk ID, a chunk missing from one branch scores 0 on that
//! side before weighting, and ties break by original semantic rank. This
//! keeps the hybrid merge deterministic for a given (query, policy,
//! corpus snapshot) regardless of how the branches were executed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which branch produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Semantic branch only.
    Semantic,
    /// Lexical branch only.
    Lexical,
    /// Both branches.
    Both,
}

/// A fused candidate before hierarchy expansion and boosting.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    /// Chunk ID.
    pub chunk_id: String,
    /// Weighted fused score.
    pub fused_score: f32,
    /// Normalized semantic score, if retrieved semantically.
    pub semantic_score: Option<f32>,
    /// Normalized lexical score, if retrieved lexically.
    pub lexical_score: Option<f32>,
    /// Which branch(es) produced the candidate.
    pub origin: Origin,
    /// Rank in the semantic branch (used for tie-breaking; `usize::MAX`
    /// for lexical-only candidates).
    pub semantic_rank: usize,
}

/// Fuses the two ranked branches by weighted score.
///
/// `fused = vector_weight · semantic + lexical_weight · lexical`, scoring
/// a missing side as 0. The result is sorted by fused score descending
/// with ties broken by semantic rank.
#[must_use]
pub fn fuse(
    semantic: &[(String, f32)],
    lexical: &[(String, f32)],
    vector_weight: f32,
    lexical_weight: f32,
) -> Vec<FusedCandidate> {
    let semantic_ranks: HashMap<&str, usize> = semantic
        .iter()
        .enumerate()
        .map(|(rank, (id, _))| (id.as_str(), rank))
        .collect();
    let lexical_scores: HashMap<&str, f32> = lexical
        .iter()
        .map(|(id, score)| (id.as_str(), *score))
        .collect();

    let mut candidates: Vec<FusedCandidate> = Vec::with_capacity(semantic.len() + lexical.len());

    for (rank, (chunk_id, sem_score)) in semantic.iter().enumerate() {
        let lex_score = lexical_scores.get(chunk_id.as_str()).copied();
        let origin = if lex_score.is_some() {
            Origin::Both
        } else {
            Origin::Semantic
        };
        candidates.push(FusedCandidate {
            chunk_id: chunk_id.clone(),
            fused_score: vector_weight * sem_score + lexical_weight * lex_score.unwrap_or(0.0),
            semantic_score: Some(*sem_score),
            lexical_score: lex_score,
            origin,
            semantic_rank: rank,
        });
    }

    for (chunk_id, lex_score) in lexical {
        if semantic_ranks.contains_key(chunk_id.as_str()) {
            continue;
        }
        candidates.push(FusedCandidate {
            chunk_id: chunk_id.clone(),
            fused_score: lexical_weight * lex_score,
            semantic_score: None,
            lexical_score: Some(*lex_score),
            origin: Origin::Lexical,
            semantic_rank: usize::MAX,
        });
    }

    candidates.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.semantic_rank.cmp(&b.semantic_rank))
            .then(a.chunk_id.cmp(&b.chunk_id))
    });

    candidates
}
