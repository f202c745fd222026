//! Heuristic triad metrics: context relevance, groundedness, answer
//! relevance.
//!
//! These are deterministic, token-level approximations used as the
//! first evaluation tier and as the fallback when the LLM judge is
//! unavailable.

use crate::core::TriadScores;
use crate::evidence::CANONICAL_REFUSAL;
use crate::search::RetrievalBundle;
use crate::text::{content_terms, salient_tokens};
use regex::Regex;
use std::sync::LazyLock;

/// Citation marker format: `[doc_id:page]`.
#[allow(clippy::unwrap_used)]
static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([a-z0-9_\-]+):(\d{1,4})\]").unwrap()
});

/// Bonus added to groundedness when the answer carries citation markers.
const CITATION_BONUS: f32 = 0.15;

/// Whether an answer is the canonical refusal.
#[must_use]
pub fn is_refusal(answer: &str) -> bool {
    answer.trim() == CANONICAL_REFUSAL
        || answer
            .trim()
            .starts_with("I could not find supporting documentation")
}

/// Extracts `[doc_id:page]` citation markers from an answer.
#[must_use]
pub fn parse_citations(answer: &str) -> Vec<(String, u32)> {
    CITATION_RE
        .captures_iter(answer)
        .filter_map(|caps| {
            let doc_id = caps.get(1)?.as_str().to_string();
            let page = caps.get(2)?.as_str().parse().ok()?;
            Some((doc_id, page))
        })
        .collect()
}

/// Whether every citation in the answer maps to a retrieved
/// (document, page) pair. An answer with no citations is vacuously valid.
#[must_use]
pub fn citations_valid(answer: &str, bundle: &RetrievalBundle) -> bool {
    let known: std::collections::HashSet<(String, u32)> = bundle
        .chunks
        .iter()
        .map(|c| (c.chunk.doc_id.clone(), c.chunk.page_number))
        .collect();
    parse_citations(answer)
        .into_iter()
        .all(|citation| known.contains(&citation))
}

/// Fraction of expected keywords appearing in the answer
/// (case-insensitive). No expected keywords scores 1.0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn keyword_coverage(answer: &str, expected_keywords: &[String]) -> f32 {
    if expected_keywords.is_empty() {
        return 1.0;
    }
    let lowered = answer.to_lowercase();
    let hits = expected_keywords
        .iter()
        .filter(|kw| lowered.contains(&kw.to_lowercase()))
        .count();
    hits as f32 / expected_keywords.len() as f32
}

/// Fraction of expected document IDs present in the retrieved bundle.
/// No expected documents scores 1.0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn retrieval_recall(bundle: &RetrievalBundle, expected_doc_ids: &[String]) -> f32 {
    if expected_doc_ids.is_empty() {
        return 1.0;
    }
    let retrieved: std::collections::HashSet<&str> = bundle
        .chunks
        .iter()
        .map(|c| c.chunk.doc_id.as_str())
        .collect();
    let hits = expected_doc_ids
        .iter()
        .filter(|id| retrieved.contains(id.as_str()))
        .count();
    hits as f32 / expected_doc_ids.len() as f32
}

/// Context relevance: mean effective (display-capped) score of the
/// retrieved chunks. Empty bundle scores 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn context_relevance(bundle: &RetrievalBundle) -> f32 {
    if bundle.chunks.is_empty() {
        return 0.0;
    }
    let sum: f32 = bundle
        .chunks
        .iter()
        .map(|c| c.display_score().max(0.0))
        .sum();
    sum / bundle.chunks.len() as f32
}

/// Groundedness: fraction of salient answer tokens found in the
/// concatenated context, with a citation bonus.
///
/// A proper refusal scores 1.0; an answer with no salient tokens scores
/// the 0.5 neutral value.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn groundedness(answer: &str, context: &str, refusal_appropriate: bool) -> f32 {
    if is_refusal(answer) {
        return if refusal_appropriate { 1.0 } else { 0.5 };
    }

    let tokens = salient_tokens(answer);
    let mut score = if tokens.is_empty() {
        0.5
    } else {
        let context_lower = context.to_lowercase();
        let found = tokens
            .iter()
            .filter(|t| context_lower.contains(t.as_str()))
            .count();
        found as f32 / tokens.len() as f32
    };

    if !parse_citations(answer).is_empty() {
        score += CITATION_BONUS;
    }
    score.clamp(0.0, 1.0)
}

/// Answer relevance: `0.6 × keyword coverage + 0.4 × query-term
/// coverage`.
///
/// An appropriate refusal scores 1.0; an inappropriate refusal scores
/// 0.2.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn answer_relevance(
    question: &str,
    answer: &str,
    kw_coverage: f32,
    should_refuse: bool,
) -> f32 {
    if is_refusal(answer) {
        return if should_refuse { 1.0 } else { 0.2 };
    }

    let query_terms: Vec<String> = {
        let mut seen = std::collections::HashSet::new();
        content_terms(question)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect()
    };
    let term_coverage = if query_terms.is_empty() {
        0.0
    } else {
        let answer_lower = answer.to_lowercase();
        let hits = query_terms
            .iter()
            .filter(|t| answer_lower.contains(t.as_str()))
            .count();
        hits as f32 / query_terms.len() as f32
    };

    (0.6 * kw_coverage + 0.4 * term_coverage).clamp(0.0, 1.0)
}

/// Computes the full triad for one case.
#[must_use]
pub fn triad_scores(
    question: &str,
    answer: &str,
    bundle: &RetrievalBundle,
    kw_coverage: f32,
    should_refuse: bool,
) -> TriadScores {
    let context: String = bundle
        .chunks
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    TriadScores {
        context_relevance: context_relevance(bundle),
        groundedness: groundedness(answer, &context, should_refuse),
        answer_relevance: answer_relevance(question, answer, kw_coverage, should_refuse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Chunk, DocType};
    use crate::search::{Origin, RetrievedChunk};

    fn bundle() -> RetrievalBundle {
        let mut bundle = RetrievalBundle::empty("q".to_string());
        let mut chunk = Chunk::flat(
            "newest-factsheet",
            DocType::Factsheet,
            0,
            "Newest combines polynucleotides and hyaluronic acid, 2 ml per vial.".to_string(),
            0,
            67,
        );
        chunk.page_number = 2;
        bundle.chunks = vec![RetrievedChunk {
            chunk,
            score: 0.8,
            original_score: 0.8,
            rerank_score: Some(0.8),
            parent_context: None,
            origin: Origin::Both,
            applied_boosts: vec![],
        }];
        bundle
    }

    #[test]
    fn test_is_refusal() {
        assert!(is_refusal(CANONICAL_REFUSAL));
        assert!(!is_refusal("Newest is a gel."));
    }

    #[test]
    fn test_parse_citations() {
        let citations = parse_citations("Per the factsheet [newest-factsheet:2], it works.");
        assert_eq!(citations, vec![("newest-factsheet".to_string(), 2)]);
        assert!(parse_citations("No citations here.").is_empty());
    }

    #[test]
    fn test_citations_valid() {
        let b = bundle();
        assert!(citations_valid("See [newest-factsheet:2].", &b));
        assert!(!citations_valid("See [newest-factsheet:9].", &b));
        assert!(!citations_valid("See [other-doc:2].", &b));
        assert!(citations_valid("No citations.", &b));
    }

    #[test]
    fn test_keyword_coverage() {
        let kws = vec!["polynucleotide".to_string(), "hyaluronic".to_string()];
        assert!((keyword_coverage("Contains polynucleotide only", &kws) - 0.5).abs() < 1e-6);
        assert!((keyword_coverage("", &[]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_retrieval_recall() {
        let b = bundle();
        let expected = vec!["newest-factsheet".to_string(), "missing-doc".to_string()];
        assert!((retrieval_recall(&b, &expected) - 0.5).abs() < 1e-6);
        assert!((retrieval_recall(&b, &[]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_context_relevance_mean() {
        let b = bundle();
        assert!((context_relevance(&b) - 0.8).abs() < 1e-6);
        assert!(context_relevance(&RetrievalBundle::empty("q".into())).abs() < 1e-6);
    }

    #[test]
    fn test_context_relevance_caps_display() {
        let mut b = bundle();
        b.chunks[0].score = 2.5;
        assert!(context_relevance(&b) <= 1.0);
    }

    #[test]
    fn test_groundedness_supported_tokens() {
        let context = "Newest combines polynucleotides and hyaluronic acid, 2 ml per vial.";
        // Salient tokens: Newest (capitalized mid-sentence), 2 ml
        let score = groundedness("The product Newest contains 2 ml per vial.", context, false);
        assert!(score >= 0.9);
    }

    #[test]
    fn test_groundedness_unsupported_tokens() {
        let score = groundedness(
            "The product Botox contains 50 units.",
            "Entirely unrelated context about creams.",
            false,
        );
        assert!(score < 0.5);
    }

    #[test]
    fn test_groundedness_citation_bonus() {
        let context = "Newest combines polynucleotides.";
        // "Smith" is salient but unsupported, keeping the base below 1.0
        let without = groundedness("Studies by Smith cover the product Newest.", context, false);
        let with = groundedness(
            "Studies by Smith cover the product Newest [newest-factsheet:2].",
            context,
            false,
        );
        assert!(with > without);
    }

    #[test]
    fn test_groundedness_refusal() {
        assert!((groundedness(CANONICAL_REFUSAL, "", true) - 1.0).abs() < 1e-6);
        assert!((groundedness(CANONICAL_REFUSAL, "", false) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_groundedness_no_salient_neutral() {
        let score = groundedness("it works quite well overall.", "context", false);
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_answer_relevance_blend() {
        let score = answer_relevance(
            "What is the dose of Newest?",
            "The dose of Newest is 2 ml.",
            1.0,
            false,
        );
        // kw=1.0, terms {dose, newest} both present
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_answer_relevance_refusals() {
        assert!((answer_relevance("q", CANONICAL_REFUSAL, 0.0, true) - 1.0).abs() < 1e-6);
        assert!((answer_relevance("q", CANONICAL_REFUSAL, 0.0, false) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_triad_scores_combined() {
        let b = bundle();
        let triad = triad_scores(
            "What is Newest?",
            "The product Newest combines polynucleotides [newest-factsheet:2].",
            &b,
            1.0,
            false,
        );
        assert!(triad.combined() > 0.7);
        assert!(triad.context_relevance > 0.0);
    }
}
