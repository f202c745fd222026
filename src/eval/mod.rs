//! Automated evaluation: heuristic triad, harness, synthetic question
//! generation, and the LLM judge.

pub mod harness;
pub mod judge;
pub mod synthetic;
pub mod triad;

pub use harness::{EvalReport, EvalSummary, HarnessConfig, run_eval};
pub use judge::{HeuristicJudgeClient, JudgeClient, JudgeDimension, JudgeScores, LlmJudge};
pub use synthetic::{SyntheticConfig, SyntheticGenerator, TemplateQuestionGenerator};
pub use triad::{
    answer_relevance, citations_valid, context_relevance, groundedness, is_refusal,
    keyword_coverage, parse_citations, retrieval_recall, triad_scores,
};

use crate::chunking::sentence_spans;
use crate::evidence::{CANONICAL_REFUSAL, EvidenceAssessment};
use crate::search::RetrievalBundle;

/// Produces an answer text for evaluation runs.
///
/// The production generator is an external collaborator; this trait is
/// its seam. The crate ships [`ExtractiveAnswerer`], a deterministic
/// implementation that stitches top evidence sentences with citations, so
/// the harness runs offline.
pub trait AnswerProvider: Send + Sync {
    /// Produces an answer for a question given the retrieved evidence.
    ///
    /// When evidence is insufficient the answer MUST be the canonical
    /// refusal with no citations.
    fn answer(
        &self,
        question: &str,
        bundle: &RetrievalBundle,
        evidence: &EvidenceAssessment,
    ) -> String;
}

/// Deterministic extractive answerer: leading sentences of the top
/// chunks, each followed by its citation marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveAnswerer {
    /// Number of top chunks quoted.
    pub max_chunks: usize,
    /// Sentences quoted per chunk.
    pub sentences_per_chunk: usize,
}

impl ExtractiveAnswerer {
    /// Creates the answerer with default quoting limits.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_chunks: 3,
            sentences_per_chunk: 2,
        }
    }
}

impl AnswerProvider for ExtractiveAnswerer {
    fn answer(
        &self,
        _question: &str,
        bundle: &RetrievalBundle,
        evidence: &EvidenceAssessment,
    ) -> String {
        if !evidence.sufficient || bundle.chunks.is_empty() {
            return CANONICAL_REFUSAL.to_string();
        }

        let mut parts = Vec::new();
        for retrieved in bundle.chunks.iter().take(self.max_chunks.max(1)) {
            let text = &retrieved.chunk.text;
            let quoted: String = sentence_spans(text)
                .into_iter()
                .take(self.sentences_per_chunk.max(1))
                .map(|r| &text[r])
                .collect();
            let quoted = quoted.trim().replace('\n', " ");
            if quoted.is_empty() {
                continue;
            }
            parts.push(format!("{quoted} {}", retrieved.chunk.citation()));
        }

        if parts.is_empty() {
            CANONICAL_REFUSAL.to_string()
        } else {
            parts.join(" ")
        }
    }
}
