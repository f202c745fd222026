//! Synthetic question generation from the chunk store.
//!
//! Chunks are sampled stratified across (document, chunk kind, section)
//! so long documents do not dominate, questions are produced by a
//! pluggable generator, and every candidate passes validation and
//! near-duplicate rejection before it becomes a case. The output dataset
//! uses the same schema as hand-written golden cases.

use crate::core::{Chunk, ChunkKind, Dataset, QueryCase};
use crate::error::Result;
use crate::store::{SharedStore, with_store};
use crate::text::{is_stopword, salient_tokens, sequence_similarity, tokenize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Validation limits for generated questions.
const MIN_TOKENS: usize = 5;
const MAX_TOKENS: usize = 50;

/// Near-duplicate rejection threshold.
const SIMILARITY_THRESHOLD: f32 = 0.8;

/// Maximum expected keywords attached to a case.
const MAX_KEYWORDS: usize = 5;

/// Produces one question for a chunk.
///
/// The production implementation prompts an external generator with a
/// chunk-kind-specific template; [`TemplateQuestionGenerator`] is the
/// deterministic offline implementation.
pub trait QuestionGenerator: Send + Sync {
    /// Generates a candidate question for the chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails for this chunk (logged, not
    /// fatal to the batch).
    fn generate(&self, chunk: &Chunk) -> Result<String>;
}

/// Deterministic template-based question generator.
///
/// Picks a template from the chunk's kind, section, and metadata, filling
/// in the tagged product or a salient token.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateQuestionGenerator;

impl TemplateQuestionGenerator {
    /// Creates the generator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn subject(chunk: &Chunk) -> String {
        chunk
            .metadata
            .product
            .clone()
            .or_else(|| salient_tokens(&chunk.text).into_iter().next())
            .unwrap_or_else(|| "this treatment".to_string())
    }
}

impl QuestionGenerator for TemplateQuestionGenerator {
    fn generate(&self, chunk: &Chunk) -> Result<String> {
        let subject = Self::subject(chunk);
        let question = if chunk.metadata.has_protocol_info {
            format!("How many sessions are recommended for {subject} and how often?")
        } else {
            match chunk.section.as_str() {
                "Indications" => format!("What is {subject} indicated for?"),
                "Contraindications" | "Warnings" => {
                    format!("What are the contraindications for {subject}?")
                }
                "Composition" => format!("What does {subject} contain in its composition?"),
                "Mechanism" => format!("How does {subject} work in treated tissue?"),
                "Dosage" | "Treatment Protocol" => {
                    format!("What dosage is recommended when using {subject}?")
                }
                _ if chunk.kind == ChunkKind::Parent => {
                    format!("What are the main findings reported about {subject}?")
                }
                _ => format!("What does the documentation say about {subject}?"),
            }
        };
        Ok(question)
    }
}

/// Configuration for a generation run.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    /// Target number of cases.
    pub target_cases: usize,
    /// Dataset version stamp (`YYYY-MM-DD`).
    pub version: String,
    /// Chunks handled between cooperative pauses.
    pub batch_size: usize,
    /// Pause between batches, respecting remote-generator quotas. Zero
    /// for local generators.
    pub batch_delay: std::time::Duration,
}

impl SyntheticConfig {
    /// Creates a config with today's date as the version and no pacing
    /// (suited to the local template generator).
    #[must_use]
    pub fn new(target_cases: usize) -> Self {
        Self {
            target_cases,
            version: chrono::Local::now().format("%Y-%m-%d").to_string(),
            batch_size: 10,
            batch_delay: std::time::Duration::ZERO,
        }
    }
}

/// Synthetic dataset generator.
pub struct SyntheticGenerator {
    store: SharedStore,
    generator: Box<dyn QuestionGenerator>,
}

impl SyntheticGenerator {
    /// Creates the generator over a store and question source.
    #[must_use]
    pub fn new(store: SharedStore, generator: Box<dyn QuestionGenerator>) -> Self {
        Self { store, generator }
    }

    /// Generates a validated, deduplicated dataset.
    ///
    /// Per-chunk generation failures are logged and skipped; the run
    /// fails only if the store cannot be read.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk store cannot be read.
    pub fn generate(&self, config: &SyntheticConfig) -> Result<Dataset> {
        let chunks = with_store(&self.store, |s| s.all_chunks())?;
        let sample = stratified_sample(&chunks, config.target_cases.saturating_mul(3));

        let mut accepted: Vec<QueryCase> = Vec::new();
        for (i, chunk) in sample.into_iter().enumerate() {
            if accepted.len() >= config.target_cases {
                break;
            }
            if i > 0
                && config.batch_size > 0
                && i % config.batch_size == 0
                && !config.batch_delay.is_zero()
            {
                std::thread::sleep(config.batch_delay);
            }
            let question = match self.generator.generate(chunk) {
                Ok(q) => q,
                Err(e) => {
                    warn!(chunk_id = %chunk.chunk_id, error = %e, "question generation failed; skipping chunk");
                    continue;
                }
            };
            if let Some(reason) = validate_question(&question, &chunk.text) {
                debug!(chunk_id = %chunk.chunk_id, reason, "candidate question rejected");
                continue;
            }
            if accepted
                .iter()
                .any(|case| sequence_similarity(&case.question, &question) >= SIMILARITY_THRESHOLD)
            {
                debug!(chunk_id = %chunk.chunk_id, "near-duplicate question rejected");
                continue;
            }

            let case_id = format!("syn-{:03}", accepted.len() + 1);
            accepted.push(QueryCase {
                id: case_id,
                question,
                expected_doc_ids: vec![chunk.doc_id.clone()],
                expected_keywords: expected_keywords(chunk),
                should_refuse: false,
                max_chunks: 5,
            });
        }

        Ok(Dataset {
            version: config.version.clone(),
            cases: accepted,
        })
    }
}

/// Stratified sample across (doc, kind, section): round-robin over strata
/// so the longest documents do not dominate.
#[must_use]
pub fn stratified_sample(chunks: &[Chunk], limit: usize) -> Vec<&Chunk> {
    let mut strata: BTreeMap<(String, &'static str, String), Vec<&Chunk>> = BTreeMap::new();
    for chunk in chunks {
        strata
            .entry((
                chunk.doc_id.clone(),
                chunk.kind.as_str(),
                chunk.section.clone(),
            ))
            .or_default()
            .push(chunk);
    }

    let mut sample = Vec::new();
    let mut depth = 0;
    while sample.len() < limit {
        let mut took_any = false;
        for bucket in strata.values() {
            if let Some(chunk) = bucket.get(depth) {
                sample.push(*chunk);
                took_any = true;
                if sample.len() >= limit {
                    break;
                }
            }
        }
        if !took_any {
            break;
        }
        depth += 1;
    }
    sample
}

/// Validates a candidate question against its source chunk.
///
/// Returns a rejection reason, or `None` when the question is usable.
#[must_use]
pub fn validate_question(question: &str, chunk_text: &str) -> Option<&'static str> {
    if !question.trim_end().ends_with('?') {
        return Some("does not end with a question mark");
    }
    let token_count = question.split_whitespace().count();
    if !(MIN_TOKENS..=MAX_TOKENS).contains(&token_count) {
        return Some("token count out of range");
    }

    // Specificity: the question must share a substantial content word
    // with the chunk
    let chunk_lower = chunk_text.to_lowercase();
    let specific = tokenize(question)
        .into_iter()
        .any(|t| t.len() >= 4 && !is_stopword(&t) && chunk_lower.contains(&t));
    if !specific {
        return Some("no specific term from the chunk");
    }
    None
}

/// Expected keywords: salient chunk tokens, capped.
#[must_use]
pub fn expected_keywords(chunk: &Chunk) -> Vec<String> {
    let mut keywords = salient_tokens(&chunk.text);
    if let Some(product) = &chunk.metadata.product
        && !keywords.contains(product)
    {
        keywords.insert(0, product.clone());
    }
    keywords.truncate(MAX_KEYWORDS);
    keywords
}
