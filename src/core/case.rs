//! Evaluation fixtures: query cases, datasets, and per-case results.
//!
//! Golden (hand-written) and synthetic datasets share one schema so the
//! harness treats them identically.

use crate::error::{EvalError, IoError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An immutable Q/A test fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryCase {
    /// Unique case identifier within the dataset.
    pub id: String,
    /// The question posed to the retrieval core.
    pub question: String,
    /// Documents expected among the retrieved evidence.
    #[serde(default)]
    pub expected_doc_ids: Vec<String>,
    /// Keywords expected in the generated answer.
    #[serde(default)]
    pub expected_keywords: Vec<String>,
    /// Whether the correct behavior is the canonical refusal.
    #[serde(default)]
    pub should_refuse: bool,
    /// Retrieval budget for this case.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

const fn default_max_chunks() -> usize {
    5
}

/// A versioned collection of query cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Dataset version, `YYYY-MM-DD`.
    pub version: String,
    /// The cases.
    pub cases: Vec<QueryCase>,
}

impl Dataset {
    /// Loads a dataset from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not match the
    /// dataset schema.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| IoError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let dataset: Self = serde_json::from_str(&raw).map_err(|e| EvalError::InvalidDataset {
            reason: e.to_string(),
        })?;
        if dataset.cases.is_empty() {
            return Err(EvalError::InvalidDataset {
                reason: "dataset contains no cases".to_string(),
            }
            .into());
        }
        Ok(dataset)
    }

    /// Writes the dataset as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| IoError::DirectoryFailed {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| EvalError::InvalidDataset {
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| IoError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

/// Heuristic triad scores, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TriadScores {
    /// Mean effective score of the retrieved chunks.
    pub context_relevance: f32,
    /// Fraction of salient answer tokens found in the retrieved context.
    pub groundedness: f32,
    /// Blend of keyword coverage and query-term coverage.
    pub answer_relevance: f32,
}

impl TriadScores {
    /// Combined triad score (mean of the three dimensions).
    #[must_use]
    pub fn combined(&self) -> f32 {
        (self.context_relevance + self.groundedness + self.answer_relevance) / 3.0
    }
}

/// How a case's scores were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    /// Heuristic triad metrics.
    Heuristic,
    /// LLM judge.
    Judge,
    /// Judge was requested but failed; heuristic substituted.
    HeuristicFallback,
}

/// Outcome of running one query case through the harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    /// Case identifier.
    pub case_id: String,
    /// Overall pass flag for the aggregation gate.
    pub passed: bool,
    /// Fraction of `expected_doc_ids` found in the retrieved top-k.
    pub retrieval_recall: f32,
    /// Fraction of `expected_keywords` found in the answer.
    pub keyword_coverage: f32,
    /// Whether every citation in the answer maps to a retrieved
    /// (doc, page) pair.
    pub citations_valid: bool,
    /// Agreement with `should_refuse`.
    pub refusal_correct: bool,
    /// Triad scores.
    pub triad: TriadScores,
    /// How the scores were produced.
    pub method: ScoringMethod,
    /// Free-form detail payload (retrieved ids, answer text, notes).
    #[serde(default)]
    pub details: serde_json::Value,
}
