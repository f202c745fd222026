//! Output formatting for CLI commands.
//!
//! Every command produces either human-readable text or JSON for
//! programmatic consumers.

use crate::error::Error;
use crate::eval::EvalReport;
use crate::ingest::IngestReport;
use crate::service::QueryResponse;
use crate::store::StoreStats;
use std::fmt::Write;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; unknown names fall back to text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Formats an error for the selected output format.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::json!({ "error": error.to_string() }).to_string()
        }
        OutputFormat::Text => error.to_string(),
    }
}

/// Formats a query response.
#[must_use]
pub fn format_query_response(response: &QueryResponse, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(response)
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    }

    let mut out = String::new();
    let _ = writeln!(out, "Query type: {}", response.query_type.as_str());
    let _ = writeln!(
        out,
        "Evidence: sufficient={} strong_matches={} confidence={:.2}",
        response.evidence.sufficient, response.evidence.strong_matches, response.evidence.confidence
    );
    if let Some(refusal) = &response.refusal {
        let _ = writeln!(out, "\n{refusal}");
        return out;
    }
    let _ = writeln!(out, "\nRetrieved chunks:");
    for (i, retrieved) in response.retrieved.chunks.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. [{}:{}] score={:.3}{} {}",
            i + 1,
            retrieved.chunk.doc_id,
            retrieved.chunk.page_number,
            retrieved.display_score(),
            retrieved
                .rerank_score
                .map(|r| format!(" rerank={r:.3}"))
                .unwrap_or_default(),
            preview(&retrieved.chunk.text, 100),
        );
    }
    if !response.retrieved.reranker_available {
        let _ = writeln!(out, "\n(reranker unavailable; fused ordering used)");
    }
    out
}

/// Formats an ingest report.
#[must_use]
pub fn format_ingest_report(report: &IngestReport, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(report)
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Ingested {} document(s), {} chunk(s); skipped {} unchanged",
        report.documents_processed,
        report.chunks_produced,
        report.skipped.len()
    );
    for failure in &report.failures {
        let _ = writeln!(
            out,
            "  FAILED {} at {}: {}",
            failure.path, failure.stage, failure.reason
        );
    }
    out
}

/// Formats store statistics.
#[must_use]
pub fn format_stats(stats: &StoreStats, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(stats)
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    }

    let mut out = String::new();
    let _ = writeln!(out, "Documents:  {}", stats.document_count);
    let _ = writeln!(out, "Chunks:     {}", stats.chunk_count);
    let _ = writeln!(out, "Embeddings: {}", stats.embedding_count);
    let _ = writeln!(out, "Schema:     v{}", stats.schema_version);
    if let Some(size) = stats.db_size {
        let _ = writeln!(out, "DB size:    {size} bytes");
    }
    out
}

/// Formats an evaluation report summary.
#[must_use]
pub fn format_eval_report(report: &EvalReport, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return serde_json::to_string_pretty(report)
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    }

    let mut out = String::new();
    let summary = &report.summary;
    let _ = writeln!(
        out,
        "Dataset {} | {}/{} passed ({:.0}%) | gate: {}",
        report.dataset_version,
        summary.passed,
        summary.total,
        summary.pass_rate * 100.0,
        if report.gate_passed { "PASS" } else { "FAIL" }
    );
    let _ = writeln!(
        out,
        "Triad averages: context={:.2} groundedness={:.2} answer={:.2} combined={:.2}",
        summary.avg_context_relevance,
        summary.avg_groundedness,
        summary.avg_answer_relevance,
        summary.avg_combined
    );
    let _ = writeln!(out, "Refusal accuracy: {:.2}", summary.refusal_accuracy);
    for case in report.cases.iter().filter(|c| !c.passed) {
        let _ = writeln!(
            out,
            "  FAIL {}: recall={:.2} kw={:.2} refusal_ok={} triad={:.2}",
            case.case_id,
            case.retrieval_recall,
            case.keyword_coverage,
            case.refusal_correct,
            case.triad.combined()
        );
    }
    out
}

/// Truncated single-line preview of a text.
fn preview(text: &str, max_chars: usize) -> String {
    let flattened = text.replace('\n', " ");
    let truncated: String = flattened.chars().take(max_chars).collect();
    if flattened.chars().count() > max_chars {
        format!("{truncated}…")
    } else {
        truncated
    }
}
