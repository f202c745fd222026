//! Protocol-aware chunking and protocol-info extraction.
//!
//! Session/frequency/dosage triples lose their meaning when split across
//! chunks, so protocol-relevant sections at or below
//! [`crate::chunking::PROTOCOL_SECTION_MAX_CHARS`] are emitted as a single
//! chunk. Larger protocol sections are split, but every resulting chunk is
//! prefixed with a one-line summary of the extracted protocol metadata.

use crate::chunking::section::split_sections;
use crate::chunking::traits::DocumentChunker;
use crate::chunking::{
    MIN_CHUNK_CHARS, PROTOCOL_SECTION_MAX_CHARS, SECTION_TARGET_CHARS, pack_spans,
};
use crate::core::{Chunk, ChunkMetadata, Document};
use crate::error::Result;
use crate::io::PageMap;
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::unwrap_used)]
static SESSIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{1,2}(?:\s*(?:to|-|–)\s*\d{1,2})?\s+(?:treatment\s+)?sessions?\b")
        .unwrap()
});

#[allow(clippy::unwrap_used)]
static FREQUENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bevery\s+\d{1,2}(?:\s*(?:to|-|–)\s*\d{1,2})?\s+(?:days?|weeks?|months?)\b|\b(?:once|twice)\s+(?:a|per)\s+(?:day|week|month)\b|\b(?:weekly|biweekly|fortnightly|monthly)\b",
    )
    .unwrap()
});

#[allow(clippy::unwrap_used)]
static DOSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*(?:ml|mg|mcg|iu)\b(?:\s+per\s+(?:session|treatment|area))?")
        .unwrap()
});

#[allow(clippy::unwrap_used)]
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:over|for|within)\s+\d{1,2}\s+(?:days?|weeks?|months?)\b").unwrap()
});

/// Heading keywords marking a protocol-relevant section (compared
/// lowercased, substring match).
const PROTOCOL_HEADING_KEYWORDS: &[&str] = &[
    "treatment protocol",
    "dosage and administration",
    "injection protocol",
    "treatment schedule",
    "posology",
    "protocol",
    "administration",
    "dosage",
];

/// Protocol metadata extracted verbatim from document text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolInfo {
    /// Session count phrase (e.g. "4 sessions").
    pub sessions: Option<String>,
    /// Frequency phrase (e.g. "every 2 weeks").
    pub frequency: Option<String>,
    /// Dosage phrase (e.g. "2 ml per session").
    pub dosage: Option<String>,
    /// Duration phrase (e.g. "over 8 weeks").
    pub duration: Option<String>,
}

impl ProtocolInfo {
    /// Whether any field is populated.
    #[must_use]
    pub const fn is_populated(&self) -> bool {
        self.sessions.is_some()
            || self.frequency.is_some()
            || self.dosage.is_some()
            || self.duration.is_some()
    }

    /// One-line summary used as a split-chunk prefix.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let parts: Vec<&str> = [
            self.sessions.as_deref(),
            self.frequency.as_deref(),
            self.dosage.as_deref(),
            self.duration.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();
        format!("Protocol summary: {}.\n", parts.join("; "))
    }

    /// Copies the extracted fields into chunk metadata.
    pub fn apply_to(&self, metadata: &mut ChunkMetadata) {
        metadata.has_protocol_info = self.is_populated();
        metadata.protocol_sessions = self.sessions.clone();
        metadata.protocol_frequency = self.frequency.clone();
        metadata.protocol_dosage = self.dosage.clone();
        metadata.protocol_duration = self.duration.clone();
    }
}

/// Extracts protocol metadata from text, keeping the first match of each
/// pattern verbatim.
#[must_use]
pub fn extract_protocol_info(text: &str) -> ProtocolInfo {
    let first = |re: &Regex| re.find(text).map(|m| m.as_str().to_string());
    ProtocolInfo {
        sessions: first(&SESSIONS_RE),
        frequency: first(&FREQUENCY_RE),
        dosage: first(&DOSAGE_RE),
        duration: first(&DURATION_RE),
    }
}

/// Whether a section label or heading line marks protocol-relevant content.
#[must_use]
pub fn is_protocol_heading(label: &str) -> bool {
    let lowered = label.to_lowercase();
    PROTOCOL_HEADING_KEYWORDS
        .iter()
        .any(|kw| lowered.contains(kw))
}

/// Chunker for protocol documents.
#[derive(Debug, Clone, Default)]
pub struct ProtocolChunker;

impl ProtocolChunker {
    /// Creates a protocol-aware chunker.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DocumentChunker for ProtocolChunker {
    fn chunk(&self, doc: &Document, text: &str, pages: &PageMap) -> Result<Vec<Chunk>> {
        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let mut chunks = Vec::new();
        let mut ordinal = 0;

        for section in split_sections(text) {
            let body = &text[section.range.clone()];
            let protocol_section = is_protocol_heading(&section.label)
                || is_protocol_heading(body.lines().next().unwrap_or(""));

            if protocol_section && body.len() <= PROTOCOL_SECTION_MAX_CHARS {
                // Never split: the session/frequency/dosage triple stays whole
                let mut chunk = Chunk::flat(
                    &doc.doc_id,
                    doc.doc_type,
                    ordinal,
                    body.to_string(),
                    section.range.start,
                    section.range.end,
                );
                chunk.section = section.label.clone();
                chunk.page_number = pages.page_for(section.range.start);
                chunks.push(chunk);
                ordinal += 1;
                continue;
            }

            let info = protocol_section.then(|| extract_protocol_info(body));
            let prefix = info
                .as_ref()
                .filter(|i| i.is_populated())
                .map(ProtocolInfo::summary_line);

            for span in pack_spans(body, SECTION_TARGET_CHARS, 0, MIN_CHUNK_CHARS) {
                let start = section.range.start + span.start;
                let end = section.range.start + span.end;
                let source = &text[start..end];
                if source.trim().is_empty() {
                    continue;
                }
                let chunk_text = prefix
                    .as_ref()
                    .map_or_else(|| source.to_string(), |p| format!("{p}{source}"));
                let mut chunk = Chunk::flat(
                    &doc.doc_id,
                    doc.doc_type,
                    ordinal,
                    chunk_text,
                    start,
                    end,
                );
                chunk.section = section.label.clone();
                chunk.page_number = pages.page_for(start);
                chunks.push(chunk);
                ordinal += 1;
            }
        }

        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "protocol"
    }

    fn description(&self) -> &'static str {
        "Keeps protocol sections whole so session, frequency, and dosage stay together"
    }
}
