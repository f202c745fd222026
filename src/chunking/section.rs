//! Section-based chunking for factsheets and brochures.
//!
//! Splits on recognized section headings using a variation map, so
//! "Treatment Areas" and "Approved Uses" both land under "Indications".
//! Unrecognized headings do not split; their text accrues to the current
//! section.

use crate::chunking::traits::DocumentChunker;
use crate::chunking::{MIN_CHUNK_CHARS, SECTION_TARGET_CHARS, pack_spans};
use crate::core::{Chunk, Document};
use crate::error::Result;
use crate::io::PageMap;
use std::ops::Range;

/// Heading variation map: canonical label followed by its variations.
///
/// Variations are compared lowercased with any trailing colon stripped.
const HEADING_MAP: &[(&str, &[&str])] = &[
    (
        "Indications",
        &[
            "indications",
            "indication",
            "treatment areas",
            "approved uses",
            "areas of application",
            "intended use",
        ],
    ),
    (
        "Contraindications",
        &[
            "contraindications",
            "contraindication",
            "do not use",
            "exclusion criteria",
        ],
    ),
    (
        "Dosage",
        &[
            "dosage",
            "dosage and administration",
            "posology",
            "administration",
            "recommended dose",
        ],
    ),
    (
        "Composition",
        &["composition", "ingredients", "formulation", "contains"],
    ),
    (
        "Mechanism",
        &[
            "mechanism",
            "mechanism of action",
            "mode of action",
            "how it works",
        ],
    ),
    (
        "Warnings",
        &[
            "warnings",
            "precautions",
            "warnings and precautions",
            "side effects",
            "adverse reactions",
        ],
    ),
    (
        "Treatment Protocol",
        &["treatment protocol", "protocol", "treatment schedule"],
    ),
];

/// Longest heading line considered; longer lines are body text.
const MAX_HEADING_LEN: usize = 60;

/// Canonicalizes a candidate heading line.
///
/// Returns the canonical label when the trimmed, lowercased line (minus a
/// trailing colon) matches a known variation.
#[must_use]
pub fn canonical_heading(line: &str) -> Option<&'static str> {
    let trimmed = line.trim().trim_end_matches(':').trim();
    if trimmed.is_empty() || trimmed.len() > MAX_HEADING_LEN {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    HEADING_MAP
        .iter()
        .find(|(_, variations)| variations.contains(&lowered.as_str()))
        .map(|(canonical, _)| *canonical)
}

/// A labeled document section with its byte range (heading line included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Canonical label, or empty for preamble text.
    pub label: String,
    /// Byte range in the document text.
    pub range: Range<usize>,
}

/// Splits a document into labeled sections on recognized headings.
///
/// The ranges tile the text exactly; text before the first recognized
/// heading becomes an unlabeled preamble section.
#[must_use]
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current_label = String::new();
    let mut current_start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if let Some(canonical) = canonical_heading(line) {
            if offset > current_start {
                sections.push(Section {
                    label: current_label.clone(),
                    range: current_start..offset,
                });
            }
            current_label = canonical.to_string();
            current_start = offset;
        }
        offset += line.len();
    }
    if offset > current_start {
        sections.push(Section {
            label: current_label,
            range: current_start..offset,
        });
    }
    sections
}

/// Chunker that splits on canonicalized section headings.
#[derive(Debug, Clone)]
pub struct SectionChunker {
    target_chars: usize,
    min_chars: usize,
}

impl Default for SectionChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionChunker {
    /// Creates a section chunker with default sizes.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            target_chars: SECTION_TARGET_CHARS,
            min_chars: MIN_CHUNK_CHARS,
        }
    }

    /// Creates a section chunker with a custom target size.
    #[must_use]
    pub const fn with_target(target_chars: usize) -> Self {
        Self {
            target_chars,
            min_chars: MIN_CHUNK_CHARS,
        }
    }
}

impl DocumentChunker for SectionChunker {
    fn chunk(&self, doc: &Document, text: &str, pages: &PageMap) -> Result<Vec<Chunk>> {
        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let mut chunks = Vec::new();
        let mut ordinal = 0;

        for section in split_sections(text) {
            let body = &text[section.range.clone()];
            for span in pack_spans(body, self.target_chars, 0, self.min_chars) {
                let start = section.range.start + span.start;
                let end = section.range.start + span.end;
                if text[start..end].trim().is_empty() {
                    continue;
                }
                let mut chunk = Chunk::flat(
                    &doc.doc_id,
                    doc.doc_type,
                    ordinal,
                    text[start..end].to_string(),
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
        "section"
    }

    fn description(&self) -> &'static str {
        "Splits on recognized section headings with a canonicalizing variation map"
    }
}
