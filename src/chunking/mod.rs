//! Document-type-specific chunking strategies.
//!
//! This module provides a trait-based system for chunking clinical
//! documents into retrieval chunks. Strategy selection is keyed by document
//! type:
//!
//! - **Hierarchical** (clinical papers, case studies): broad parent chunks
//!   owning overlapping child chunks
//! - **Section-based** (factsheets, brochures, unknown): splits on a
//!   canonicalized map of recognized section headings
//! - **Protocol-aware** (protocols): keeps protocol sections whole so
//!   session/frequency/dosage triples stay together

pub mod hierarchical;
pub mod protocol;
pub mod section;
pub mod sentence;
pub mod traits;

pub use hierarchical::HierarchicalChunker;
pub use protocol::{ProtocolChunker, ProtocolInfo, extract_protocol_info};
pub use section::SectionChunker;
pub use sentence::sentence_spans;
pub use traits::DocumentChunker;

use crate::core::DocType;
use crate::io::find_char_boundary;
use std::ops::Range;

/// Target parent chunk size in characters.
pub const PARENT_CHUNK_CHARS: usize = 1500;

/// Target child chunk size in characters.
pub const CHILD_CHUNK_CHARS: usize = 500;

/// Overlap between consecutive child chunks.
pub const CHILD_OVERLAP_CHARS: usize = 100;

/// Target section chunk size in characters.
pub const SECTION_TARGET_CHARS: usize = 600;

/// Minimum chunk size; smaller tails merge into the previous chunk.
pub const MIN_CHUNK_CHARS: usize = 150;

/// Protocol sections at or below this size are emitted as a single chunk.
pub const PROTOCOL_SECTION_MAX_CHARS: usize = 1200;

/// Hard ceiling on chunk size.
pub const MAX_CHUNK_CHARS: usize = 2000;

/// Resolves the chunking strategy for a document type.
#[must_use]
pub fn chunker_for(doc_type: DocType) -> Box<dyn DocumentChunker> {
    match doc_type {
        DocType::ClinicalPaper | DocType::CaseStudy => Box::new(HierarchicalChunker::new()),
        DocType::Protocol => Box::new(ProtocolChunker::new()),
        DocType::Factsheet | DocType::Brochure | DocType::Unknown => {
            Box::new(SectionChunker::new())
        }
    }
}

/// Lists available chunking strategy names.
#[must_use]
pub fn available_strategies() -> Vec<&'static str> {
    vec!["hierarchical", "section", "protocol"]
}

/// Packs sentence spans of `text` into windows of roughly `target` chars.
///
/// Returned ranges are relative to `text`. The running start offset is
/// tracked explicitly; with `overlap > 0` the next window starts at the
/// first sentence beginning inside the last `overlap` chars of the
/// previous window, so the overlap region carries correct offsets on both
/// sides. Tails smaller than `min` merge into the previous window. A
/// single sentence longer than [`MAX_CHUNK_CHARS`] is hard-split at
/// character boundaries.
#[must_use]
pub fn pack_spans(text: &str, target: usize, overlap: usize, min: usize) -> Vec<Range<usize>> {
    if text.is_empty() || target == 0 {
        return Vec::new();
    }

    // Sentence list with oversize sentences hard-split up front
    let mut units: Vec<Range<usize>> = Vec::new();
    for span in sentence_spans(text) {
        if span.len() <= MAX_CHUNK_CHARS {
            units.push(span);
        } else {
            let mut s = span.start;
            while s < span.end {
                let e = find_char_boundary(text, (s + MAX_CHUNK_CHARS).min(span.end));
                let e = if e <= s { span.end } else { e };
                units.push(s..e);
                s = e;
            }
        }
    }
    if units.is_empty() {
        return Vec::new();
    }

    let mut windows: Vec<Range<usize>> = Vec::new();
    let mut unit_idx = 0;

    while unit_idx < units.len() {
        let start = units[unit_idx].start;
        let mut end = units[unit_idx].end;
        let mut next_idx = unit_idx + 1;

        while next_idx < units.len() && units[next_idx].end - start <= target {
            end = units[next_idx].end;
            next_idx += 1;
        }

        windows.push(start..end);

        if next_idx >= units.len() {
            break;
        }

        // Explicit running offset: the next window begins at the first
        // sentence starting inside the overlap region, if any.
        unit_idx = if overlap > 0 {
            let overlap_from = end.saturating_sub(overlap);
            let back = (unit_idx..next_idx)
                .find(|&i| units[i].start >= overlap_from && units[i].start < end);
            back.map_or(next_idx, |i| if i == unit_idx { next_idx } else { i })
        } else {
            next_idx
        };
    }

    // Merge an undersized tail into the previous window
    if windows.len() > 1
        && let Some(last) = windows.last().cloned()
        && last.len() < min
        && let Some(prev) = windows.get(windows.len() - 2).cloned()
    {
        windows.pop();
        windows.pop();
        windows.push(prev.start..last.end);
    }

    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunker_for_registry() {
        assert_eq!(chunker_for(DocType::ClinicalPaper).name(), "hierarchical");
        assert_eq!(chunker_for(DocType::CaseStudy).name(), "hierarchical");
        assert_eq!(chunker_for(DocType::Protocol).name(), "protocol");
        assert_eq!(chunker_for(DocType::Factsheet).name(), "section");
        assert_eq!(chunker_for(DocType::Brochure).name(), "section");
        assert_eq!(chunker_for(DocType::Unknown).name(), "section");
    }

    #[test]
    fn test_available_strategies() {
        let strategies = available_strategies();
        assert_eq!(strategies.len(), 3);
        assert!(strategies.contains(&"hierarchical"));
    }

    #[test]
    fn test_pack_spans_empty() {
        assert!(pack_spans("", 500, 0, 100).is_empty());
    }

    #[test]
    fn test_pack_spans_small_text() {
        let text = "One short sentence.";
        let spans = pack_spans(text, 500, 0, 100);
        assert_eq!(spans, vec![0..text.len()]);
    }

    #[test]
    fn test_pack_spans_contiguous_without_overlap() {
        let text = "This is a sentence. ".repeat(30);
        let spans = pack_spans(&text, 100, 0, 20);
        assert!(spans.len() > 1);
        assert_eq!(spans[0].start, 0);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "windows must be contiguous");
        }
        assert_eq!(spans.last().unwrap().end, text.len());
    }

    #[test]
    fn test_pack_spans_overlap_regions() {
        let text = "Short sentence here. ".repeat(40);
        let spans = pack_spans(&text, 200, 50, 20);
        assert!(spans.len() > 1);
        for pair in spans.windows(2) {
            // Overlapping or contiguous, never a gap
            assert!(pair[1].start <= pair[0].end);
            assert!(pair[1].start > pair[0].start, "must make progress");
        }
        assert_eq!(spans.last().unwrap().end, text.len());
    }

    #[test]
    fn test_pack_spans_merges_tiny_tail() {
        let text = format!("{}Tail.", "A full sentence of reasonable length. ".repeat(5));
        let spans = pack_spans(&text, 120, 0, 50);
        let last = spans.last().unwrap();
        assert!(last.len() >= 50 || spans.len() == 1);
    }

    #[test]
    fn test_pack_spans_hard_splits_oversize_sentence() {
        let text = "x".repeat(MAX_CHUNK_CHARS * 2 + 100);
        let spans = pack_spans(&text, 600, 0, 100);
        for span in &spans {
            assert!(span.len() <= MAX_CHUNK_CHARS);
        }
        assert_eq!(spans.last().unwrap().end, text.len());
    }
}
