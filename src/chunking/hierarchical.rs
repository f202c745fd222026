//! Hierarchical parent/child chunking.
//!
//! Used for clinical papers and case studies: broad parent chunks carry
//! context for the generator while overlapping child chunks give the
//! retriever precise targets. Parents own their children; every child
//! points back at exactly one parent.

use crate::chunking::traits::DocumentChunker;
use crate::chunking::{
    CHILD_CHUNK_CHARS, CHILD_OVERLAP_CHARS, MIN_CHUNK_CHARS, PARENT_CHUNK_CHARS, pack_spans,
};
use crate::core::{Chunk, ChunkKind, Document};
use crate::error::Result;
use crate::io::PageMap;

/// Chunker producing parent chunks with overlapping children.
#[derive(Debug, Clone)]
pub struct HierarchicalChunker {
    parent_chars: usize,
    child_chars: usize,
    child_overlap: usize,
}

impl Default for HierarchicalChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchicalChunker {
    /// Creates a hierarchical chunker with default sizes.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            parent_chars: PARENT_CHUNK_CHARS,
            child_chars: CHILD_CHUNK_CHARS,
            child_overlap: CHILD_OVERLAP_CHARS,
        }
    }

    /// Creates a hierarchical chunker with custom parent/child sizes.
    #[must_use]
    pub const fn with_sizes(parent_chars: usize, child_chars: usize, child_overlap: usize) -> Self {
        Self {
            parent_chars,
            child_chars,
            child_overlap,
        }
    }
}

impl DocumentChunker for HierarchicalChunker {
    fn chunk(&self, doc: &Document, text: &str, pages: &PageMap) -> Result<Vec<Chunk>> {
        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let parent_spans = pack_spans(text, self.parent_chars, 0, MIN_CHUNK_CHARS);
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut ordinal = 0;

        for parent_span in parent_spans {
            let parent_text = &text[parent_span.clone()];
            let mut parent = Chunk::flat(
                &doc.doc_id,
                doc.doc_type,
                ordinal,
                parent_text.to_string(),
                parent_span.start,
                parent_span.end,
            );
            parent.kind = ChunkKind::Parent;
            parent.page_number = pages.page_for(parent_span.start);
            let parent_idx = chunks.len();
            let parent_id = parent.chunk_id.clone();
            chunks.push(parent);
            ordinal += 1;

            let child_spans = pack_spans(
                parent_text,
                self.child_chars,
                self.child_overlap,
                MIN_CHUNK_CHARS,
            );
            // A parent that fits in one child window carries no children
            if child_spans.len() <= 1 {
                continue;
            }

            let mut children_ids = Vec::with_capacity(child_spans.len());
            for child_span in child_spans {
                let start = parent_span.start + child_span.start;
                let end = parent_span.start + child_span.end;
                let mut child = Chunk::flat(
                    &doc.doc_id,
                    doc.doc_type,
                    ordinal,
                    text[start..end].to_string(),
                    start,
                    end,
                );
                child.kind = ChunkKind::Child;
                child.parent_id = Some(parent_id.clone());
                child.page_number = pages.page_for(start);
                children_ids.push(child.chunk_id.clone());
                chunks.push(child);
                ordinal += 1;
            }
            if let Some(parent) = chunks.get_mut(parent_idx) {
                parent.children_ids = children_ids;
            }
        }

        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "hierarchical"
    }

    fn description(&self) -> &'static str {
        "Parent chunks with overlapping child chunks for papers and case studies"
    }
}
