//! Chunker trait definition.
//!
//! Defines the interface for document-type-specific chunking strategies,
//! enabling pluggable segmentation approaches resolved from a registry.

use crate::core::{Chunk, Document};
use crate::error::Result;
use crate::io::PageMap;

/// Trait for chunking a document's normalized text into retrieval chunks.
///
/// Implementations must be `Send + Sync` and deterministic: the same
/// (document, text) input always produces the same chunk list. Offsets are
/// tracked explicitly while walking the text, never derived from
/// accumulated chunk lengths at emit time.
///
/// # Examples
///
/// ```
/// use clinrag::chunking::{DocumentChunker, SectionChunker};
/// use clinrag::core::{DocType, Document};
/// use clinrag::io::PageMap;
/// use std::path::PathBuf;
///
/// let doc = Document::new(
///     "newest-factsheet".into(),
///     DocType::Factsheet,
///     PathBuf::from("newest.txt"),
///     "hash".into(),
/// );
/// let chunker = SectionChunker::new();
/// let chunks = chunker
///     .chunk(&doc, "Indications\nFacial rejuvenation.", &PageMap::single_page())
///     .unwrap();
/// assert!(!chunks.is_empty());
/// ```
pub trait DocumentChunker: Send + Sync {
    /// Chunks the normalized document text.
    ///
    /// # Arguments
    ///
    /// * `doc` - The owning document record.
    /// * `text` - The document's normalized text.
    /// * `pages` - Page map for citation attribution.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be chunked.
    fn chunk(&self, doc: &Document, text: &str, pages: &PageMap) -> Result<Vec<Chunk>>;

    /// Returns the name of the chunking strategy.
    fn name(&self) -> &'static str;

    /// Returns a description of the chunking strategy.
    fn description(&self) -> &'static str {
        "No description available"
    }
}
