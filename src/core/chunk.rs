//! Chunk representation for the retrieval core.
//!
//! Chunks are the atomic unit of retrieval: a span of a document's
//! normalized text with page/section attribution, optional parent/child
//! hierarchy links, and canonical taxonomy metadata.

use crate::core::DocType;
use serde::{Deserialize, Serialize};

/// Hierarchy role of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Broad-context chunk that owns child chunks.
    Parent,
    /// Precise chunk pointing at exactly one parent.
    Child,
    /// Chunk with neither parent nor children.
    Flat,
}

impl ChunkKind {
    /// Canonical lower-case label used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parent => "parent",
            Self::Child => "child",
            Self::Flat => "flat",
        }
    }

    /// Parses a canonical label; unknown labels become `Flat`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "parent" => Self::Parent,
            "child" => Self::Child,
            _ => Self::Flat,
        }
    }
}

/// Canonical metadata attached to every chunk of a document.
///
/// Taxonomy fields hold canonical lower-case labels from the controlled
/// vocabularies in [`crate::enrich::taxonomy`]; free-form values are not
/// allowed there. Protocol fields carry verbatim extracted strings and are
/// copied into every chunk of the document so retrieved children keep
/// answer context even when split.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Canonical anatomy label, if the document mentions one dominantly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anatomy: Option<String>,
    /// Canonical product label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    /// Canonical treatment tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub treatment: Option<String>,
    /// Mirror of the owning document's type.
    pub doc_type: String,
    /// Whether any protocol field below is populated.
    pub has_protocol_info: bool,
    /// Verbatim session count phrase (e.g. "4 sessions").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_sessions: Option<String>,
    /// Verbatim frequency phrase (e.g. "every 2 weeks").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_frequency: Option<String>,
    /// Verbatim dosage phrase (e.g. "2 ml per session").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_dosage: Option<String>,
    /// Verbatim duration phrase (e.g. "over 8 weeks").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_duration: Option<String>,
}

impl ChunkMetadata {
    /// Creates metadata carrying only the doc-type mirror.
    #[must_use]
    pub fn for_doc_type(doc_type: DocType) -> Self {
        Self {
            doc_type: doc_type.as_str().to_string(),
            ..Self::default()
        }
    }
}

/// An indexable fragment of a document's normalized text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Globally unique identifier (`{doc_id}-{ordinal:04}`).
    pub chunk_id: String,
    /// Owning document.
    pub doc_id: String,
    /// Owning document's type.
    pub doc_type: DocType,
    /// Chunk text. Equal to the source span for most strategies; the
    /// protocol chunker may prepend a summary line (the span offsets always
    /// describe the source region).
    pub text: String,
    /// Start offset in the document's normalized text.
    pub char_start: usize,
    /// End offset (exclusive) in the document's normalized text.
    pub char_end: usize,
    /// 1-based page number for citation.
    pub page_number: u32,
    /// Best-effort section heading label, or empty.
    pub section: String,
    /// Hierarchy role.
    pub kind: ChunkKind,
    /// Parent chunk ID for children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Child chunk IDs for parents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children_ids: Vec<String>,
    /// Canonical metadata.
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Creates a flat chunk over `[char_start, char_end)`.
    #[must_use]
    pub fn flat(
        doc_id: &str,
        doc_type: DocType,
        ordinal: usize,
        text: String,
        char_start: usize,
        char_end: usize,
    ) -> Self {
        Self {
            chunk_id: Self::id_for(doc_id, ordinal),
            doc_id: doc_id.to_string(),
            doc_type,
            text,
            char_start,
            char_end,
            page_number: 1,
            section: String::new(),
            kind: ChunkKind::Flat,
            parent_id: None,
            children_ids: Vec::new(),
            metadata: ChunkMetadata::for_doc_type(doc_type),
        }
    }

    /// Formats the canonical chunk ID for a document ordinal.
    #[must_use]
    pub fn id_for(doc_id: &str, ordinal: usize) -> String {
        format!("{doc_id}-{ordinal:04}")
    }

    /// Chunk length in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Whether the chunk text is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Length of the source span this chunk covers.
    #[must_use]
    pub const fn span_len(&self) -> usize {
        self.char_end - self.char_start
    }

    /// Checks the basic offset invariant against a document length.
    #[must_use]
    pub const fn offsets_valid(&self, doc_len: usize) -> bool {
        self.char_start < self.char_end && self.char_end <= doc_len
    }

    /// Citation marker for this chunk (`[doc_id:page]`).
    #[must_use]
    pub fn citation(&self) -> String {
        format!("[{}:{}]", self.doc_id, self.page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Chunk {
        Chunk::flat("newest-factsheet", DocType::Factsheet, 3, "Newest is a polynucleotide gel.".to_string(), 120, 151)
    }

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(Chunk::id_for("newest-factsheet", 3), "newest-factsheet-0003");
        assert_eq!(sample().chunk_id, "newest-factsheet-0003");
    }

    #[test]
    fn test_flat_chunk_defaults() {
        let c = sample();
        assert_eq!(c.kind, ChunkKind::Flat);
        assert!(c.parent_id.is_none());
        assert!(c.children_ids.is_empty());
        assert_eq!(c.metadata.doc_type, "factsheet");
        assert!(!c.metadata.has_protocol_info);
    }

    #[test]
    fn test_offsets_valid() {
        let c = sample();
        assert!(c.offsets_valid(200));
        assert!(!c.offsets_valid(150));

        let mut inverted = sample();
        inverted.char_end = inverted.char_start;
        assert!(!inverted.offsets_valid(200));
    }

    #[test]
    fn test_span_len() {
        assert_eq!(sample().span_len(), 31);
    }

    #[test]
    fn test_citation_format() {
        let mut c = sample();
        c.page_number = 2;
        assert_eq!(c.citation(), "[newest-factsheet:2]");
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [ChunkKind::Parent, ChunkKind::Child, ChunkKind::Flat] {
            assert_eq!(ChunkKind::parse(kind.as_str()), kind);
        }
        assert_eq!(ChunkKind::parse("bogus"), ChunkKind::Flat);
    }

    #[test]
    fn test_serialization_round_trip() {
        let c = sample();
        let json = serde_json::to_string(&c).unwrap();
        let back: Chunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_metadata_skips_empty_options() {
        let c = sample();
        let json = serde_json::to_string(&c.metadata).unwrap();
        assert!(!json.contains("protocol_sessions"));
        assert!(!json.contains("anatomy"));
    }
}
