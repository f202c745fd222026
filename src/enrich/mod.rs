//! Metadata enrichment: frequency-based taxonomy tagging.
//!
//! Tagging is deterministic: for each taxonomy family, every synonym
//! mention in the normalized text is tallied and the label with the
//! highest tally wins. Ties break by lexicographic label order and zero
//! matches yield no tag. A first-match-wins scan is deliberately not used:
//! a hand-rejuvenation document that mentions "face" early would be
//! mistagged by it.

pub mod taxonomy;

pub use taxonomy::{ANATOMY, FAMILIES, PRODUCT, TREATMENT, TaxonomyFamily, TaxonomyLabel};

use crate::chunking::ProtocolInfo;
use crate::core::Chunk;
use std::collections::BTreeMap;

/// Tags selected for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentTags {
    /// Winning anatomy label.
    pub anatomy: Option<String>,
    /// Winning product label.
    pub product: Option<String>,
    /// Winning treatment label.
    pub treatment: Option<String>,
}

/// Counts whole-word, non-overlapping mentions of every synonym of every
/// label in a family.
///
/// Matches are resolved longest-first at each position, so a
/// "plinest hair" mention counts once, for the "plinest hair" label only.
#[must_use]
pub fn tally_family(text: &str, family: &TaxonomyFamily) -> BTreeMap<&'static str, usize> {
    let lowered = text.to_lowercase();

    // Collect all candidate matches as (start, end, label)
    let mut matches: Vec<(usize, usize, &'static str)> = Vec::new();
    for label in family.labels {
        for synonym in label.synonyms {
            let mut from = 0;
            while let Some(pos) = lowered[from..].find(synonym) {
                let start = from + pos;
                let end = start + synonym.len();
                if is_word_bounded(&lowered, start, end) {
                    matches.push((start, end, label.label));
                }
                from = start + 1;
            }
        }
    }

    // Longest match wins at each position; consumed spans don't recount
    matches.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
    let mut tallies: BTreeMap<&'static str, usize> = BTreeMap::new();
    let mut consumed_until = 0;
    for (start, end, label) in matches {
        if start < consumed_until {
            continue;
        }
        *tallies.entry(label).or_insert(0) += 1;
        consumed_until = end;
    }
    tallies
}

/// Picks the winning label for a family: highest tally, ties broken by
/// lexicographic label order, zero matches yield `None`.
#[must_use]
pub fn pick_label(text: &str, family: &TaxonomyFamily) -> Option<String> {
    let tallies = tally_family(text, family);
    tallies
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
        .filter(|&(_, &count)| count > 0)
        .map(|(label, _)| (*label).to_string())
}

/// Tags a document's normalized text across all taxonomy families.
#[must_use]
pub fn tag_document(text: &str) -> DocumentTags {
    DocumentTags {
        anatomy: pick_label(text, &ANATOMY),
        product: pick_label(text, &PRODUCT),
        treatment: pick_label(text, &TREATMENT),
    }
}

/// Applies document-level tags and protocol info to every chunk.
///
/// Protocol fields are copied into every chunk so retrieved children carry
/// answer context even when split.
pub fn enrich_chunks(chunks: &mut [Chunk], tags: &DocumentTags, protocol: &ProtocolInfo) {
    for chunk in chunks {
        chunk.metadata.anatomy = tags.anatomy.clone();
        chunk.metadata.product = tags.product.clone();
        chunk.metadata.treatment = tags.treatment.clone();
        protocol.apply_to(&mut chunk.metadata);
    }
}

/// Whether `[start, end)` in `text` falls on word boundaries.
fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before_ok = start == 0
        || text[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
    let after_ok = end >= text.len()
        || text[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
    before_ok && after_ok
}
