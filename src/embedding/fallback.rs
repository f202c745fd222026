//! Deterministic lexical fallback embedder.
//!
//! Stands in when no model-backed provider is configured. Stopword-free
//! tokens and adjacent-token bigrams are projected into hashed slots of a
//! fixed-dimension vector, with controlled-vocabulary terms (products,
//! anatomy, treatments) and dosage-like tokens weighted above plain
//! words, and plurals folded so "4 sessions" and "4 session" land on the
//! same features. Similarity is clinical-vocabulary overlap, not
//! semantics.

use crate::Result;
use crate::embedding::Embedder;
use crate::enrich::FAMILIES;
use crate::text::{content_terms, singularize, tokenize};
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

/// Weight for tokens from the controlled taxonomies.
const VOCABULARY_WEIGHT: f32 = 2.5;

/// Weight for dosage-like tokens (any digit present: "2ml", "20").
const MEASURE_WEIGHT: f32 = 1.5;

/// Weight for ordinary content words.
const WORD_WEIGHT: f32 = 1.0;

/// Weight for adjacent-token bigrams, the phrase signal that separates
/// "plinest hair" from a stray "hair" mention.
const BIGRAM_WEIGHT: f32 = 0.75;

/// Every word of every synonym in the controlled taxonomies, plural-folded.
static VOCABULARY: LazyLock<HashSet<String>> = LazyLock::new(|| {
    let mut words = HashSet::new();
    for family in FAMILIES {
        for label in family.labels {
            for synonym in label.synonyms {
                for word in tokenize(synonym) {
                    words.insert(singularize(&word));
                }
            }
        }
    }
    words
});

/// Hashed lexical embedder over clinical vocabulary.
///
/// Deterministic: the same text always produces the same unit-length
/// vector, so cached and re-ingested corpora stay comparable across runs.
///
/// # Examples
///
/// ```
/// use clinrag::embedding::{Embedder, FallbackEmbedder, DEFAULT_DIMENSIONS};
///
/// let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
/// let a = embedder.embed("4 sessions every 2 weeks").unwrap();
/// let b = embedder.embed("4 session every 2 week").unwrap();
/// assert_eq!(a, b); // plural folding
/// ```
pub struct FallbackEmbedder {
    dimensions: usize,
}

impl FallbackEmbedder {
    /// Creates a new fallback embedder with the specified dimensions.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_feature(key: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// Feature weight: taxonomy vocabulary > measurements > plain words.
    fn token_weight(token: &str) -> f32 {
        if VOCABULARY.contains(token) {
            VOCABULARY_WEIGHT
        } else if token.chars().any(|c| c.is_ascii_digit()) {
            MEASURE_WEIGHT
        } else {
            WORD_WEIGHT
        }
    }

    /// Projects one feature onto a primary (+) and a secondary (−) slot.
    ///
    /// The paired negative slot makes unrelated features that collide on
    /// their primary slot cancel elsewhere instead of stacking into
    /// spurious similarity.
    #[allow(clippy::cast_possible_truncation)]
    fn project(&self, embedding: &mut [f32], key: &str, weight: f32) {
        let hash = Self::hash_feature(key);
        let primary = (hash as usize) % self.dimensions;
        let secondary = ((hash >> 21) as usize) % self.dimensions;
        embedding[primary] += weight;
        if secondary != primary {
            embedding[secondary] -= weight * 0.5;
        }
    }

    /// Builds the hashed lexical embedding for a text.
    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let tokens: Vec<String> = content_terms(text)
            .iter()
            .map(|t| singularize(t))
            .collect();

        for token in &tokens {
            self.project(&mut embedding, token, Self::token_weight(token));
        }
        for pair in tokens.windows(2) {
            let key = format!("{} {}", pair[0], pair[1]);
            self.project(&mut embedding, &key, BIGRAM_WEIGHT);
        }

        // Unit length for cosine similarity
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for slot in &mut embedding {
                *slot /= magnitude;
            }
        }

        embedding
    }
}

impl Embedder for FallbackEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &'static str {
        "lexical-fallback"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.generate_embedding(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        use rayon::prelude::*;

        // Hashing is CPU-bound, so batches fan out across cores
        Ok(texts
            .par_iter()
            .map(|text| self.generate_embedding(text))
            .collect())
    }
}
