//! Text-to-vector providers for the semantic retrieval branch.
//!
//! Chunk and query text becomes fixed-dimension vectors behind the
//! [`Embedder`] seam; the [`EmbeddingGateway`] fronts any provider with
//! caching, retry, and long-input segmentation. The deployment dimension
//! is fixed: every vector in the store must come from the same provider
//! at the same dimension or cosine ranking is meaningless, which is why
//! the provider's model name is recorded next to each stored embedding.
//!
//! # Feature Flags
//!
//! - `fastembed-embeddings`: ONNX model embeddings via `FastEmbed`
//! - Without the feature: the deterministic lexical fallback, which
//!   clusters by shared clinical vocabulary rather than semantics

mod fallback;
pub mod gateway;

#[cfg(feature = "fastembed-embeddings")]
mod fastembed_impl;

pub use fallback::FallbackEmbedder;
pub use gateway::EmbeddingGateway;

#[cfg(feature = "fastembed-embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

use crate::Result;

/// Default embedding dimensions for this deployment.
///
/// This is the authoritative source for embedding dimensions across the
/// codebase; all vector paths use this constant for consistency.
pub const DEFAULT_DIMENSIONS: usize = 1536;

/// Seam for embedding providers.
///
/// Implementations must be thread-safe (`Send + Sync`) so ingestion can
/// embed chunk batches in parallel, and deterministic enough that
/// re-embedding an unchanged chunk reproduces its stored vector.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Provider identifier recorded alongside stored embeddings, so a
    /// corpus embedded under one model is never silently queried under
    /// another.
    fn model_name(&self) -> &'static str {
        "unspecified"
    }

    /// Embeds one text into a `dimensions()`-length vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot produce a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a batch of texts, one vector per input in input order.
    ///
    /// Defaults to sequential `embed` calls; providers with a real batch
    /// endpoint or local parallelism override this.
    ///
    /// # Errors
    ///
    /// Returns an error if any input cannot be embedded.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Builds the provider for this build's feature set: the `FastEmbed`
/// model when `fastembed-embeddings` is enabled, the lexical fallback
/// otherwise. Model-backed providers fix their own dimension and ignore
/// the requested one.
///
/// # Errors
///
/// Returns an error if provider initialization fails.
#[cfg(feature = "fastembed-embeddings")]
pub fn create_embedder(dimensions: usize) -> Result<Box<dyn Embedder>> {
    let _ = dimensions;
    Ok(Box::new(FastEmbedEmbedder::new()?))
}

/// Builds the provider for this build's feature set: the `FastEmbed`
/// model when `fastembed-embeddings` is enabled, the lexical fallback
/// otherwise (which never fails to initialize).
///
/// # Errors
///
/// Returns an error if provider initialization fails.
#[cfg(not(feature = "fastembed-embeddings"))]
pub fn create_embedder(dimensions: usize) -> Result<Box<dyn Embedder>> {
    Ok(Box::new(FallbackEmbedder::new(dimensions)))
}

/// Cosine similarity between two embedding vectors, in [-1, 1].
///
/// Accumulates the dot product and both squared norms in one pass.
/// Mismatched lengths and zero-magnitude vectors score 0.0 rather than
/// erroring: a degenerate vector simply attracts nothing.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator <= f32::EPSILON {
        0.0
    } else {
        dot / denominator
    }
}

/// Normalizes a raw cosine similarity into [0, 1].
///
/// Downstream scoring stays in the unit interval; `(x + 1) / 2` maps the
/// full cosine range and is clipped against floating-point drift.
#[must_use]
pub fn normalize_cosine(similarity: f32) -> f32 {
    ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
}
