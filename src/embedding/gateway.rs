//! Embedding gateway: cache, retry, and long-input segmentation.
//!
//! The gateway wraps any [`Embedder`] provider with a content-hash TTL
//! cache, retry with exponential backoff, and segmentation of inputs
//! beyond the provider's limit. Long inputs split on sentence/paragraph
//! boundaries into at most [`MAX_SEGMENTS`] pieces whose embeddings are
//! mean-pooled; anything larger fails with `InputTooLarge` rather than
//! being truncated silently.

use crate::cache::{TtlCache, content_key};
use crate::chunking::pack_spans;
use crate::cost::CostTracker;
use crate::embedding::Embedder;
use crate::error::{EmbeddingError, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of segments a long input may split into.
pub const MAX_SEGMENTS: usize = 8;

/// Provider character limit per call; inputs beyond it are segmented.
pub const SEGMENT_CHARS: usize = 8000;

/// Default retry attempts against the provider.
const DEFAULT_RETRIES: u32 = 3;

/// Base backoff between retries (doubles per attempt).
const DEFAULT_BACKOFF: Duration = Duration::from_millis(200);

/// Estimated provider cost per 1k characters embedded, in USD.
const COST_PER_1K_CHARS_USD: f64 = 0.000_02;

/// Caching, retrying, segmenting front for an embedding provider.
pub struct EmbeddingGateway {
    provider: Box<dyn Embedder>,
    cache: TtlCache<String, Vec<f32>>,
    costs: Arc<CostTracker>,
    max_retries: u32,
    base_backoff: Duration,
    segment_chars: usize,
    max_segments: usize,
}

impl EmbeddingGateway {
    /// Creates a gateway around a provider with the given cache TTL.
    #[must_use]
    pub fn new(provider: Box<dyn Embedder>, cache_ttl: Duration, costs: Arc<CostTracker>) -> Self {
        Self {
            provider,
            cache: TtlCache::new(cache_ttl),
            costs,
            max_retries: DEFAULT_RETRIES,
            base_backoff: DEFAULT_BACKOFF,
            segment_chars: SEGMENT_CHARS,
            max_segments: MAX_SEGMENTS,
        }
    }

    /// Overrides retry behavior (used by tests to avoid sleeping).
    #[must_use]
    pub const fn with_retry(mut self, max_retries: u32, base_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_backoff = base_backoff;
        self
    }

    /// Overrides segmentation limits.
    #[must_use]
    pub const fn with_segmentation(mut self, segment_chars: usize, max_segments: usize) -> Self {
        self.segment_chars = segment_chars;
        self.max_segments = max_segments;
        self
    }

    /// The largest input the gateway accepts.
    #[must_use]
    pub const fn max_input_chars(&self) -> usize {
        self.segment_chars * self.max_segments
    }

    /// Cache key: content hash of the whitespace-normalized text.
    fn cache_key(text: &str) -> String {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        content_key(normalized.as_bytes())
    }

    /// Runs a provider call with retry and exponential backoff.
    fn with_retries<T>(&self, mut call: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last_reason = String::new();
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let backoff = self.base_backoff * 2u32.saturating_pow(attempt - 1);
                std::thread::sleep(backoff);
            }
            match call() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(attempt, error = %e, "embedding provider call failed");
                    last_reason = e.to_string();
                }
            }
        }
        Err(EmbeddingError::Exhausted {
            attempts: self.max_retries,
            reason: last_reason,
        }
        .into())
    }

    /// Splits a long input into at most `max_segments` pieces on
    /// sentence/paragraph boundaries.
    fn segment<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut spans = pack_spans(text, self.segment_chars, 0, self.segment_chars / 8);
        while spans.len() > self.max_segments {
            // Merge the two smallest trailing windows; the input length is
            // already bounded so merged windows stay within provider reach
            let last = spans.len() - 1;
            let merged = spans[last - 1].start..spans[last].end;
            spans.truncate(last - 1);
            spans.push(merged);
        }
        spans.into_iter().map(|r| &text[r]).collect()
    }

    /// Mean-pools segment embeddings into one unit-length vector.
    #[allow(clippy::cast_precision_loss)]
    fn mean_pool(vectors: &[Vec<f32>], dimensions: usize) -> Vec<f32> {
        let mut pooled = vec![0.0f32; dimensions];
        for vector in vectors {
            for (slot, value) in pooled.iter_mut().zip(vector.iter()) {
                *slot += value;
            }
        }
        let n = vectors.len().max(1) as f32;
        for slot in &mut pooled {
            *slot /= n;
        }
        let magnitude: f32 = pooled.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for slot in &mut pooled {
                *slot /= magnitude;
            }
        }
        pooled
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() == self.provider.dimensions() {
            Ok(())
        } else {
            Err(EmbeddingError::DimensionMismatch {
                expected: self.provider.dimensions(),
                actual: vector.len(),
            }
            .into())
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn charge_for(&self, chars: usize) -> Result<()> {
        self.costs
            .charge(chars as f64 / 1000.0 * COST_PER_1K_CHARS_USD)
    }

    fn embed_uncached(&self, text: &str) -> Result<Vec<f32>> {
        self.charge_for(text.len())?;
        if text.chars().count() <= self.segment_chars {
            let vector = self.with_retries(|| self.provider.embed(text))?;
            self.check_dimension(&vector)?;
            return Ok(vector);
        }

        let segments = self.segment(text);
        debug!(segments = segments.len(), "segmenting long input");
        let vectors = self.with_retries(|| self.provider.embed_batch(&segments))?;
        for vector in &vectors {
            self.check_dimension(vector)?;
        }
        Ok(Self::mean_pool(&vectors, self.provider.dimensions()))
    }
}

impl Embedder for EmbeddingGateway {
    fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    fn model_name(&self) -> &'static str {
        self.provider.model_name()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let chars = text.chars().count();
        if chars > self.max_input_chars() {
            return Err(EmbeddingError::InputTooLarge {
                chars,
                max: self.max_input_chars(),
            }
            .into());
        }

        let key = Self::cache_key(text);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        let vector = self.embed_uncached(text)?;
        self.cache.insert(key, vector.clone());
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Resolve cache hits first; misses go through the provider in one
        // batched call where possible.
        let mut results: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut miss_indices: Vec<usize> = Vec::new();
        let mut miss_texts: Vec<&str> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            let chars = text.chars().count();
            if chars > self.max_input_chars() {
                return Err(EmbeddingError::InputTooLarge {
                    chars,
                    max: self.max_input_chars(),
                }
                .into());
            }
            if let Some(hit) = self.cache.get(&Self::cache_key(text)) {
                results.push(Some(hit));
            } else if chars <= self.segment_chars {
                results.push(None);
                miss_indices.push(i);
                miss_texts.push(text);
            } else {
                // Long inputs segment individually
                let vector = self.embed_uncached(text)?;
                self.cache.insert(Self::cache_key(text), vector.clone());
                results.push(Some(vector));
            }
        }

        if !miss_texts.is_empty() {
            let total_chars: usize = miss_texts.iter().map(|t| t.len()).sum();
            self.charge_for(total_chars)?;
            let vectors = self.with_retries(|| self.provider.embed_batch(&miss_texts))?;
            if vectors.len() != miss_texts.len() {
                return Err(EmbeddingError::Provider {
                    reason: format!(
                        "provider returned {} vectors for {} inputs",
                        vectors.len(),
                        miss_texts.len()
                    ),
                }
                .into());
            }
            for (slot, vector) in miss_indices.iter().zip(vectors) {
                self.check_dimension(&vector)?;
                self.cache
                    .insert(Self::cache_key(texts[*slot]), vector.clone());
                results[*slot] = Some(vector);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}
