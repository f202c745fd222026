//! `FastEmbed`-based semantic embedder.
//!
//! Provides real semantic embeddings using the all-MiniLM-L6-v2 model via
//! fastembed-rs. Only available when the `fastembed-embeddings` feature is
//! enabled.

use crate::Result;
use crate::embedding::Embedder;
use crate::error::EmbeddingError;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::OnceLock;

/// Dimensions of the all-MiniLM-L6-v2 model.
const MODEL_DIMENSIONS: usize = 384;

/// Thread-safe singleton for the embedding model.
/// Uses `OnceLock` for lazy initialization on first use.
static EMBEDDING_MODEL: OnceLock<std::sync::Mutex<fastembed::TextEmbedding>> = OnceLock::new();

/// `FastEmbed` embedder using all-MiniLM-L6-v2.
///
/// The model is lazily loaded on the first embed call to preserve cold
/// start time.
pub struct FastEmbedEmbedder {
    /// Model name for diagnostics.
    model_name: &'static str,
}

impl FastEmbedEmbedder {
    /// Creates a new `FastEmbed` embedder.
    ///
    /// Note: Model is lazily loaded on first `embed()` call.
    ///
    /// # Errors
    ///
    /// Returns an error if model initialization fails.
    #[allow(clippy::missing_const_for_fn)]
    pub fn new() -> Result<Self> {
        Ok(Self {
            model_name: "all-MiniLM-L6-v2",
        })
    }

    /// Gets or initializes the embedding model (thread-safe).
    fn get_model() -> Result<&'static std::sync::Mutex<fastembed::TextEmbedding>> {
        if let Some(model) = EMBEDDING_MODEL.get() {
            return Ok(model);
        }

        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false);

        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            EmbeddingError::Provider {
                reason: format!("failed to load embedding model: {e}"),
            }
        })?;

        // Store the model, ignoring if another thread beat us to it
        let _ = EMBEDDING_MODEL.set(std::sync::Mutex::new(model));

        EMBEDDING_MODEL.get().ok_or_else(|| {
            EmbeddingError::Provider {
                reason: "model initialization race condition".to_string(),
            }
            .into()
        })
    }

    /// Returns the model name.
    #[must_use]
    pub const fn model_name(&self) -> &'static str {
        self.model_name
    }
}

impl Embedder for FastEmbedEmbedder {
    fn dimensions(&self) -> usize {
        MODEL_DIMENSIONS
    }

    fn model_name(&self) -> &'static str {
        self.model_name
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors.pop().ok_or_else(|| {
            EmbeddingError::Provider {
                reason: "no embedding returned from model".to_string(),
            }
            .into()
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Self::get_model()?;
        let mut model = model.lock().map_err(|e| EmbeddingError::Provider {
            reason: format!("failed to lock embedding model: {e}"),
        })?;

        // Wrap ONNX runtime call in catch_unwind for graceful degradation.
        // ONNX runtime can panic on malformed inputs or internal errors.
        let result = catch_unwind(AssertUnwindSafe(|| model.embed(texts, None)));

        result
            .map_err(|panic_info| {
                let panic_msg = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                crate::Error::Embedding(EmbeddingError::Provider {
                    reason: format!("ONNX runtime panic: {panic_msg}"),
                })
            })?
            .map_err(|e| {
                crate::Error::Embedding(EmbeddingError::Provider {
                    reason: format!("batch embedding failed: {e}"),
                })
            })
    }
}
