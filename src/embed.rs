//! Embeddings seam
//!
//! The pipeline embeds chunk text through the `Embedder` trait so
//! deployments can plug in cloud endpoints or local models. A deterministic
//! hash-based mock ships for tests; a fastembed (ONNX) backend is available
//! behind the `embeddings` feature. Dimensionality is fixed per deployment.

use async_trait::async_trait;

/// Errors from embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding returned no results")]
    EmptyResult,

    #[error("embedding model error: {0}")]
    ModelError(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding text into vectors.
///
/// Implementations must return one vector per input text, all with
/// `dimension()` components.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Fixed output dimensionality for this deployment.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per text.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Deterministic mock embedder for tests.
///
/// Hashes character trigrams into a fixed number of buckets and normalizes,
/// so identical text always embeds identically and similar text lands near
/// itself. Not semantically meaningful; stable and dependency-free.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        for window in chars.windows(3) {
            let mut h: u64 = 1469598103934665603;
            for c in window {
                h ^= *c as u64;
                h = h.wrapping_mul(1099511628211);
            }
            vector[(h % self.dimension as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Cosine similarity between two vectors of equal length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, EmbeddingError};
    use async_trait::async_trait;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Local embedder backed by fastembed (ONNX Runtime).
    ///
    /// Wraps `fastembed::TextEmbedding` in a `Mutex` because its `embed`
    /// takes `&mut self`.
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
        dimension: usize,
    }

    impl FastEmbedEmbedder {
        /// Load the default small English model (384 dimensions).
        pub fn try_default() -> Result<Self, EmbeddingError> {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::BGESmallENV15).with_show_download_progress(false),
            )
            .map_err(|e| EmbeddingError::ModelError(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(model),
                dimension: 384,
            })
        }
    }

    #[async_trait]
    impl Embedder for FastEmbedEmbedder {
        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let inputs: Vec<String> = texts.to_vec();
            let vectors = {
                let mut model = self
                    .model
                    .lock()
                    .map_err(|_| EmbeddingError::ModelError("model lock poisoned".into()))?;
                model
                    .embed(inputs, None)
                    .map_err(|e| EmbeddingError::ModelError(e.to_string()))?
            };
            if vectors.is_empty() {
                return Err(EmbeddingError::EmptyResult);
            }
            Ok(vectors)
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;
