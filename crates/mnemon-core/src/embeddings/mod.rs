//! Semantic Embeddings Module
//!
//! The engine treats embedding generation as an external collaborator behind
//! the [`Embedder`] trait, so tests can substitute deterministic stubs and the
//! core never depends on a specific model.
//!
//! With the `embeddings` feature enabled, [`LocalEmbedder`] and
//! [`LocalCrossEncoder`] provide fastembed-backed implementations
//! (local ONNX inference, no external API calls).

#[cfg(feature = "embeddings")]
mod local;

#[cfg(feature = "embeddings")]
pub use local::{LocalCrossEncoder, LocalEmbedder, LOCAL_EMBEDDING_DIMENSIONS};

use async_trait::async_trait;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("Model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate an embedding
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
    /// Invalid input (empty, wrong dimension, etc.)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Embedding result type
pub type Result<T> = std::result::Result<T, EmbeddingError>;

// ============================================================================
// EMBEDDER TRAIT
// ============================================================================

/// External embedding function.
///
/// Implementations must be deterministic: identical input text always yields
/// the identical vector. The query analyzer caches results by exact text on
/// top of this contract.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text into a dense vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimension of the vectors this embedder produces
    fn dimension(&self) -> usize;
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Dot product of two equal-length vectors
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 for mismatched dimensions or zero-magnitude inputs rather than
/// NaN, so callers can treat the result as a plain score.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot = dot_product(a, b);
    let norm_a = dot_product(a, a).sqrt();
    let norm_b = dot_product(b, b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

// ============================================================================
// TESTS
// ============================================================================
