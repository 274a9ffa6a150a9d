//! Local Embeddings and Cross-Encoder
//!
//! fastembed-backed implementations of the engine's external model seams:
//!
//! - [`LocalEmbedder`]: nomic-embed-text-v1.5 (ONNX, 768 dimensions)
//! - [`LocalCrossEncoder`]: Jina Reranker v1 Turbo (38M param cross-encoder)
//!
//! Both models are process-wide singletons: the first construction wins and
//! later instances share the loaded model. Model loading downloads weights on
//! first use, so call the constructors during startup, not in hot paths.

use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, RerankInitOptions, RerankerModel, TextEmbedding, TextRerank,
};

use super::{Embedder, EmbeddingError};
use crate::rerank::{CrossEncoder, RerankError};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Dimensions produced by nomic-embed-text-v1.5
pub const LOCAL_EMBEDDING_DIMENSIONS: usize = 768;

/// Maximum text length passed to the models (truncated beyond this)
const MAX_TEXT_LENGTH: usize = 8192;

// ============================================================================
// GLOBAL MODELS
// ============================================================================

static EMBEDDING_MODEL: OnceLock<std::result::Result<Mutex<TextEmbedding>, String>> =
    OnceLock::new();

static RERANK_MODEL: OnceLock<std::result::Result<Mutex<TextRerank>, String>> = OnceLock::new();

/// Get the default cache directory for fastembed models.
/// Uses MNEMON_MODEL_CACHE env var, or falls back to the platform cache dir.
fn model_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("MNEMON_MODEL_CACHE") {
        return std::path::PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "mnemon", "mnemon") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    std::path::PathBuf::from(".mnemon_model_cache")
}

fn embedding_model() -> std::result::Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL.get_or_init(|| {
        let cache_dir = model_cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create model cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(true)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("Failed to initialize nomic-embed-text-v1.5: {}", e))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {}", e))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

fn rerank_model() -> std::result::Result<std::sync::MutexGuard<'static, TextRerank>, RerankError> {
    let result = RERANK_MODEL.get_or_init(|| {
        let options = RerankInitOptions::new(RerankerModel::JINARerankerV1TurboEn)
            .with_show_download_progress(true);

        TextRerank::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("Failed to initialize Jina Reranker v1 Turbo: {}", e))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| RerankError::ModelInit(format!("Lock poisoned: {}", e))),
        Err(err) => Err(RerankError::ModelInit(err.clone())),
    }
}

// ============================================================================
// LOCAL EMBEDDER
// ============================================================================

/// fastembed-backed [`Embedder`] using nomic-embed-text-v1.5.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalEmbedder;

impl LocalEmbedder {
    /// Create the embedder. The underlying model loads lazily on first embed.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> super::Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        let truncated: String = text.chars().take(MAX_TEXT_LENGTH).collect();

        // Inference is CPU-bound; keep it off the async worker threads.
        tokio::task::spawn_blocking(move || {
            let mut model = embedding_model()?;
            let mut vectors = model
                .embed(vec![truncated], None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
            vectors
                .pop()
                .ok_or_else(|| EmbeddingError::EmbeddingFailed("empty batch result".to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::EmbeddingFailed(format!("embedding task failed: {}", e)))?
    }

    fn dimension(&self) -> usize {
        LOCAL_EMBEDDING_DIMENSIONS
    }
}

// ============================================================================
// LOCAL CROSS-ENCODER
// ============================================================================

/// fastembed-backed [`CrossEncoder`] using Jina Reranker v1 Turbo.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCrossEncoder;

impl LocalCrossEncoder {
    /// Create the cross-encoder. The underlying model loads lazily on first use.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CrossEncoder for LocalCrossEncoder {
    async fn score_pairs(
        &self,
        pairs: &[(String, String)],
    ) -> std::result::Result<Vec<f32>, RerankError> {
        if pairs.is_empty() {
            return Ok(vec![]);
        }

        // The Jina reranker scores one query against many documents. Recall
        // batches always share a single query, so split it off here.
        let query = pairs[0].0.clone();
        let documents: Vec<String> = pairs.iter().map(|(_, doc)| doc.clone()).collect();

        tokio::task::spawn_blocking(move || {
            let mut model = rerank_model()?;
            let docs: Vec<&str> = documents.iter().map(String::as_str).collect();
            let reranked = model
                .rerank(&query, &docs, false, None)
                .map_err(|e| RerankError::ScoringFailed(e.to_string()))?;

            // fastembed returns results sorted by score; restore input order.
            let mut scores = vec![0.0_f32; documents.len()];
            for item in reranked {
                if let Some(slot) = scores.get_mut(item.index) {
                    *slot = item.score;
                }
            }
            Ok(scores)
        })
        .await
        .map_err(|e| RerankError::ScoringFailed(format!("rerank task failed: {}", e)))?
    }
}
