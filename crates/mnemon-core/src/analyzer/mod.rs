//! Query Analyzer
//!
//! Turns a raw query string into a [`QueryPlan`]: the query embedding, the
//! requested fact types, and an optional temporal range detected from
//! natural-language time expressions.
//!
//! The analyzer is pure given `(text, now)`: identical inputs always produce
//! the identical plan. Embeddings are cached by exact text (the [`Embedder`]
//! contract makes this sound), and temporal detection never consults the
//! wall clock - "last spring" resolves against the caller-supplied `now`.

mod temporal;

pub use temporal::detect_temporal_range;

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use lru::LruCache;

use crate::embeddings::{Embedder, EmbeddingError};
use crate::memory::{FactType, TemporalRange};

/// Capacity of the query-embedding cache
const QUERY_CACHE_CAPACITY: usize = 256;

// ============================================================================
// QUERY PLAN
// ============================================================================

/// The analyzed form of a recall query
#[derive(Debug, Clone)]
pub struct QueryPlan {
    /// The raw query text
    pub query_text: String,
    /// Dense embedding of the query
    pub query_vec: Vec<f32>,
    /// Detected temporal constraint, if any
    pub temporal_range: Option<TemporalRange>,
    /// Fact types the caller asked for
    pub fact_types: Vec<FactType>,
}

// ============================================================================
// ANALYZER
// ============================================================================

/// Query analyzer with a per-process embedding cache
pub struct QueryAnalyzer {
    embedder: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl QueryAnalyzer {
    /// Create an analyzer over an embedder
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_CAPACITY)
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            embedder,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Analyze a query into a plan.
    ///
    /// `now` anchors relative time expressions and must come from the caller,
    /// not the wall clock, so plans are reproducible.
    pub async fn analyze(
        &self,
        query_text: &str,
        fact_types: &[FactType],
        now: DateTime<Utc>,
    ) -> Result<QueryPlan, EmbeddingError> {
        let query_vec = self.embed_cached(query_text).await?;
        let temporal_range = detect_temporal_range(query_text, now);

        Ok(QueryPlan {
            query_text: query_text.to_string(),
            query_vec,
            temporal_range,
            fact_types: fact_types.to_vec(),
        })
    }

    async fn embed_cached(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(vector) = cache.get(text) {
                return Ok(vector.clone());
            }
        }

        let vector = self.embedder.embed(text).await?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(text.to_string(), vector.clone());
        }
        Ok(vector)
    }
}

// ============================================================================
// TESTS
// ============================================================================
