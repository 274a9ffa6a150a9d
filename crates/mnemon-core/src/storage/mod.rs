//! Storage Module
//!
//! The store adapter is the only component that touches the underlying
//! database. [`Store`] presents it as a set of typed, read-only operations,
//! every one scoped by bank id; cross-bank reads must fail (they return
//! nothing or an error, never another bank's data).
//!
//! [`SqliteStore`] is the reference implementation: SQLite with an FTS5
//! inverted index for BM25 and BLOB-encoded embeddings for vector search
//! (exact bank-scoped cosine scan, or HNSW via the `vector-search` feature).
//!
//! Adapters must provide point-in-time consistency for a single request;
//! long-running requests may see a stale but internally consistent snapshot.

mod migrations;
mod sqlite;

#[cfg(feature = "vector-search")]
mod ann;

pub use migrations::MIGRATIONS;
pub use sqlite::SqliteStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::memory::{
    Entity, EntityId, EntityObservation, Fact, FactId, FactType, Link, LinkType, TemporalRange,
};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Store adapter error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested bank does not exist
    #[error("Bank not found: {0}")]
    BankNotFound(String),
    /// Persistent failure of the underlying store
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// A single store call exceeded its deadline. Recoverable: strategies
    /// treat it as an empty result and record it in the trace.
    #[error("Store call exceeded deadline of {0:?}")]
    Deadline(Duration),
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// A persisted record violated a data-model invariant
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    /// Invalid argument to a store operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Store result type
pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// FILTERS
// ============================================================================

/// Filters applied inside [`Store::vector_topk`].
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorFilter {
    /// Only admit facts whose occurrence time falls in this range
    pub time_range: Option<TemporalRange>,
    /// When time-filtering, admit facts without `occurred_start` by their
    /// `mentioned_at` instead of excluding them
    pub fallback_to_mentioned_at: bool,
    /// Minimum cosine similarity for a hit
    pub min_similarity: Option<f32>,
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Typed read interface over the persisted fact graph and its indices.
///
/// All operations are read-only and must return within the adapter's
/// per-call deadline or surface [`StoreError::Deadline`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether a bank exists
    async fn bank_exists(&self, bank_id: &str) -> Result<bool>;

    /// Embedding dimension used by a bank (uniform within the bank)
    async fn embedding_dimension(&self, bank_id: &str) -> Result<usize>;

    /// k-nearest facts by cosine similarity, filtered by fact type and
    /// optionally by occurrence time. Results are ordered by similarity
    /// descending.
    async fn vector_topk(
        &self,
        bank_id: &str,
        fact_types: &[FactType],
        query_vec: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<(FactId, f32)>>;

    /// Top-k facts by BM25 over `text ∪ context`, ordered by score descending.
    async fn bm25_topk(
        &self,
        bank_id: &str,
        fact_types: &[FactType],
        query_text: &str,
        k: usize,
    ) -> Result<Vec<(FactId, f32)>>;

    /// Outgoing links of the selected types. Targets outside the bank are
    /// never returned.
    async fn links_from(
        &self,
        bank_id: &str,
        fact_id: &str,
        link_types: &[LinkType],
    ) -> Result<Vec<Link>>;

    /// Batch hydration, preserving input order. Unknown ids and ids owned by
    /// other banks are silently dropped.
    async fn fetch_facts(&self, bank_id: &str, ids: &[FactId]) -> Result<Vec<Fact>>;

    /// Batch entity hydration, preserving input order. Unknown ids and ids
    /// owned by other banks are silently dropped.
    async fn fetch_entities(&self, bank_id: &str, ids: &[EntityId]) -> Result<Vec<Entity>>;

    /// Observation facts about the given entities, newest first, truncated
    /// to an approximate token cap across the whole payload.
    async fn entity_observations(
        &self,
        bank_id: &str,
        entity_ids: &[EntityId],
        token_cap: usize,
    ) -> Result<Vec<EntityObservation>>;
}

// ============================================================================
// EMBEDDING CODEC
// ============================================================================

/// Encode an embedding as little-endian f32 bytes for BLOB storage
pub(crate) fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a little-endian f32 BLOB back into an embedding
pub(crate) fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
