//! HNSW Acceleration for the Reference Adapter
//!
//! USearch-backed approximate nearest neighbor index, built lazily per bank
//! from the persisted embeddings. Only compiled with the `vector-search`
//! feature; without it, `vector_topk` falls back to an exact cosine scan.

use std::collections::HashMap;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::memory::{FactId, FactType};
use crate::storage::StoreError;

/// HNSW connectivity parameter (higher = better recall, more memory)
const CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
const EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search
const EXPANSION_SEARCH: usize = 64;

/// A bank-scoped ANN index over fact embeddings.
///
/// Fact types are kept alongside the key maps so type filtering can happen
/// on the over-fetched result without another database round trip.
pub(crate) struct AnnIndex {
    index: Index,
    dimensions: usize,
    key_to_id: HashMap<FactId, u64>,
    id_to_key: HashMap<u64, FactId>,
    fact_types: HashMap<u64, FactType>,
    next_id: u64,
}

impl AnnIndex {
    /// Create an empty index for a bank's embedding dimension
    pub(crate) fn new(dimensions: usize) -> Result<Self, StoreError> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::I8,
            connectivity: CONNECTIVITY,
            expansion_add: EXPANSION_ADD,
            expansion_search: EXPANSION_SEARCH,
            multi: false,
        };

        let index = Index::new(&options)
            .map_err(|e| StoreError::Unavailable(format!("ANN index creation failed: {}", e)))?;

        Ok(Self {
            index,
            dimensions,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            fact_types: HashMap::new(),
            next_id: 0,
        })
    }

    /// Number of vectors in the index
    pub(crate) fn len(&self) -> usize {
        self.index.size()
    }

    /// Add a fact's embedding. usearch requires reserved capacity before
    /// add() to avoid segfaults, so capacity is grown here as needed.
    pub(crate) fn add(
        &mut self,
        key: &str,
        fact_type: FactType,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        if vector.len() != self.dimensions {
            return Err(StoreError::Corrupt(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }

        let current_capacity = self.index.capacity();
        let current_size = self.index.size();
        if current_size >= current_capacity {
            let new_capacity = std::cmp::max(current_capacity * 2, 16);
            self.index
                .reserve(new_capacity)
                .map_err(|e| StoreError::Unavailable(format!("ANN reserve failed: {}", e)))?;
        }

        let id = self.next_id;
        self.next_id += 1;

        self.index
            .add(id, vector)
            .map_err(|e| StoreError::Unavailable(format!("ANN add failed: {}", e)))?;

        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        self.fact_types.insert(id, fact_type);

        Ok(())
    }

    /// Search for the nearest facts of the given types.
    ///
    /// Over-fetches internally so that type filtering still yields up to
    /// `limit` results, and converts cosine distance to similarity.
    pub(crate) fn search(
        &self,
        query: &[f32],
        fact_types: &[FactType],
        limit: usize,
        min_similarity: Option<f32>,
    ) -> Result<Vec<(FactId, f32)>, StoreError> {
        if query.len() != self.dimensions {
            return Err(StoreError::InvalidArgument(format!(
                "query dimension mismatch: expected {}, got {}",
                self.dimensions,
                query.len()
            )));
        }

        if self.len() == 0 || limit == 0 {
            return Ok(vec![]);
        }

        // Over-fetch to survive the post-hoc type filter
        let fetch = (limit * 4).min(self.len()).max(limit);
        let matches = self
            .index
            .search(query, fetch)
            .map_err(|e| StoreError::Unavailable(format!("ANN search failed: {}", e)))?;

        let floor = min_similarity.unwrap_or(f32::MIN);
        let mut results = Vec::with_capacity(limit);
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            let similarity = 1.0 - distance;
            if similarity < floor {
                continue;
            }
            let type_ok = self
                .fact_types
                .get(key)
                .is_some_and(|t| fact_types.contains(t));
            if !type_ok {
                continue;
            }
            if let Some(fact_id) = self.id_to_key.get(key) {
                results.push((fact_id.clone(), similarity));
            }
            if results.len() >= limit {
                break;
            }
        }

        Ok(results)
    }
}
