//! Deterministic test doubles for the engine's external collaborators.

pub mod fixtures;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use mnemon_core::embeddings::{cosine_similarity, Embedder, EmbeddingError};
use mnemon_core::memory::{
    Entity, EntityId, EntityObservation, Fact, FactId, FactType, Link, LinkType, ObservedFact,
};
use mnemon_core::rerank::{CrossEncoder, RerankError};
use mnemon_core::storage::{Store, StoreError, VectorFilter};

// ============================================================================
// MOCK STORE
// ============================================================================

/// In-memory [`Store`] with injectable failures and latency.
///
/// Populate it before wrapping in `Arc`; after that it behaves as the
/// read-only snapshot the engine expects.
#[derive(Default)]
pub struct MockStore {
    banks: HashMap<String, usize>,
    facts: HashMap<FactId, Fact>,
    links: HashMap<FactId, Vec<Link>>,
    entities: HashMap<EntityId, Entity>,
    failing_ops: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bank(&mut self, bank_id: &str, dimension: usize) {
        self.banks.insert(bank_id.to_string(), dimension);
    }

    pub fn add_fact(&mut self, fact: Fact) {
        self.facts.insert(fact.id.clone(), fact);
    }

    pub fn add_entity(&mut self, entity: Entity) {
        self.entities.insert(entity.id.clone(), entity);
    }

    pub fn add_link(&mut self, link: Link) {
        self.links.entry(link.source_id.clone()).or_default().push(link);
    }

    /// Make one named operation fail with `StoreError::Unavailable`
    pub fn fail_operation(&self, op: &str) {
        if let Ok(mut failing) = self.failing_ops.lock() {
            failing.insert(op.to_string());
        }
    }

    /// Delay every operation, for deadline tests
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = Some(latency);
        }
    }

    /// Ids of all facts owned by a bank
    pub fn bank_fact_ids(&self, bank_id: &str) -> HashSet<FactId> {
        self.facts
            .values()
            .filter(|f| f.bank_id == bank_id)
            .map(|f| f.id.clone())
            .collect()
    }

    async fn enter(&self, op: &str) -> Result<(), StoreError> {
        let latency = self.latency.lock().ok().and_then(|slot| *slot);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failing = self
            .failing_ops
            .lock()
            .map(|ops| ops.contains(op))
            .unwrap_or(false);
        if failing {
            return Err(StoreError::Unavailable(format!("injected failure in {}", op)));
        }
        Ok(())
    }

    fn effective_time(&self, fact: &Fact, filter: &VectorFilter) -> Option<chrono::DateTime<chrono::Utc>> {
        match fact.occurred_start {
            Some(t) => Some(t),
            None if filter.fallback_to_mentioned_at => Some(fact.mentioned_at),
            None => None,
        }
    }
}

#[async_trait]
impl Store for MockStore {
    async fn bank_exists(&self, bank_id: &str) -> Result<bool, StoreError> {
        self.enter("bank_exists").await?;
        Ok(self.banks.contains_key(bank_id))
    }

    async fn embedding_dimension(&self, bank_id: &str) -> Result<usize, StoreError> {
        self.enter("embedding_dimension").await?;
        self.banks
            .get(bank_id)
            .copied()
            .ok_or_else(|| StoreError::BankNotFound(bank_id.to_string()))
    }

    async fn vector_topk(
        &self,
        bank_id: &str,
        fact_types: &[FactType],
        query_vec: &[f32],
        k: usize,
        filter: &VectorFilter,
    ) -> Result<Vec<(FactId, f32)>, StoreError> {
        self.enter("vector_topk").await?;

        let floor = filter.min_similarity.unwrap_or(f32::MIN);
        let mut scored: Vec<(FactId, f32)> = self
            .facts
            .values()
            .filter(|f| f.bank_id == bank_id && fact_types.contains(&f.fact_type))
            .filter(|f| match filter.time_range {
                Some(range) => self
                    .effective_time(f, filter)
                    .is_some_and(|t| range.contains(t)),
                None => true,
            })
            .filter_map(|f| {
                let similarity = cosine_similarity(query_vec, &f.embedding);
                (similarity >= floor).then(|| (f.id.clone(), similarity))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    async fn bm25_topk(
        &self,
        bank_id: &str,
        fact_types: &[FactType],
        query_text: &str,
        k: usize,
    ) -> Result<Vec<(FactId, f32)>, StoreError> {
        self.enter("bm25_topk").await?;

        let query_terms: HashSet<String> = tokenize(query_text);
        let mut scored: Vec<(FactId, f32)> = self
            .facts
            .values()
            .filter(|f| f.bank_id == bank_id && fact_types.contains(&f.fact_type))
            .filter_map(|f| {
                let mut haystack = f.text.clone();
                if let Some(context) = &f.context {
                    haystack.push(' ');
                    haystack.push_str(context);
                }
                let doc_terms = tokenize(&haystack);
                let hits = query_terms.intersection(&doc_terms).count();
                (hits > 0).then(|| (f.id.clone(), hits as f32))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    async fn links_from(
        &self,
        bank_id: &str,
        fact_id: &str,
        link_types: &[LinkType],
    ) -> Result<Vec<Link>, StoreError> {
        self.enter("links_from").await?;

        let in_bank = |id: &FactId| {
            self.facts
                .get(id)
                .is_some_and(|f| f.bank_id == bank_id)
        };

        let mut links: Vec<Link> = self
            .links
            .get(fact_id)
            .map(|links| {
                links
                    .iter()
                    .filter(|l| link_types.contains(&l.link_type))
                    .filter(|l| in_bank(&l.source_id) && in_bank(&l.target_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        links.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        Ok(links)
    }

    async fn fetch_facts(&self, bank_id: &str, ids: &[FactId]) -> Result<Vec<Fact>, StoreError> {
        self.enter("fetch_facts").await?;
        Ok(ids
            .iter()
            .filter_map(|id| self.facts.get(id))
            .filter(|f| f.bank_id == bank_id)
            .cloned()
            .collect())
    }

    async fn fetch_entities(
        &self,
        bank_id: &str,
        ids: &[EntityId],
    ) -> Result<Vec<Entity>, StoreError> {
        self.enter("fetch_entities").await?;
        Ok(ids
            .iter()
            .filter_map(|id| self.entities.get(id))
            .filter(|e| e.bank_id == bank_id)
            .cloned()
            .collect())
    }

    async fn entity_observations(
        &self,
        bank_id: &str,
        entity_ids: &[EntityId],
        token_cap: usize,
    ) -> Result<Vec<EntityObservation>, StoreError> {
        self.enter("entity_observations").await?;

        let mut payload = Vec::new();
        let mut tokens_used = 0usize;
        for entity_id in entity_ids {
            let Some(entity) = self.entities.get(entity_id) else {
                continue;
            };
            if entity.bank_id != bank_id {
                continue;
            }

            let mut observations: Vec<&Fact> = self
                .facts
                .values()
                .filter(|f| {
                    f.bank_id == bank_id
                        && f.fact_type == FactType::Observation
                        && f.entity_refs.contains(entity_id)
                })
                .collect();
            observations.sort_by(|a, b| {
                b.mentioned_at
                    .cmp(&a.mentioned_at)
                    .then_with(|| a.id.cmp(&b.id))
            });

            let mut kept = Vec::new();
            for fact in observations {
                let cost = fact.text.len().div_ceil(4);
                if tokens_used + cost > token_cap {
                    break;
                }
                tokens_used += cost;
                kept.push(ObservedFact {
                    fact_id: fact.id.clone(),
                    text: fact.text.clone(),
                    mentioned_at: fact.mentioned_at,
                });
            }
            if !kept.is_empty() {
                payload.push(EntityObservation {
                    entity_id: entity_id.clone(),
                    canonical_name: entity.canonical_name.clone(),
                    observations: kept,
                });
            }
        }
        Ok(payload)
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| {
            // Naive stemmer: "works" and "work" should collide
            if t.len() > 3 && t.ends_with('s') {
                t[..t.len() - 1].to_string()
            } else {
                t.to_string()
            }
        })
        .collect()
}

// ============================================================================
// STUB EMBEDDER
// ============================================================================

/// Deterministic [`Embedder`]: pinned vectors for scenario-critical texts,
/// a token-hash fallback for everything else.
pub struct StubEmbedder {
    dimension: usize,
    pinned: HashMap<String, Vec<f32>>,
}

impl StubEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            pinned: HashMap::new(),
        }
    }

    /// Pin the exact vector returned for a text
    pub fn pin(&mut self, text: &str, vector: Vec<f32>) {
        assert_eq!(vector.len(), self.dimension);
        self.pinned.insert(text.to_string(), vector);
    }

    /// Token-hash embedding: shared tokens land in shared buckets, so
    /// overlapping texts get positive cosine similarity.
    pub fn embed_text(dimension: usize, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; dimension];
        for token in tokenize(text) {
            let mut hash = 0xcbf2_9ce4_8422_2325_u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x1000_0000_01b3);
            }
            vector[(hash % dimension as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(vector) = self.pinned.get(text) {
            return Ok(vector.clone());
        }
        Ok(Self::embed_text(self.dimension, text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// STUB CROSS-ENCODERS
// ============================================================================

/// Term-overlap [`CrossEncoder`]: score = matched query terms / query terms.
pub struct StubCrossEncoder;

#[async_trait]
impl CrossEncoder for StubCrossEncoder {
    async fn score_pairs(&self, pairs: &[(String, String)]) -> Result<Vec<f32>, RerankError> {
        Ok(pairs
            .iter()
            .map(|(query, doc)| {
                let doc_terms = tokenize(doc);
                let query_terms = tokenize(query);
                if query_terms.is_empty() {
                    return 0.0;
                }
                let hits = query_terms.intersection(&doc_terms).count();
                hits as f32 / query_terms.len() as f32
            })
            .collect())
    }
}

/// A [`CrossEncoder`] that always fails, for degradation tests.
pub struct FailingCrossEncoder;

#[async_trait]
impl CrossEncoder for FailingCrossEncoder {
    async fn score_pairs(&self, _pairs: &[(String, String)]) -> Result<Vec<f32>, RerankError> {
        Err(RerankError::ScoringFailed("injected model outage".to_string()))
    }
}
