//! Reranker
//!
//! Two-stage retrieval: the fused candidate list (high recall) is rescored
//! with a cross-encoder over `(query, decorated fact text)` pairs (high
//! precision), then blended with rank, recency and frequency signals:
//!
//! `final = 0.6 * cross_encoder + 0.25 * rrf_norm + 0.10 * recency + 0.05 * frequency`
//!
//! The cross-encoder is a process-wide singleton behind a bounded-concurrency
//! gate. When its queue is deep and the request's remaining deadline cannot
//! cover the estimated wait, the request is refused with `Overloaded` so the
//! caller can retry with jitter. When the model itself fails, reranking
//! degrades to the remaining components and records the downgrade - never
//! silently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::RerankConfig;
use crate::memory::{EntityId, Fact};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Reranker error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum RerankError {
    /// Failed to initialize the cross-encoder model
    #[error("Reranker initialization failed: {0}")]
    ModelInit(String),
    /// Cross-encoder scoring failed
    #[error("Reranking failed: {0}")]
    ScoringFailed(String),
}

/// Cross-encoder backpressure: the queue-wait estimate exceeds the request's
/// remaining deadline. Retryable with jitter.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("Cross-encoder overloaded: estimated wait {estimated_wait:?}")]
pub struct Overloaded {
    /// Estimated time until a permit frees up
    pub estimated_wait: Duration,
}

// ============================================================================
// CROSS-ENCODER TRAIT
// ============================================================================

/// External pair-scoring function.
///
/// Scores `(query, document)` pairs for relevance; the concrete model is
/// deliberately unconstrained. Implementations return one score per input
/// pair, in input order.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Score each `(query, document)` pair
    async fn score_pairs(&self, pairs: &[(String, String)]) -> Result<Vec<f32>, RerankError>;
}

// ============================================================================
// SCORES
// ============================================================================

/// The individual components of a final score, as recorded in the trace.
///
/// `cross_encoder` is `null` when the model was unavailable and the score
/// degraded to the remaining components.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreComponents {
    /// Cross-encoder relevance, absent on degraded requests
    pub cross_encoder: Option<f32>,
    /// RRF score scaled to [0, 1] across the batch
    pub rrf_norm: f32,
    /// `exp(-age_days / tau)` against the caller's `now`
    pub recency: f32,
    /// `ln(1 + mentions) / ln(1 + max_mentions)` across the batch
    pub frequency: f32,
}

/// One fused candidate entering the reranker
#[derive(Debug, Clone)]
pub struct RerankItem {
    /// The hydrated fact
    pub fact: Fact,
    /// Fused score
    pub rrf_score: f64,
    /// Rank on the fused list (1-based)
    pub rrf_rank: usize,
}

/// One rescored candidate
#[derive(Debug, Clone)]
pub struct RerankedFact {
    /// The hydrated fact
    pub fact: Fact,
    /// Rank the fact held on the fused list
    pub rrf_rank: usize,
    /// Final weighted score
    pub final_score: f32,
    /// Component breakdown
    pub components: ScoreComponents,
}

/// The reranked batch, sorted by final score descending
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    /// All scored candidates (a permutation of the reranker's input)
    pub ranked: Vec<RerankedFact>,
    /// Whether the cross-encoder was unavailable and scores degraded
    pub degraded: bool,
}

// ============================================================================
// RERANKER
// ============================================================================

/// Cross-encoder reranking service with bounded inference concurrency.
pub struct Reranker {
    cross_encoder: Arc<dyn CrossEncoder>,
    gate: Arc<Semaphore>,
    /// Waiting + running batches, for the backpressure estimate
    queue_depth: AtomicUsize,
    /// Moving average of batch scoring time, microseconds
    avg_batch_micros: AtomicU64,
    config: RerankConfig,
}

impl Reranker {
    /// Create a reranker over a cross-encoder
    pub fn new(cross_encoder: Arc<dyn CrossEncoder>, config: RerankConfig) -> Self {
        let permits = config.concurrency.max(1);
        Self {
            cross_encoder,
            gate: Arc::new(Semaphore::new(permits)),
            queue_depth: AtomicUsize::new(0),
            avg_batch_micros: AtomicU64::new(0),
            config,
        }
    }

    /// Rescore a fused batch.
    ///
    /// `mention_counts` maps entity ids to their per-bank mention counts; a
    /// fact's frequency signal is the maximum over its `entity_refs`.
    /// Errs only under backpressure; model failures degrade the scores
    /// instead of failing the request.
    pub async fn rerank(
        &self,
        query: &str,
        temporal_query: bool,
        items: Vec<RerankItem>,
        mention_counts: &HashMap<EntityId, i64>,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<RerankOutcome, Overloaded> {
        if items.is_empty() {
            return Ok(RerankOutcome {
                ranked: vec![],
                degraded: false,
            });
        }

        let pairs: Vec<(String, String)> = items
            .iter()
            .map(|item| (query.to_string(), decorate_text(&item.fact, temporal_query)))
            .collect();

        let cross_scores = self.score_with_gate(&pairs, deadline).await?;
        let degraded = cross_scores.is_none();
        if degraded {
            tracing::warn!(
                candidates = items.len(),
                "cross-encoder unavailable, reranking on rrf/recency/frequency only"
            );
        }

        let max_rrf = items
            .iter()
            .map(|item| item.rrf_score)
            .fold(0.0_f64, f64::max);
        let mentions: Vec<i64> = items
            .iter()
            .map(|item| rollup_mentions(&item.fact, mention_counts))
            .collect();
        let max_mentions = mentions.iter().copied().max().unwrap_or(0);

        let weights = self.config.weights;
        let mut ranked: Vec<RerankedFact> = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let rrf_norm = if max_rrf > 0.0 {
                    (item.rrf_score / max_rrf) as f32
                } else {
                    0.0
                };
                let recency = recency_score(
                    item.fact.mentioned_at,
                    now,
                    self.config.recency_tau_days,
                );
                let frequency = frequency_score(mentions[index], max_mentions);
                let cross_encoder = cross_scores
                    .as_ref()
                    .and_then(|scores| scores.get(index))
                    .map(|score| score.clamp(0.0, 1.0));

                let final_score = match cross_encoder {
                    Some(ce) => {
                        weights.cross_encoder * ce
                            + weights.rrf * rrf_norm
                            + weights.recency * recency
                            + weights.frequency * frequency
                    }
                    // Degraded: remaining components, renormalized so scores
                    // stay comparable in [0, 1]
                    None => {
                        let denom = weights.rrf + weights.recency + weights.frequency;
                        (weights.rrf * rrf_norm
                            + weights.recency * recency
                            + weights.frequency * frequency)
                            / denom.max(f32::EPSILON)
                    }
                };

                RerankedFact {
                    fact: item.fact,
                    rrf_rank: item.rrf_rank,
                    final_score,
                    components: ScoreComponents {
                        cross_encoder,
                        rrf_norm,
                        recency,
                        frequency,
                    },
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| a.rrf_rank.cmp(&b.rrf_rank))
                .then_with(|| a.fact.id.cmp(&b.fact.id))
        });

        Ok(RerankOutcome { ranked, degraded })
    }

    /// Run the cross-encoder behind the concurrency gate.
    ///
    /// Returns `Ok(None)` when the model could not score the batch in time -
    /// the caller degrades instead of failing. Only backpressure is an error.
    async fn score_with_gate(
        &self,
        pairs: &[(String, String)],
        deadline: Instant,
    ) -> Result<Option<Vec<f32>>, Overloaded> {
        let slack = deadline.saturating_duration_since(Instant::now());

        let depth = self.queue_depth.load(Ordering::Relaxed);
        if depth >= self.config.queue_threshold {
            let estimated_wait = self.estimate_wait(depth);
            if slack < estimated_wait {
                return Err(Overloaded { estimated_wait });
            }
        }

        self.queue_depth.fetch_add(1, Ordering::Relaxed);
        let _depth_guard = DepthGuard(&self.queue_depth);

        let Ok(permit) = tokio::time::timeout(slack, self.gate.acquire()).await else {
            return Ok(None); // no permit before the deadline - degrade
        };
        let Ok(_permit) = permit else {
            return Ok(None); // gate closed (shutdown)
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let started = Instant::now();
        let scored = tokio::time::timeout(remaining, self.cross_encoder.score_pairs(pairs)).await;
        self.record_batch_time(started.elapsed());

        match scored {
            Ok(Ok(scores)) if scores.len() == pairs.len() => Ok(Some(scores)),
            Ok(Ok(scores)) => {
                tracing::warn!(
                    expected = pairs.len(),
                    got = scores.len(),
                    "cross-encoder returned a short batch"
                );
                Ok(None)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "cross-encoder scoring failed");
                Ok(None)
            }
            Err(_) => Ok(None), // deadline expired mid-inference - degrade
        }
    }

    fn estimate_wait(&self, depth: usize) -> Duration {
        let avg = self.avg_batch_micros.load(Ordering::Relaxed);
        let batches_ahead = depth.div_ceil(self.config.concurrency.max(1)) as u64;
        Duration::from_micros(avg.saturating_mul(batches_ahead))
    }

    fn record_batch_time(&self, elapsed: Duration) {
        let sample = elapsed.as_micros().min(u64::MAX as u128) as u64;
        let old = self.avg_batch_micros.load(Ordering::Relaxed);
        let updated = if old == 0 { sample } else { (old * 3 + sample) / 4 };
        self.avg_batch_micros.store(updated, Ordering::Relaxed);
    }
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

// ============================================================================
// SCORE COMPONENTS
// ============================================================================

/// Build the cross-encoder input for a fact.
///
/// The occurrence date is prepended only for temporal queries, and the
/// context is appended when present, so the model sees what the caller
/// would consider relevant.
pub fn decorate_text(fact: &Fact, temporal_query: bool) -> String {
    let mut text = String::new();
    if temporal_query {
        if let Some(occurred) = fact.occurred_start {
            text.push_str(&format!("[Date: {}] ", occurred.format("%B %-d, %Y")));
        }
    }
    text.push_str(&fact.text);
    if let Some(context) = fact.context.as_deref() {
        if !context.is_empty() {
            text.push_str(&format!(" [Context: {}]", context));
        }
    }
    text
}

fn recency_score(mentioned_at: DateTime<Utc>, now: DateTime<Utc>, tau_days: f32) -> f32 {
    let age_days = ((now - mentioned_at).num_seconds() as f32 / 86_400.0).max(0.0);
    (-age_days / tau_days.max(f32::EPSILON)).exp()
}

fn frequency_score(mentions: i64, max_mentions: i64) -> f32 {
    if max_mentions <= 0 || mentions <= 0 {
        return 0.0;
    }
    ((1.0 + mentions as f32).ln()) / ((1.0 + max_mentions as f32).ln())
}

fn rollup_mentions(fact: &Fact, mention_counts: &HashMap<EntityId, i64>) -> i64 {
    fact.entity_refs
        .iter()
        .filter_map(|entity_id| mention_counts.get(entity_id).copied())
        .max()
        .unwrap_or(0)
}

// ============================================================================
// TOKEN-BUDGETED ASSEMBLY
// ============================================================================

/// Select the response prefix of a reranked batch under a token budget.
///
/// Walks the batch in final-score order, accumulating approximate token
/// costs, and stops before the budget would be exceeded - except that the
/// top candidate is always admitted, so a response is never empty when
/// candidates exist.
pub fn assemble_under_budget(
    ranked: &[RerankedFact],
    max_tokens: usize,
    top_k: usize,
) -> Vec<&RerankedFact> {
    let mut selected = Vec::new();
    let mut used = 0usize;

    for item in ranked {
        if selected.len() >= top_k {
            break;
        }
        let cost = item.fact.token_cost();
        if !selected.is_empty() && used + cost > max_tokens {
            break;
        }
        used += cost;
        selected.push(item);
    }

    selected
}

// ============================================================================
// TESTS
// ============================================================================
