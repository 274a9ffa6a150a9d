//! Recall Orchestrator
//!
//! [`RecallEngine`] sequences the whole retrieval pipeline:
//! analyze the query, spawn the four retrieval strategies in parallel, fuse
//! their rankings, rerank under the token budget, and assemble the response
//! (plus the trace when asked for).
//!
//! Concurrency contract: one `recall()` call spawns four cooperating tasks
//! for the strategies; fusion and reranking run on the calling task after
//! the join. Concurrent `recall()` calls share nothing mutable beyond the
//! read-only store handle and the gated cross-encoder, so no locks guard the
//! hot path - all in-request state (activation maps, candidate lists, trace)
//! is task-local.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyzer::{QueryAnalyzer, QueryPlan};
use crate::config::EngineConfig;
use crate::embeddings::{Embedder, EmbeddingError};
use crate::fusion::{fuse, FusedCandidate, FusionInput};
use crate::memory::{EntityId, Fact, FactId, FactType};
use crate::rerank::{
    assemble_under_budget, CrossEncoder, Reranker, RerankItem, RerankOutcome,
};
use crate::retrieval::{
    active_graph_walks, run_strategy, store_call, StrategyContext, StrategyKind, StrategyReport,
    WalkStats,
};
use crate::storage::Store;
use crate::trace::{
    RerankTraceEntry, RetrievalTrace, RetrievalTraceResult, RrfTraceEntry, Trace, TraceQuery,
    TraceSummary,
};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Errors surfaced by [`RecallEngine::recall`].
///
/// Messages carry the bank id and request id but never fact text.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RecallError {
    /// The bank does not exist. Non-retryable.
    #[error("Bank not found: {bank_id} (request {request_id})")]
    BankNotFound {
        /// The unknown bank
        bank_id: String,
        /// Request id for correlation
        request_id: String,
    },
    /// Persistent store failure. The caller may retry.
    #[error("Store unavailable for bank {bank_id} (request {request_id}): {reason}")]
    StoreUnavailable {
        /// The bank being queried
        bank_id: String,
        /// Request id for correlation
        request_id: String,
        /// Underlying failure
        reason: String,
    },
    /// Embedding service failure. Fatal for the request.
    #[error("Embedding failed for bank {bank_id} (request {request_id})")]
    EmbeddingFailed {
        /// The bank being queried
        bank_id: String,
        /// Request id for correlation
        request_id: String,
        /// Underlying failure
        #[source]
        source: EmbeddingError,
    },
    /// The request deadline expired before any candidate list was produced.
    #[error("Deadline exceeded for bank {bank_id} (request {request_id})")]
    DeadlineExceeded {
        /// The bank being queried
        bank_id: String,
        /// Request id for correlation
        request_id: String,
    },
    /// Cross-encoder backpressure. Retryable with jitter.
    #[error(
        "Overloaded for bank {bank_id} (request {request_id}): estimated wait {estimated_wait:?}"
    )]
    Overloaded {
        /// The bank being queried
        bank_id: String,
        /// Request id for correlation
        request_id: String,
        /// Estimated queue wait at refusal time
        estimated_wait: Duration,
    },
    /// Malformed request. Non-retryable.
    #[error("Invalid query for bank {bank_id} (request {request_id}): {reason}")]
    InvalidQuery {
        /// The bank being queried
        bank_id: String,
        /// Request id for correlation
        request_id: String,
        /// What was wrong
        reason: String,
    },
}

/// Recall result type
pub type Result<T> = std::result::Result<T, RecallError>;

// ============================================================================
// OPTIONS
// ============================================================================

/// Node budget for the graph strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Budget {
    /// 100 nodes
    Low,
    /// 300 nodes
    #[default]
    Mid,
    /// 600 nodes
    High,
}

impl Budget {
    /// Maximum number of facts the graph strategies may visit
    pub fn nodes(&self) -> usize {
        match self {
            Budget::Low => 100,
            Budget::Mid => 300,
            Budget::High => 600,
        }
    }
}

/// Options for a recall request
#[derive(Debug, Clone)]
pub struct RecallOptions {
    /// Fact types to retrieve (default: all)
    pub fact_types: Option<Vec<FactType>>,
    /// Graph node budget
    pub budget: Budget,
    /// Post-rerank result cap
    pub top_k: usize,
    /// Token budget for the response
    pub max_tokens: usize,
    /// Whether to record a trace
    pub trace: bool,
    /// Anchor for relative time expressions and recency (default: wall clock)
    pub now: Option<DateTime<Utc>>,
    /// Request deadline
    pub deadline: Duration,
    /// Tie-break seed (default: derived from bank id and query text)
    pub seed: Option<u64>,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            fact_types: None,
            budget: Budget::default(),
            top_k: 10,
            max_tokens: 4096,
            trace: false,
            now: None,
            deadline: Duration::from_secs(2),
            seed: None,
        }
    }
}

// ============================================================================
// RESPONSE
// ============================================================================

/// One fact returned to the caller. Embeddings are never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResult {
    /// The fact
    pub fact_id: FactId,
    /// Its text
    pub text: String,
    /// Its kind
    pub fact_type: FactType,
    /// Free-text context, when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Occurrence start, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurred_start: Option<DateTime<Utc>>,
    /// Occurrence end, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurred_end: Option<DateTime<Utc>>,
    /// Ingestion time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentioned_at: Option<DateTime<Utc>>,
    /// Entities the fact mentions
    pub entity_refs: Vec<EntityId>,
    /// Final weighted score
    pub final_score: f32,
}

/// The response of a recall request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallResponse {
    /// Request id, echoed in logs and error messages
    pub request_id: String,
    /// Results in final-score order, at most `top_k`
    pub results: Vec<RecallResult>,
    /// The trace, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
}

// ============================================================================
// SEED DERIVATION
// ============================================================================

/// Derive the default tie-break seed from `(bank_id, query_text)`.
/// FNV-1a, so the same request always reproduces the same trace.
pub fn derive_seed(bank_id: &str, query_text: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x1000_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in bank_id
        .bytes()
        .chain(std::iter::once(0x1f_u8))
        .chain(query_text.bytes())
    {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

// ============================================================================
// ENGINE
// ============================================================================

/// The memory retrieval engine.
///
/// Holds the shared collaborators: the read-only store adapter, the embedding
/// function (cached, behind the analyzer), and the gated cross-encoder.
/// Cheap to share behind `Arc`; every `recall()` call is independent.
pub struct RecallEngine {
    store: Arc<dyn Store>,
    analyzer: QueryAnalyzer,
    reranker: Reranker,
    config: Arc<EngineConfig>,
}

impl RecallEngine {
    /// Create an engine with default configuration
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        cross_encoder: Arc<dyn CrossEncoder>,
    ) -> Self {
        Self::with_config(store, embedder, cross_encoder, EngineConfig::default())
    }

    /// Create an engine with explicit configuration
    pub fn with_config(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        cross_encoder: Arc<dyn CrossEncoder>,
        config: EngineConfig,
    ) -> Self {
        let reranker = Reranker::new(cross_encoder, config.rerank);
        Self {
            store,
            analyzer: QueryAnalyzer::new(embedder),
            reranker,
            config: Arc::new(config),
        }
    }

    /// Run a recall request against a bank.
    ///
    /// Successful responses always carry `results` (possibly empty); errors
    /// are reported by kind per [`RecallError`].
    pub async fn recall(
        &self,
        bank_id: &str,
        query: &str,
        options: RecallOptions,
    ) -> Result<RecallResponse> {
        let request_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let deadline = started + options.deadline;

        self.validate(bank_id, query, &options, &request_id)?;

        match store_call(
            deadline,
            self.config.store_deadline,
            self.store.bank_exists(bank_id),
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => {
                return Err(RecallError::BankNotFound {
                    bank_id: bank_id.to_string(),
                    request_id,
                });
            }
            // A slow store that burns the whole request deadline before any
            // candidate list exists is a deadline failure, not an outage
            Err(_) if Instant::now() >= deadline => {
                return Err(RecallError::DeadlineExceeded {
                    bank_id: bank_id.to_string(),
                    request_id,
                });
            }
            Err(e) => {
                return Err(RecallError::StoreUnavailable {
                    bank_id: bank_id.to_string(),
                    request_id,
                    reason: e.to_string(),
                });
            }
        }

        let now = options.now.unwrap_or_else(Utc::now);
        let seed = options
            .seed
            .unwrap_or_else(|| derive_seed(bank_id, query));
        let fact_types = match &options.fact_types {
            Some(types) if !types.is_empty() => types.clone(),
            _ => FactType::ALL.to_vec(),
        };

        let dimension = store_call(
            deadline,
            self.config.store_deadline,
            self.store.embedding_dimension(bank_id),
        )
        .await
        .map_err(|e| {
            if Instant::now() >= deadline {
                RecallError::DeadlineExceeded {
                    bank_id: bank_id.to_string(),
                    request_id: request_id.clone(),
                }
            } else {
                RecallError::StoreUnavailable {
                    bank_id: bank_id.to_string(),
                    request_id: request_id.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let plan = self
            .analyzer
            .analyze(query, &fact_types, now)
            .await
            .map_err(|source| RecallError::EmbeddingFailed {
                bank_id: bank_id.to_string(),
                request_id: request_id.clone(),
                source,
            })?;
        if plan.query_vec.len() != dimension {
            return Err(RecallError::EmbeddingFailed {
                bank_id: bank_id.to_string(),
                request_id,
                source: EmbeddingError::InvalidInput(format!(
                    "query embedding has {} dimensions, bank uses {}",
                    plan.query_vec.len(),
                    dimension
                )),
            });
        }
        let plan = Arc::new(plan);

        tracing::debug!(
            bank_id,
            request_id = %request_id,
            temporal = plan.temporal_range.is_some(),
            fact_types = plan.fact_types.len(),
            "query analyzed"
        );

        let reports = self
            .run_strategies(bank_id, &plan, options.budget.nodes(), deadline)
            .await;

        let temporal_active = plan.temporal_range.is_some();
        let all_failed = reports
            .iter()
            .filter(|r| temporal_active || r.kind != StrategyKind::TemporalGraph)
            .all(|r| r.error.is_some());
        let any_candidates = reports
            .iter()
            .any(|r| r.lists.iter().any(|l| !l.candidates.is_empty()));
        if all_failed && !any_candidates {
            return Err(if Instant::now() >= deadline {
                RecallError::DeadlineExceeded {
                    bank_id: bank_id.to_string(),
                    request_id,
                }
            } else {
                let reason = reports
                    .iter()
                    .find_map(|r| r.error.clone())
                    .unwrap_or_else(|| "all retrieval strategies failed".to_string());
                RecallError::StoreUnavailable {
                    bank_id: bank_id.to_string(),
                    request_id,
                    reason,
                }
            });
        }

        let inputs: Vec<FusionInput> = reports
            .iter()
            .flat_map(|report| {
                report.lists.iter().map(|list| FusionInput {
                    strategy: report.kind,
                    candidates: list.candidates.clone(),
                })
            })
            .collect();
        let fused = fuse(&inputs, self.config.rrf_k, self.config.k_fuse);

        let fact_map = self
            .hydrate(bank_id, &request_id, &reports, &fused, deadline)
            .await?;
        let mention_counts = self
            .mention_counts(bank_id, &fused, &fact_map, deadline)
            .await;

        let items: Vec<RerankItem> = fused
            .iter()
            .enumerate()
            .filter_map(|(index, candidate)| {
                fact_map.get(&candidate.fact_id).map(|fact| RerankItem {
                    fact: fact.clone(),
                    rrf_score: candidate.rrf_score,
                    rrf_rank: index + 1,
                })
            })
            .collect();

        let outcome = self
            .reranker
            .rerank(query, temporal_active, items, &mention_counts, now, deadline)
            .await
            .map_err(|overloaded| RecallError::Overloaded {
                bank_id: bank_id.to_string(),
                request_id: request_id.clone(),
                estimated_wait: overloaded.estimated_wait,
            })?;

        let selected = assemble_under_budget(&outcome.ranked, options.max_tokens, options.top_k);
        let results: Vec<RecallResult> = selected
            .iter()
            .map(|item| RecallResult {
                fact_id: item.fact.id.clone(),
                text: item.fact.text.clone(),
                fact_type: item.fact.fact_type,
                context: item.fact.context.clone(),
                occurred_start: item.fact.occurred_start,
                occurred_end: item.fact.occurred_end,
                mentioned_at: Some(item.fact.mentioned_at),
                entity_refs: item.fact.entity_refs.clone(),
                final_score: item.final_score,
            })
            .collect();

        let trace = options.trace.then(|| {
            build_trace(
                &plan,
                &reports,
                &fused,
                &outcome,
                &fact_map,
                options.budget.nodes(),
                results.len(),
                started,
                seed,
            )
        });

        tracing::info!(
            bank_id,
            request_id = %request_id,
            results = results.len(),
            fused = fused.len(),
            degraded = outcome.degraded,
            duration_ms = started.elapsed().as_millis() as u64,
            "recall complete"
        );

        Ok(RecallResponse {
            request_id,
            results,
            trace,
        })
    }

    fn validate(
        &self,
        bank_id: &str,
        query: &str,
        options: &RecallOptions,
        request_id: &str,
    ) -> Result<()> {
        let reason = if query.trim().is_empty() {
            Some("empty query text")
        } else if options.max_tokens == 0 {
            Some("max_tokens must be positive")
        } else if options.top_k == 0 {
            Some("top_k must be positive")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(RecallError::InvalidQuery {
                bank_id: bank_id.to_string(),
                request_id: request_id.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Spawn the strategies as independent tasks and join them, converting
    /// panics and join failures into degraded reports.
    async fn run_strategies(
        &self,
        bank_id: &str,
        plan: &Arc<QueryPlan>,
        budget: usize,
        deadline: Instant,
    ) -> Vec<StrategyReport> {
        let temporal_active = plan.temporal_range.is_some();
        // The node budget is shared across the active graph walks so their
        // combined visits never exceed it.
        let walk_budget = budget / active_graph_walks(plan.temporal_range);

        let mut kinds = vec![
            StrategyKind::Semantic,
            StrategyKind::Lexical,
            StrategyKind::Graph,
        ];
        if temporal_active {
            kinds.push(StrategyKind::TemporalGraph);
        }

        let mut handles = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let ctx = StrategyContext {
                store: Arc::clone(&self.store),
                bank_id: bank_id.to_string(),
                plan: Arc::clone(plan),
                config: Arc::clone(&self.config),
                budget: walk_budget,
                deadline,
            };
            handles.push((kind, tokio::spawn(run_strategy(kind, ctx))));
        }

        let mut reports = Vec::with_capacity(4);
        for (kind, handle) in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(join_error) => reports.push(StrategyReport {
                    kind,
                    lists: vec![],
                    duration: Duration::ZERO,
                    error: Some(format!("strategy task failed: {}", join_error)),
                    stats: WalkStats::default(),
                }),
            }
        }
        if !temporal_active {
            reports.push(StrategyReport::skipped(StrategyKind::TemporalGraph));
        }
        reports.sort_by_key(|r| r.kind);
        reports
    }

    /// Batch-hydrate every fact cited by the strategies or the fused list
    async fn hydrate(
        &self,
        bank_id: &str,
        request_id: &str,
        reports: &[StrategyReport],
        fused: &[FusedCandidate],
        deadline: Instant,
    ) -> Result<HashMap<FactId, Fact>> {
        let mut seen: HashSet<&FactId> = HashSet::new();
        let mut ids: Vec<FactId> = Vec::new();
        for candidate in fused {
            if seen.insert(&candidate.fact_id) {
                ids.push(candidate.fact_id.clone());
            }
        }
        for report in reports {
            for list in &report.lists {
                for candidate in &list.candidates {
                    if seen.insert(&candidate.fact_id) {
                        ids.push(candidate.fact_id.clone());
                    }
                }
            }
        }

        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let facts = store_call(
            deadline,
            self.config.store_deadline,
            self.store.fetch_facts(bank_id, &ids),
        )
        .await
        .map_err(|e| RecallError::StoreUnavailable {
            bank_id: bank_id.to_string(),
            request_id: request_id.to_string(),
            reason: e.to_string(),
        })?;

        Ok(facts.into_iter().map(|f| (f.id.clone(), f)).collect())
    }

    /// Per-bank entity mention counts for the fused batch. Failure degrades
    /// the frequency signal to zero rather than failing the request.
    async fn mention_counts(
        &self,
        bank_id: &str,
        fused: &[FusedCandidate],
        fact_map: &HashMap<FactId, Fact>,
        deadline: Instant,
    ) -> HashMap<EntityId, i64> {
        let mut seen: HashSet<&EntityId> = HashSet::new();
        let mut entity_ids: Vec<EntityId> = Vec::new();
        for candidate in fused {
            if let Some(fact) = fact_map.get(&candidate.fact_id) {
                for entity_id in &fact.entity_refs {
                    if seen.insert(entity_id) {
                        entity_ids.push(entity_id.clone());
                    }
                }
            }
        }

        if entity_ids.is_empty() {
            return HashMap::new();
        }

        match store_call(
            deadline,
            self.config.store_deadline,
            self.store.fetch_entities(bank_id, &entity_ids),
        )
        .await
        {
            Ok(entities) => entities
                .into_iter()
                .map(|e| (e.id, e.mention_count))
                .collect(),
            Err(e) => {
                tracing::warn!(
                    bank_id,
                    error = %e,
                    "entity hydration failed, frequency signal degraded to zero"
                );
                HashMap::new()
            }
        }
    }
}

// ============================================================================
// TRACE ASSEMBLY
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn build_trace(
    plan: &QueryPlan,
    reports: &[StrategyReport],
    fused: &[FusedCandidate],
    outcome: &RerankOutcome,
    fact_map: &HashMap<FactId, Fact>,
    budget: usize,
    results_returned: usize,
    started: Instant,
    seed: u64,
) -> Trace {
    let text_of = |fact_id: &FactId| -> String {
        fact_map
            .get(fact_id)
            .map(|f| f.text.clone())
            .unwrap_or_default()
    };

    let retrieval_results = reports
        .iter()
        .map(|report| RetrievalTrace {
            method_name: report.kind.as_str().to_string(),
            duration_seconds: report.duration.as_secs_f64(),
            results: report
                .lists
                .iter()
                .flat_map(|list| list.candidates.iter())
                .map(|candidate| RetrievalTraceResult {
                    rank: candidate.rank,
                    fact_id: candidate.fact_id.clone(),
                    text: text_of(&candidate.fact_id),
                    score: candidate.score,
                })
                .collect(),
            error: report.error.clone(),
        })
        .collect();

    let rrf_merged = fused
        .iter()
        .enumerate()
        .map(|(index, candidate)| RrfTraceEntry {
            final_rrf_rank: index + 1,
            fact_id: candidate.fact_id.clone(),
            text: text_of(&candidate.fact_id),
            rrf_score: candidate.rrf_score,
            source_ranks: candidate.source_ranks.clone(),
        })
        .collect();

    let reranked = outcome
        .ranked
        .iter()
        .enumerate()
        .map(|(index, item)| RerankTraceEntry {
            rerank_rank: index + 1,
            rrf_rank: item.rrf_rank,
            rank_change: item.rrf_rank as i64 - (index + 1) as i64,
            fact_id: item.fact.id.clone(),
            text: item.fact.text.clone(),
            rerank_score: item.final_score,
            score_components: item.components,
        })
        .collect();

    let mut visits = Vec::new();
    let mut total_nodes_visited = 0;
    let mut entry_points_found = 0;
    for report in reports {
        total_nodes_visited += report.stats.nodes_visited;
        entry_points_found += report.stats.entry_points;
        visits.extend(report.stats.visits.iter().cloned());
    }
    visits.truncate(budget);

    Trace {
        query: TraceQuery {
            query_text: plan.query_text.clone(),
            temporal_range: plan.temporal_range,
            embedding_present: !plan.query_vec.is_empty(),
        },
        retrieval_results,
        rrf_merged,
        reranked,
        visits,
        summary: TraceSummary {
            total_nodes_visited,
            entry_points_found,
            budget_used: total_nodes_visited,
            budget_remaining: budget.saturating_sub(total_nodes_visited),
            results_returned,
            total_duration_seconds: started.elapsed().as_secs_f64(),
        },
        seed,
    }
}

// ============================================================================
// TESTS
// ============================================================================
