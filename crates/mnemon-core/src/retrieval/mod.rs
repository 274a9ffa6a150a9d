//! Retrieval Strategies
//!
//! Four independent producers of scored candidate lists, run concurrently by
//! the orchestrator:
//!
//! - semantic: vector similarity over the bank's embeddings
//! - lexical: BM25 over the inverted index
//! - graph: spreading activation from strong semantic hits
//! - temporal graph: the same walk constrained to a detected time range
//!
//! Every strategy owns its own state; nothing is shared across them beyond
//! the read-only store handle. A strategy that fails is degraded to an empty
//! list and recorded in the trace; the request itself only fails when all
//! strategies do.

mod graph;
mod lexical;
mod semantic;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::analyzer::QueryPlan;
use crate::config::EngineConfig;
use crate::memory::{FactId, FactType, TemporalRange};
use crate::storage::{Store, StoreError};
use crate::trace::VisitRecord;

// ============================================================================
// STRATEGY KINDS
// ============================================================================

/// The four retrieval strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StrategyKind {
    /// Vector similarity
    Semantic,
    /// BM25 keyword match
    Lexical,
    /// Spreading activation over the link graph
    Graph,
    /// Spreading activation constrained to the detected time range
    TemporalGraph,
}

impl StrategyKind {
    /// Name used in traces and fusion bookkeeping
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Semantic => "semantic",
            StrategyKind::Lexical => "lexical",
            StrategyKind::Graph => "graph",
            StrategyKind::TemporalGraph => "temporal_graph",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CANDIDATES
// ============================================================================

/// One scored candidate inside a strategy's ranked list
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The fact
    pub fact_id: FactId,
    /// Strategy-native score, non-increasing down the list
    pub score: f32,
    /// Dense rank starting at 1
    pub rank: usize,
}

/// A strategy's ranked list for one fact-type partition
#[derive(Debug, Clone)]
pub struct TypedCandidates {
    /// The partition
    pub fact_type: FactType,
    /// Candidates in rank order
    pub candidates: Vec<Candidate>,
}

/// Counters and visit log from a graph walk
#[derive(Debug, Clone, Default)]
pub struct WalkStats {
    /// Visited nodes, in visit order
    pub visits: Vec<VisitRecord>,
    /// Number of nodes visited
    pub nodes_visited: usize,
    /// Number of entry points found
    pub entry_points: usize,
}

/// Everything a strategy produced, including its failure if any
#[derive(Debug, Clone)]
pub struct StrategyReport {
    /// Which strategy
    pub kind: StrategyKind,
    /// Per-fact-type candidate lists (empty on failure)
    pub lists: Vec<TypedCandidates>,
    /// Wall-clock duration
    pub duration: Duration,
    /// Error that degraded this strategy to an empty result
    pub error: Option<String>,
    /// Graph walk statistics (empty for semantic/lexical)
    pub stats: WalkStats,
}

impl StrategyReport {
    /// A report for a strategy that did not run (e.g. temporal without a range)
    pub fn skipped(kind: StrategyKind) -> Self {
        Self {
            kind,
            lists: vec![],
            duration: Duration::ZERO,
            error: None,
            stats: WalkStats::default(),
        }
    }
}

// ============================================================================
// STRATEGY CONTEXT
// ============================================================================

/// Shared inputs cloned into each strategy task
#[derive(Clone)]
pub struct StrategyContext {
    /// Read-only store handle
    pub store: Arc<dyn Store>,
    /// The bank being queried
    pub bank_id: String,
    /// The analyzed query
    pub plan: Arc<QueryPlan>,
    /// Engine tunables
    pub config: Arc<EngineConfig>,
    /// Node budget for graph walks
    pub budget: usize,
    /// Absolute request deadline
    pub deadline: Instant,
}

// ============================================================================
// EXECUTION
// ============================================================================

/// Run one strategy to completion, converting failure into an empty report
/// with the error recorded. Never panics the request.
pub async fn run_strategy(kind: StrategyKind, ctx: StrategyContext) -> StrategyReport {
    let started = Instant::now();

    let result = match kind {
        StrategyKind::Semantic => semantic::run(&ctx)
            .await
            .map(|lists| (lists, WalkStats::default())),
        StrategyKind::Lexical => lexical::run(&ctx)
            .await
            .map(|lists| (lists, WalkStats::default())),
        StrategyKind::Graph => graph::run(&ctx, None).await,
        StrategyKind::TemporalGraph => match ctx.plan.temporal_range {
            Some(range) => graph::run(&ctx, Some(range)).await,
            None => Ok((vec![], WalkStats::default())),
        },
    };

    let duration = started.elapsed();
    match result {
        Ok((lists, stats)) => StrategyReport {
            kind,
            lists,
            duration,
            error: None,
            stats,
        },
        Err(e) => {
            tracing::warn!(
                strategy = kind.as_str(),
                bank_id = %ctx.bank_id,
                error = %e,
                "retrieval strategy degraded to empty result"
            );
            StrategyReport {
                kind,
                lists: vec![],
                duration,
                error: Some(e.to_string()),
                stats: WalkStats::default(),
            }
        }
    }
}

/// Wrap a store future with the per-call store deadline, capped by the
/// request deadline. Expiry surfaces as [`StoreError::Deadline`].
pub(crate) async fn store_call<T, F>(
    deadline: Instant,
    store_deadline: Duration,
    future: F,
) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    let slack = deadline.saturating_duration_since(Instant::now());
    if slack.is_zero() {
        return Err(StoreError::Deadline(Duration::ZERO));
    }

    let limit = slack.min(store_deadline);
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Deadline(limit)),
    }
}

/// Turn scored hits into a dense-ranked candidate list. Input order is kept
/// for equal scores, so the store's deterministic ordering carries through.
pub(crate) fn rank_scored(scored: Vec<(FactId, f32)>) -> Vec<Candidate> {
    let mut scored = scored;
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
        .into_iter()
        .enumerate()
        .map(|(index, (fact_id, score))| Candidate {
            fact_id,
            score,
            rank: index + 1,
        })
        .collect()
}

/// Which graph strategies are active for a plan, used to split the node
/// budget so their combined visits stay within it
pub(crate) fn active_graph_walks(temporal: Option<TemporalRange>) -> usize {
    if temporal.is_some() { 2 } else { 1 }
}

// ============================================================================
// TESTS
// ============================================================================
