//! Recall Trace
//!
//! A structured record of every ranking decision in a recall execution,
//! sufficient to reproduce the final ordering: per-strategy results, the
//! fused list, the reranked list with score components, and the graph
//! walk's visit log. Traces are deterministic for a fixed store snapshot,
//! plan and seed (stage durations are the only wall-clock fields).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::memory::{FactId, TemporalRange};
use crate::rerank::ScoreComponents;

// ============================================================================
// PER-STAGE RECORDS
// ============================================================================

/// The analyzed query, as the strategies saw it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceQuery {
    /// Raw query text
    pub query_text: String,
    /// Detected temporal range, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_range: Option<TemporalRange>,
    /// Whether a query embedding was produced
    pub embedding_present: bool,
}

/// One candidate inside a strategy's trace entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalTraceResult {
    /// Dense rank within the strategy (1-based)
    pub rank: usize,
    /// The fact
    pub fact_id: FactId,
    /// Its text
    pub text: String,
    /// Strategy-native score (similarity, bm25, or activation)
    pub score: f32,
}

/// One entry per strategy, recorded whether or not it produced results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalTrace {
    /// Strategy name ("semantic", "lexical", "graph", "temporal_graph")
    pub method_name: String,
    /// Wall-clock duration of the strategy
    pub duration_seconds: f64,
    /// The strategy's candidates, in rank order
    pub results: Vec<RetrievalTraceResult>,
    /// Error recorded when the strategy failed and was degraded to empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry of the fused list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RrfTraceEntry {
    /// Rank after fusion (1-based)
    pub final_rrf_rank: usize,
    /// The fact
    pub fact_id: FactId,
    /// Its text
    pub text: String,
    /// Reciprocal-rank-fusion score
    pub rrf_score: f64,
    /// Rank this fact held in each contributing strategy
    pub source_ranks: BTreeMap<String, usize>,
}

/// One entry of the reranked list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerankTraceEntry {
    /// Rank after reranking (1-based)
    pub rerank_rank: usize,
    /// Rank before reranking
    pub rrf_rank: usize,
    /// `rrf_rank - rerank_rank` (positive = promoted)
    pub rank_change: i64,
    /// The fact
    pub fact_id: FactId,
    /// Its text
    pub text: String,
    /// Final weighted score
    pub rerank_score: f32,
    /// The individual score components
    pub score_components: ScoreComponents,
}

/// One visited node of a graph walk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    /// The visited fact
    pub node_id: FactId,
    /// Path of fact ids from the entry point to this node (inclusive)
    pub activation_path: Vec<FactId>,
    /// Link weights along the path (one fewer than path entries)
    pub weights: Vec<f32>,
}

/// Aggregate counters for the request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    /// Nodes visited across the graph strategies
    pub total_nodes_visited: usize,
    /// Entry points found across the graph strategies
    pub entry_points_found: usize,
    /// Node budget consumed
    pub budget_used: usize,
    /// Node budget left unconsumed
    pub budget_remaining: usize,
    /// Results returned to the caller
    pub results_returned: usize,
    /// Wall-clock duration of the whole request
    pub total_duration_seconds: f64,
}

// ============================================================================
// TRACE
// ============================================================================

/// Full structured record of a recall execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    /// The analyzed query
    pub query: TraceQuery,
    /// One entry per strategy
    pub retrieval_results: Vec<RetrievalTrace>,
    /// The fused candidate list
    pub rrf_merged: Vec<RrfTraceEntry>,
    /// The reranked candidate list
    pub reranked: Vec<RerankTraceEntry>,
    /// Graph walk visit log, truncated to the node budget
    pub visits: Vec<VisitRecord>,
    /// Aggregate counters
    pub summary: TraceSummary,
    /// Seed used for tie-breaking, derived from (bank, query) unless supplied
    pub seed: u64,
}

// ============================================================================
// TESTS
// ============================================================================
