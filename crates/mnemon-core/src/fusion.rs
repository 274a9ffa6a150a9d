//! Rank Fusion (Reciprocal Rank Fusion)
//!
//! Merges the strategies' ranked lists with the RRF formula:
//! `score(fact) = sum over lists of 1 / (k + rank(fact))`, k = 60.
//!
//! RRF is effective because it normalizes across incomparable scoring scales
//! (cosine similarity, bm25, activation) and rewards facts that appear in
//! several lists. When multiple fact types are requested, every strategy
//! contributes one list per type, and fusion unifies across both dimensions -
//! a world fact and a bank fact compete on the same merged list.

use std::collections::BTreeMap;

use crate::memory::FactId;
use crate::retrieval::{Candidate, StrategyKind};

// ============================================================================
// TYPES
// ============================================================================

/// One ranked list entering fusion
#[derive(Debug, Clone)]
pub struct FusionInput {
    /// The strategy that produced the list
    pub strategy: StrategyKind,
    /// Candidates in rank order
    pub candidates: Vec<Candidate>,
}

/// One fact on the merged list
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    /// The fact
    pub fact_id: FactId,
    /// Sum of reciprocal ranks across contributing lists
    pub rrf_score: f64,
    /// Best rank this fact held per strategy
    pub source_ranks: BTreeMap<String, usize>,
    /// Lowest rank among contributing lists, used as a tie-break
    pub min_rank: usize,
}

// ============================================================================
// FUSION
// ============================================================================

/// Fuse ranked lists into a single list capped at `cap`.
///
/// Facts missing from a list contribute nothing for it. Ties break on the
/// lowest minimum source rank, then on fact id, so the merge is fully
/// deterministic for a fixed set of inputs.
pub fn fuse(inputs: &[FusionInput], k_rrf: f64, cap: usize) -> Vec<FusedCandidate> {
    struct Accumulator {
        rrf: f64,
        source_ranks: BTreeMap<String, usize>,
        min_rank: usize,
    }

    let mut merged: BTreeMap<&FactId, Accumulator> = BTreeMap::new();

    for input in inputs {
        let strategy = input.strategy.as_str();
        for candidate in &input.candidates {
            let entry = merged.entry(&candidate.fact_id).or_insert_with(|| Accumulator {
                rrf: 0.0,
                source_ranks: BTreeMap::new(),
                min_rank: usize::MAX,
            });
            entry.rrf += 1.0 / (k_rrf + candidate.rank as f64);
            entry.min_rank = entry.min_rank.min(candidate.rank);
            entry
                .source_ranks
                .entry(strategy.to_string())
                .and_modify(|rank| *rank = (*rank).min(candidate.rank))
                .or_insert(candidate.rank);
        }
    }

    let mut fused: Vec<FusedCandidate> = merged
        .into_iter()
        .map(|(fact_id, acc)| FusedCandidate {
            fact_id: fact_id.clone(),
            rrf_score: acc.rrf,
            source_ranks: acc.source_ranks,
            min_rank: acc.min_rank,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.rrf_score
            .total_cmp(&a.rrf_score)
            .then_with(|| a.min_rank.cmp(&b.min_rank))
            .then_with(|| a.fact_id.cmp(&b.fact_id))
    });
    fused.truncate(cap);
    fused
}

// ============================================================================
// TESTS
// ============================================================================
