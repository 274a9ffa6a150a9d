//! The engine's quantified guarantees, exercised against the mock
//! collaborators with a shared two-bank corpus.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mnemon_core::memory::LinkType;
use mnemon_core::{Budget, RecallEngine, RecallOptions, Trace};
use mnemon_e2e_tests::mocks::fixtures::{
    at, basis, chain_store, make_entity, make_fact, make_link, toward_query, DIM,
};
use mnemon_e2e_tests::mocks::{FailingCrossEncoder, MockStore, StubCrossEncoder, StubEmbedder};

const QUERY: &str = "What is Alice up to?";
const TEMPORAL_QUERY: &str = "What did Alice do last spring?";

/// Two banks with overlapping content, entities and links
fn corpus() -> MockStore {
    let mut store = MockStore::new();

    for bank in ["bank-a", "bank-b"] {
        let prefix = if bank == "bank-a" { "a" } else { "b" };
        store.add_bank(bank, DIM);

        let mut f1 = make_fact(bank, &format!("{prefix}1"), "Alice works at Google", toward_query(0.9, 1));
        f1.entity_refs = vec![format!("{prefix}-google")];
        store.add_fact(f1);

        let mut f2 = make_fact(
            bank,
            &format!("{prefix}2"),
            "Google is in Mountain View",
            toward_query(0.2, 2),
        );
        f2.entity_refs = vec![format!("{prefix}-google")];
        store.add_fact(f2);

        let mut f3 = make_fact(bank, &format!("{prefix}3"), "Alice likes hiking", toward_query(0.6, 3));
        f3.entity_refs = vec![format!("{prefix}-alice")];
        f3.context = Some("mentioned during onboarding".to_string());
        store.add_fact(f3);

        let mut f4 = make_fact(bank, &format!("{prefix}4"), "Alice joined Google", toward_query(0.5, 4));
        f4.occurred_start = Some(at(2023, 1, 10));
        f4.occurred_end = Some(at(2023, 1, 10));
        store.add_fact(f4);

        let mut f5 = make_fact(
            bank,
            &format!("{prefix}5"),
            "Alice started learning Rust",
            toward_query(0.7, 5),
        );
        f5.occurred_start = Some(at(2024, 4, 15));
        f5.occurred_end = Some(at(2024, 4, 15));
        store.add_fact(f5);

        store.add_entity(make_entity(bank, &format!("{prefix}-google"), "Google", 3));
        store.add_entity(make_entity(bank, &format!("{prefix}-alice"), "Alice", 5));
        store.add_link(make_link(
            &format!("{prefix}1"),
            &format!("{prefix}2"),
            LinkType::Entity,
            0.9,
        ));
        store.add_link(make_link(
            &format!("{prefix}1"),
            &format!("{prefix}3"),
            LinkType::Semantic,
            0.8,
        ));
    }
    store
}

fn embedder_for(queries: &[&str]) -> StubEmbedder {
    let mut embedder = StubEmbedder::new(DIM);
    for query in queries {
        embedder.pin(query, basis(0));
    }
    embedder
}

fn engine_over(store: Arc<MockStore>) -> RecallEngine {
    RecallEngine::new(
        store,
        Arc::new(embedder_for(&[QUERY, TEMPORAL_QUERY])),
        Arc::new(StubCrossEncoder),
    )
}

fn fixed_options() -> RecallOptions {
    RecallOptions {
        trace: true,
        now: Some(at(2024, 11, 25)),
        seed: Some(42),
        ..Default::default()
    }
}

fn zero_durations(trace: &mut Trace) {
    for retrieval in &mut trace.retrieval_results {
        retrieval.duration_seconds = 0.0;
    }
    trace.summary.total_duration_seconds = 0.0;
}

/// P1: every returned fact belongs to the requested bank.
#[tokio::test]
async fn bank_isolation() {
    let store = Arc::new(corpus());
    let engine = engine_over(Arc::clone(&store));

    let owned = store.bank_fact_ids("bank-a");
    let response = engine.recall("bank-a", QUERY, fixed_options()).await.unwrap();

    assert!(!response.results.is_empty());
    for result in &response.results {
        assert!(owned.contains(&result.fact_id), "foreign fact {}", result.fact_id);
    }
}

/// P2: results are non-increasing in final score.
#[tokio::test]
async fn score_monotonicity() {
    let response = engine_over(Arc::new(corpus()))
        .recall("bank-a", QUERY, fixed_options())
        .await
        .unwrap();

    for pair in response.results.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }
}

/// P3: fixed (bank, query, now, seed) over a fixed snapshot reproduces
/// byte-identical results and trace (modulo wall-clock durations).
#[tokio::test]
async fn determinism() {
    let engine = engine_over(Arc::new(corpus()));

    let mut first = engine.recall("bank-a", QUERY, fixed_options()).await.unwrap();
    let mut second = engine.recall("bank-a", QUERY, fixed_options()).await.unwrap();

    let results_a = serde_json::to_string(&first.results).unwrap();
    let results_b = serde_json::to_string(&second.results).unwrap();
    assert_eq!(results_a, results_b);

    let mut trace_a = first.trace.take().unwrap();
    let mut trace_b = second.trace.take().unwrap();
    zero_durations(&mut trace_a);
    zero_durations(&mut trace_b);
    assert_eq!(
        serde_json::to_string(&trace_a).unwrap(),
        serde_json::to_string(&trace_b).unwrap()
    );
}

/// P4: the graph walk never visits more nodes than the budget.
#[tokio::test]
async fn budget_respect() {
    let mut embedder = StubEmbedder::new(DIM);
    embedder.pin("walk the chain", basis(0));
    let engine = RecallEngine::new(
        Arc::new(chain_store(400)),
        Arc::new(embedder),
        Arc::new(StubCrossEncoder),
    );

    for budget in [Budget::Low, Budget::Mid, Budget::High] {
        let response = engine
            .recall(
                "b",
                "walk the chain",
                RecallOptions {
                    budget,
                    trace: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let trace = response.trace.unwrap();
        assert!(trace.summary.total_nodes_visited <= budget.nodes());
        assert_eq!(
            trace.summary.budget_remaining,
            budget.nodes() - trace.summary.budget_used
        );
    }
}

/// P5: the token costs of the response stay within `max_tokens`, except for
/// the single-fact override.
#[tokio::test]
async fn token_budget_respect() {
    let max_tokens = 60;
    let response = engine_over(Arc::new(corpus()))
        .recall(
            "bank-a",
            QUERY,
            RecallOptions {
                max_tokens,
                ..fixed_options()
            },
        )
        .await
        .unwrap();

    let total: usize = response
        .results
        .iter()
        .map(|r| {
            r.text.len().div_ceil(4) + r.context.as_deref().map_or(0, |c| c.len().div_ceil(4))
        })
        .sum();
    assert!(total <= max_tokens || response.results.len() == 1);
}

/// P6: every fused fact carries at least one source rank.
#[tokio::test]
async fn fusion_coverage() {
    let response = engine_over(Arc::new(corpus()))
        .recall("bank-a", QUERY, fixed_options())
        .await
        .unwrap();

    let trace = response.trace.unwrap();
    assert!(!trace.rrf_merged.is_empty());
    for entry in &trace.rrf_merged {
        assert!(!entry.source_ranks.is_empty());
    }
}

/// P7: the reranked list is a permutation of a prefix of the fused list,
/// with consistent rank_change bookkeeping.
#[tokio::test]
async fn rerank_permutation() {
    let response = engine_over(Arc::new(corpus()))
        .recall("bank-a", QUERY, fixed_options())
        .await
        .unwrap();

    let trace = response.trace.unwrap();
    let mut fused_ids: Vec<&str> = trace
        .rrf_merged
        .iter()
        .take(trace.reranked.len())
        .map(|e| e.fact_id.as_str())
        .collect();
    let mut reranked_ids: Vec<&str> = trace.reranked.iter().map(|e| e.fact_id.as_str()).collect();
    fused_ids.sort_unstable();
    reranked_ids.sort_unstable();
    assert_eq!(fused_ids, reranked_ids);

    for entry in &trace.reranked {
        assert_eq!(
            entry.rank_change,
            entry.rrf_rank as i64 - entry.rerank_rank as i64
        );
    }
}

/// P8: every fact the temporal strategy contributed lies inside the range.
#[tokio::test]
async fn temporal_soundness() {
    let store = Arc::new(corpus());
    let mut occurred: HashMap<String, DateTime<Utc>> = HashMap::new();
    occurred.insert("a4".to_string(), at(2023, 1, 10));
    occurred.insert("a5".to_string(), at(2024, 4, 15));

    let response = engine_over(store)
        .recall("bank-a", TEMPORAL_QUERY, fixed_options())
        .await
        .unwrap();

    let trace = response.trace.unwrap();
    let range = trace.query.temporal_range.unwrap();
    let temporal = trace
        .retrieval_results
        .iter()
        .find(|r| r.method_name == "temporal_graph")
        .unwrap();

    assert!(temporal.results.iter().any(|r| r.fact_id == "a5"));
    for result in &temporal.results {
        // Facts without occurred_start fell back to mentioned_at
        // (2024-11-01), which is outside last spring, so they must be absent
        let effective = occurred
            .get(&result.fact_id)
            .copied()
            .unwrap_or_else(|| at(2024, 11, 1));
        assert!(range.contains(effective), "{} out of range", result.fact_id);
    }
}

/// P9: a single failing strategy degrades to an empty list in the trace
/// while the request still succeeds.
#[tokio::test]
async fn graceful_degradation_per_strategy() {
    // Lexical outage
    let store = Arc::new(corpus());
    store.fail_operation("bm25_topk");
    let response = engine_over(Arc::clone(&store))
        .recall("bank-a", QUERY, fixed_options())
        .await
        .unwrap();
    assert!(!response.results.is_empty());
    let trace = response.trace.unwrap();
    let lexical = trace
        .retrieval_results
        .iter()
        .find(|r| r.method_name == "lexical")
        .unwrap();
    assert!(lexical.error.is_some());
    assert!(lexical.results.is_empty());

    // Vector outage kills semantic and both graph walks; lexical carries on
    let store = Arc::new(corpus());
    store.fail_operation("vector_topk");
    let response = engine_over(Arc::clone(&store))
        .recall("bank-a", QUERY, fixed_options())
        .await
        .unwrap();
    assert!(!response.results.is_empty());
    let trace = response.trace.unwrap();
    for method in ["semantic", "graph"] {
        let entry = trace
            .retrieval_results
            .iter()
            .find(|r| r.method_name == method)
            .unwrap();
        assert!(entry.error.is_some(), "{} should record its failure", method);
    }
}

/// Cross-encoder outage: the request succeeds with degraded scores and the
/// trace marks the missing component as null.
#[tokio::test]
async fn cross_encoder_degradation_is_recorded() {
    let engine = RecallEngine::new(
        Arc::new(corpus()),
        Arc::new(embedder_for(&[QUERY])),
        Arc::new(FailingCrossEncoder),
    );

    let response = engine.recall("bank-a", QUERY, fixed_options()).await.unwrap();
    assert!(!response.results.is_empty());

    let trace = response.trace.unwrap();
    for entry in &trace.reranked {
        assert!(entry.score_components.cross_encoder.is_none());
    }
    let json = serde_json::to_string(&trace.reranked[0]).unwrap();
    assert!(json.contains("\"crossEncoder\":null"));
}

/// P10: repeated calls over an unchanged snapshot return identical outputs.
#[tokio::test]
async fn idempotence_without_writes() {
    let engine = engine_over(Arc::new(corpus()));
    let options = RecallOptions {
        trace: false,
        ..fixed_options()
    };

    let first = engine.recall("bank-a", QUERY, options.clone()).await.unwrap();
    let second = engine.recall("bank-a", QUERY, options.clone()).await.unwrap();
    let third = engine.recall("bank-a", QUERY, options).await.unwrap();

    let a = serde_json::to_string(&first.results).unwrap();
    let b = serde_json::to_string(&second.results).unwrap();
    let c = serde_json::to_string(&third.results).unwrap();
    assert_eq!(a, b);
    assert_eq!(b, c);
}
