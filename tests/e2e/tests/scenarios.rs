//! End-to-end recall scenarios against the mock collaborators.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use mnemon_core::memory::LinkType;
use mnemon_core::{Budget, RecallEngine, RecallError, RecallOptions};
use mnemon_e2e_tests::mocks::fixtures::{
    at, basis, chain_store, make_entity, make_fact, make_link, toward_query, DIM,
};
use mnemon_e2e_tests::mocks::{MockStore, StubCrossEncoder, StubEmbedder};

fn engine(store: Arc<MockStore>, embedder: StubEmbedder) -> RecallEngine {
    RecallEngine::new(store, Arc::new(embedder), Arc::new(StubCrossEncoder))
}

fn traced() -> RecallOptions {
    RecallOptions {
        trace: true,
        ..Default::default()
    }
}

/// S1: a simple world fact, with a second fact surfaced through the entity
/// graph rather than semantic similarity.
#[tokio::test]
async fn simple_world_fact_with_graph_neighbor() {
    let query = "Where does Alice work?";

    let mut store = MockStore::new();
    store.add_bank("b", DIM);

    let mut f1 = make_fact("b", "f1", "Alice works at Google", toward_query(0.9, 1));
    f1.entity_refs = vec!["e-google".to_string()];
    store.add_fact(f1);

    // Too dissimilar for the semantic strategy, reachable via the entity link
    let mut f2 = make_fact("b", "f2", "Google is in Mountain View", toward_query(0.2, 2));
    f2.entity_refs = vec!["e-google".to_string()];
    store.add_fact(f2);

    store.add_entity(make_entity("b", "e-google", "Google", 2));
    store.add_link(make_link("f1", "f2", LinkType::Entity, 0.9));

    let mut embedder = StubEmbedder::new(DIM);
    embedder.pin(query, basis(0));

    let response = engine(Arc::new(store), embedder)
        .recall("b", query, traced())
        .await
        .unwrap();

    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].fact_id, "f1");
    assert_eq!(response.results[1].fact_id, "f2");

    // The graph strategy is what surfaced f2
    let trace = response.trace.unwrap();
    let graph = trace
        .retrieval_results
        .iter()
        .find(|r| r.method_name == "graph")
        .unwrap();
    assert!(graph.results.iter().any(|r| r.fact_id == "f2"));
    let semantic = trace
        .retrieval_results
        .iter()
        .find(|r| r.method_name == "semantic")
        .unwrap();
    assert!(!semantic.results.iter().any(|r| r.fact_id == "f2"));
}

/// S2: a temporal query resolves "last spring" against the caller's `now`
/// and keeps out-of-range facts away from the temporal strategy.
#[tokio::test]
async fn temporal_query_resolves_last_spring() {
    let query = "What did Alice do last spring?";
    let now = at(2024, 11, 25);

    let mut store = MockStore::new();
    store.add_bank("b", DIM);

    let mut f1 = make_fact("b", "f1", "Alice started learning Rust", toward_query(0.8, 1));
    f1.occurred_start = Some(at(2024, 4, 15));
    f1.occurred_end = Some(at(2024, 4, 15));
    store.add_fact(f1);

    let mut f2 = make_fact("b", "f2", "Alice joined Google", toward_query(0.5, 2));
    f2.occurred_start = Some(at(2023, 1, 10));
    f2.occurred_end = Some(at(2023, 1, 10));
    store.add_fact(f2);

    let mut embedder = StubEmbedder::new(DIM);
    embedder.pin(query, basis(0));

    let options = RecallOptions {
        now: Some(now),
        ..traced()
    };
    let response = engine(Arc::new(store), embedder)
        .recall("b", query, options)
        .await
        .unwrap();

    let trace = response.trace.unwrap();
    let range = trace.query.temporal_range.unwrap();
    assert_eq!(range.start, at(2024, 3, 1));
    assert_eq!(
        range.end,
        Utc.with_ymd_and_hms(2024, 5, 31, 23, 59, 59).unwrap()
    );

    // f1 is recalled; f2 never entered the temporal strategy
    assert!(response.results.iter().any(|r| r.fact_id == "f1"));
    let temporal = trace
        .retrieval_results
        .iter()
        .find(|r| r.method_name == "temporal_graph")
        .unwrap();
    assert!(temporal.results.iter().any(|r| r.fact_id == "f1"));
    assert!(!temporal.results.iter().any(|r| r.fact_id == "f2"));
}

/// S3: a bank with no facts answers with empty results, no error, and a
/// trace when requested.
#[tokio::test]
async fn empty_bank_returns_empty_results() {
    let mut store = MockStore::new();
    store.add_bank("empty", DIM);

    let response = engine(Arc::new(store), StubEmbedder::new(DIM))
        .recall("empty", "anything at all", traced())
        .await
        .unwrap();

    assert!(response.results.is_empty());
    let trace = response.trace.unwrap();
    assert_eq!(trace.retrieval_results.len(), 4);
    assert_eq!(trace.summary.results_returned, 0);
    assert_eq!(trace.summary.total_nodes_visited, 0);
}

/// S4: a low budget walks strictly fewer nodes than a high budget over the
/// same store, and its results are a subset of the high-budget results.
#[tokio::test]
async fn budget_escalation_widens_the_walk() {
    let query = "follow the chain";

    let mut low_embedder = StubEmbedder::new(DIM);
    low_embedder.pin(query, basis(0));
    let low = engine(Arc::new(chain_store(150)), low_embedder)
        .recall(
            "b",
            query,
            RecallOptions {
                budget: Budget::Low,
                ..traced()
            },
        )
        .await
        .unwrap();

    let mut high_embedder = StubEmbedder::new(DIM);
    high_embedder.pin(query, basis(0));
    let high = engine(Arc::new(chain_store(150)), high_embedder)
        .recall(
            "b",
            query,
            RecallOptions {
                budget: Budget::High,
                ..traced()
            },
        )
        .await
        .unwrap();

    let low_trace = low.trace.unwrap();
    let high_trace = high.trace.unwrap();
    assert_eq!(low_trace.summary.total_nodes_visited, 100);
    assert_eq!(high_trace.summary.total_nodes_visited, 150);
    assert!(low_trace.summary.total_nodes_visited < high_trace.summary.total_nodes_visited);

    let high_ids: Vec<&str> = high.results.iter().map(|r| r.fact_id.as_str()).collect();
    for result in &low.results {
        assert!(high_ids.contains(&result.fact_id.as_str()));
    }
}

/// S5: a tiny token budget over long facts returns exactly the top-ranked
/// fact via the single-fact override.
#[tokio::test]
async fn token_cap_returns_single_top_fact() {
    let query = "a long story";

    let mut store = MockStore::new();
    store.add_bank("b", DIM);
    for i in 0..20 {
        let text = format!("long fact {:02} {}", i, "detail ".repeat(60));
        store.add_fact(make_fact(
            "b",
            &format!("f{:02}", i),
            &text,
            toward_query(0.9 - i as f32 * 0.02, 1 + i % (DIM - 1)),
        ));
    }

    let mut embedder = StubEmbedder::new(DIM);
    embedder.pin(query, basis(0));

    let response = engine(Arc::new(store), embedder)
        .recall(
            "b",
            query,
            RecallOptions {
                max_tokens: 50,
                ..traced()
            },
        )
        .await
        .unwrap();

    assert_eq!(response.results.len(), 1);
    let trace = response.trace.unwrap();
    assert_eq!(response.results[0].fact_id, trace.reranked[0].fact_id);
}

/// S6: a store slower than the request deadline fails with
/// `DeadlineExceeded` before any candidate list exists.
#[tokio::test]
async fn deadline_with_slow_store() {
    let mut store = MockStore::new();
    store.add_bank("b", DIM);
    store.add_fact(make_fact("b", "f1", "a fact", toward_query(0.9, 1)));

    let store = Arc::new(store);
    store.set_latency(Duration::from_millis(50));

    let result = engine(Arc::clone(&store), StubEmbedder::new(DIM))
        .recall(
            "b",
            "anything",
            RecallOptions {
                deadline: Duration::from_millis(1),
                ..Default::default()
            },
        )
        .await;

    assert!(matches!(result, Err(RecallError::DeadlineExceeded { .. })));
}
