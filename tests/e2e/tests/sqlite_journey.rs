//! The S1 journey against the reference SQLite adapter: FTS5 for the lexical
//! strategy, BLOB embeddings for the semantic strategy, real links for the
//! graph walk, and bank isolation enforced by the adapter's SQL.

use std::sync::Arc;

use mnemon_core::memory::LinkType;
use mnemon_core::{RecallEngine, RecallOptions, SqliteStore};
use mnemon_e2e_tests::mocks::fixtures::{
    basis, make_entity, make_fact, make_link, toward_query, DIM,
};
use mnemon_e2e_tests::mocks::{StubCrossEncoder, StubEmbedder};

const QUERY: &str = "Where does Alice work?";

fn populated_store(dir: &tempfile::TempDir) -> SqliteStore {
    let store = SqliteStore::open(dir.path().join("journey.db")).unwrap();
    store.create_bank("b", DIM).unwrap();
    store.create_bank("other", DIM).unwrap();

    store.insert_entity(&make_entity("b", "e-google", "Google", 2)).unwrap();

    let mut f1 = make_fact("b", "f1", "Alice works at Google", toward_query(0.9, 1));
    f1.entity_refs = vec!["e-google".to_string()];
    store.insert_fact(&f1).unwrap();

    let mut f2 = make_fact("b", "f2", "Google is in Mountain View", toward_query(0.2, 2));
    f2.entity_refs = vec!["e-google".to_string()];
    store.insert_fact(&f2).unwrap();

    store
        .insert_link("b", &make_link("f1", "f2", LinkType::Entity, 0.9))
        .unwrap();

    // Same statement in another bank; it must never leak into bank b results
    store
        .insert_fact(&make_fact(
            "other",
            "foreign-1",
            "Alice works at Google",
            toward_query(0.9, 1),
        ))
        .unwrap();

    store
}

fn engine(store: SqliteStore) -> RecallEngine {
    let mut embedder = StubEmbedder::new(DIM);
    embedder.pin(QUERY, basis(0));
    RecallEngine::new(Arc::new(store), Arc::new(embedder), Arc::new(StubCrossEncoder))
}

#[tokio::test]
async fn recall_over_sqlite_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(populated_store(&dir));

    let options = RecallOptions {
        trace: true,
        ..Default::default()
    };
    let response = engine.recall("b", QUERY, options).await.unwrap();

    assert_eq!(response.results[0].fact_id, "f1");
    assert!(response.results.iter().any(|r| r.fact_id == "f2"));
    for result in &response.results {
        assert_ne!(result.fact_id, "foreign-1");
    }

    let trace = response.trace.unwrap();
    let graph = trace
        .retrieval_results
        .iter()
        .find(|r| r.method_name == "graph")
        .unwrap();
    assert!(graph.results.iter().any(|r| r.fact_id == "f2"));

    // Entity refs survive hydration through the adapter
    let top = &response.results[0];
    assert_eq!(top.entity_refs, vec!["e-google".to_string()]);
}

#[tokio::test]
async fn sqlite_recall_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(populated_store(&dir));

    let options = RecallOptions {
        now: Some(chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2024, 11, 25, 0, 0, 0).unwrap()),
        seed: Some(7),
        ..Default::default()
    };

    let first = engine.recall("b", QUERY, options.clone()).await.unwrap();
    let second = engine.recall("b", QUERY, options).await.unwrap();

    assert_eq!(
        serde_json::to_string(&first.results).unwrap(),
        serde_json::to_string(&second.results).unwrap()
    );
}

#[tokio::test]
async fn unknown_bank_is_rejected_by_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(populated_store(&dir));

    let result = engine
        .recall("nope", QUERY, RecallOptions::default())
        .await;
    assert!(matches!(
        result,
        Err(mnemon_core::RecallError::BankNotFound { .. })
    ));
}
