//! Fixture builders shared by the scenario and property tests.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;

use mnemon_core::memory::{Entity, Fact, FactType, Link, LinkType};

/// Embedding dimension used by every mock bank
pub const DIM: usize = 16;

/// Midnight UTC on a date
pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// A vector with the given `(index, value)` components, zero elsewhere.
/// Lets fixtures dial in exact cosine similarities against a pinned query.
pub fn blend(components: &[(usize, f32)]) -> Vec<f32> {
    let mut vector = vec![0.0_f32; DIM];
    for (index, value) in components {
        vector[*index] = *value;
    }
    vector
}

/// A unit vector along one axis
pub fn basis(index: usize) -> Vec<f32> {
    blend(&[(index, 1.0)])
}

/// A vector at the given cosine similarity to `basis(0)`, using `other` as
/// the orthogonal remainder axis
pub fn toward_query(similarity: f32, other: usize) -> Vec<f32> {
    blend(&[(0, similarity), (other, (1.0 - similarity * similarity).sqrt())])
}

/// A world fact mentioned on 2024-11-01
pub fn make_fact(bank: &str, id: &str, text: &str, embedding: Vec<f32>) -> Fact {
    Fact {
        id: id.to_string(),
        bank_id: bank.to_string(),
        fact_type: FactType::World,
        text: text.to_string(),
        context: None,
        embedding,
        occurred_start: None,
        occurred_end: None,
        mentioned_at: at(2024, 11, 1),
        document_id: None,
        chunk_id: None,
        entity_refs: vec![],
        tags: BTreeMap::new(),
        metadata: BTreeMap::new(),
        confidence: None,
    }
}

pub fn make_entity(bank: &str, id: &str, name: &str, mention_count: i64) -> Entity {
    Entity {
        id: id.to_string(),
        bank_id: bank.to_string(),
        canonical_name: name.to_string(),
        mention_count,
        first_seen: at(2024, 1, 1),
        last_seen: at(2024, 11, 1),
    }
}

pub fn make_link(source: &str, target: &str, link_type: LinkType, weight: f32) -> Link {
    Link {
        source_id: source.to_string(),
        target_id: target.to_string(),
        link_type,
        weight,
    }
}

/// A bank `b` holding a single chain `f000 -> f001 -> ...` of entity links.
/// Only `f000` is semantically close to `basis(0)` queries, so every other
/// fact is reachable solely through the graph walk.
pub fn chain_store(length: usize) -> super::MockStore {
    let mut store = super::MockStore::new();
    store.add_bank("b", DIM);

    store.add_fact(make_fact("b", "f000", "chain start", toward_query(0.9, 1)));
    for i in 1..length {
        store.add_fact(make_fact(
            "b",
            &format!("f{:03}", i),
            &format!("chain node {}", i),
            basis(1 + i % (DIM - 1)),
        ));
    }
    for i in 0..length.saturating_sub(1) {
        store.add_link(make_link(
            &format!("f{:03}", i),
            &format!("f{:03}", i + 1),
            LinkType::Entity,
            0.95,
        ));
    }
    store
}
