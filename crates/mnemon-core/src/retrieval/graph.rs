//! Graph Strategy - Spreading Activation
//!
//! Surfaces facts that are only indirectly related to the query: strong
//! semantic hits seed an activation map, and activation spreads outward over
//! typed links, decaying per link type and link weight. A max-priority
//! frontier guarantees the highest-activation facts are expanded first, and
//! the visited set plus max-accumulation makes cycles harmless - no explicit
//! cycle detection, no recursion.
//!
//! The temporal variant is the same walk with a time window: entry points
//! are time-filtered by the store, and a link is only traversed into a fact
//! whose occurrence time (or `mentioned_at`, when the fallback is enabled)
//! lies inside the window. Facts outside the window never receive activation.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::ACTIVATION_CEILING;
use crate::memory::{Fact, FactId, FactType, LinkType, TemporalRange};
use crate::storage::{StoreError, VectorFilter};
use crate::trace::VisitRecord;

use super::{store_call, Candidate, StrategyContext, TypedCandidates, WalkStats};

// ============================================================================
// FRONTIER
// ============================================================================

/// Max-heap entry. Higher activation pops first; ties pop the
/// lexicographically smaller fact id for determinism.
struct Frontier {
    activation: f32,
    fact_id: FactId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.activation
            .total_cmp(&other.activation)
            .then_with(|| other.fact_id.cmp(&self.fact_id))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// The slice of a fact the walker needs to keep per node
struct NodeMeta {
    fact_type: FactType,
    occurred_start: Option<DateTime<Utc>>,
    mentioned_at: DateTime<Utc>,
}

impl From<&Fact> for NodeMeta {
    fn from(fact: &Fact) -> Self {
        Self {
            fact_type: fact.fact_type,
            occurred_start: fact.occurred_start,
            mentioned_at: fact.mentioned_at,
        }
    }
}

// ============================================================================
// WALK
// ============================================================================

pub(crate) async fn run(
    ctx: &StrategyContext,
    time_window: Option<TemporalRange>,
) -> Result<(Vec<TypedCandidates>, WalkStats), StoreError> {
    let cfg = &ctx.config.graph;
    let fallback = ctx.config.temporal_fallback_to_mentioned_at;

    // Entry points: strong semantic hits, time-filtered for the temporal walk
    let entry_filter = VectorFilter {
        time_range: time_window,
        fallback_to_mentioned_at: fallback,
        min_similarity: Some(cfg.entry_threshold),
    };
    let entries = store_call(
        ctx.deadline,
        ctx.config.store_deadline,
        ctx.store.vector_topk(
            &ctx.bank_id,
            &ctx.plan.fact_types,
            &ctx.plan.query_vec,
            cfg.entry_count,
            &entry_filter,
        ),
    )
    .await?;

    if entries.is_empty() {
        return Ok((vec![], WalkStats::default()));
    }

    let entry_ids: Vec<FactId> = entries.iter().map(|(id, _)| id.clone()).collect();
    let entry_facts = store_call(
        ctx.deadline,
        ctx.config.store_deadline,
        ctx.store.fetch_facts(&ctx.bank_id, &entry_ids),
    )
    .await?;

    let mut meta: HashMap<FactId, NodeMeta> = entry_facts
        .iter()
        .map(|fact| (fact.id.clone(), NodeMeta::from(fact)))
        .collect();

    // Activation state. All of it is task-local: each walk owns its own maps.
    let mut activation: HashMap<FactId, f32> = HashMap::new();
    let mut parents: HashMap<FactId, (FactId, f32)> = HashMap::new();
    let mut heap: BinaryHeap<Frontier> = BinaryHeap::new();
    let mut visited: HashSet<FactId> = HashSet::new();
    let mut visit_order: Vec<FactId> = Vec::new();
    let mut visits: Vec<VisitRecord> = Vec::new();

    for (fact_id, similarity) in &entries {
        if !meta.contains_key(fact_id) {
            continue; // deleted between topk and hydration
        }
        let seed = similarity.min(ACTIVATION_CEILING);
        activation.insert(fact_id.clone(), seed);
        heap.push(Frontier {
            activation: seed,
            fact_id: fact_id.clone(),
        });
    }
    let entry_points = activation.len();

    while visited.len() < ctx.budget {
        // Request deadline: stop and return the partial walk
        if Instant::now() >= ctx.deadline {
            break;
        }

        let Some(Frontier { activation: popped, fact_id: current }) = heap.pop() else {
            break;
        };
        if visited.contains(&current) {
            continue;
        }
        // Lazy deletion: a fresher, higher-activation entry is still queued
        let best = activation.get(&current).copied().unwrap_or(0.0);
        if popped.total_cmp(&best).is_lt() {
            continue;
        }

        visited.insert(current.clone());
        visit_order.push(current.clone());
        let (activation_path, weights) = build_path(&current, &parents);
        visits.push(VisitRecord {
            node_id: current.clone(),
            activation_path,
            weights,
        });

        let links = match store_call(
            ctx.deadline,
            ctx.config.store_deadline,
            ctx.store.links_from(&ctx.bank_id, &current, &LinkType::ALL),
        )
        .await
        {
            Ok(links) => links,
            // Expiry of the request deadline mid-walk keeps the partial walk;
            // a genuine store deadline degrades the whole strategy.
            Err(StoreError::Deadline(_)) if Instant::now() >= ctx.deadline => break,
            Err(e) => return Err(e),
        };

        let unseen: Vec<FactId> = links
            .iter()
            .map(|link| link.target_id.clone())
            .filter(|id| !meta.contains_key(id))
            .collect();
        if !unseen.is_empty() {
            let fetched = match store_call(
                ctx.deadline,
                ctx.config.store_deadline,
                ctx.store.fetch_facts(&ctx.bank_id, &unseen),
            )
            .await
            {
                Ok(facts) => facts,
                Err(StoreError::Deadline(_)) if Instant::now() >= ctx.deadline => break,
                Err(e) => return Err(e),
            };
            for fact in &fetched {
                meta.insert(fact.id.clone(), NodeMeta::from(fact));
            }
        }

        let source_activation = activation.get(&current).copied().unwrap_or(0.0);
        for link in links {
            let Some(target_meta) = meta.get(&link.target_id) else {
                continue; // target deleted or outside the bank
            };

            // The temporal walk never activates facts outside the window
            if let Some(window) = time_window {
                let effective = match target_meta.occurred_start {
                    Some(t) => Some(t),
                    None if fallback => Some(target_meta.mentioned_at),
                    None => None,
                };
                match effective {
                    Some(t) if window.contains(t) => {}
                    _ => continue,
                }
            }

            let propagated = (source_activation
                * ctx.config.graph.decay.for_link(link.link_type)
                * link.weight)
                .min(ACTIVATION_CEILING);
            if propagated <= 0.0 {
                continue;
            }

            let current_best = activation.get(&link.target_id).copied().unwrap_or(0.0);
            if propagated > current_best {
                activation.insert(link.target_id.clone(), propagated);
                if !visited.contains(&link.target_id) {
                    // Paths are frozen once a node is visited; only unvisited
                    // nodes are reparented and requeued
                    parents.insert(link.target_id.clone(), (current.clone(), link.weight));
                    heap.push(Frontier {
                        activation: propagated,
                        fact_id: link.target_id,
                    });
                }
            }
        }
    }

    let lists = partition_output(ctx, &visited, &activation, &meta, cfg.activation_floor);
    let stats = WalkStats {
        visits,
        nodes_visited: visit_order.len(),
        entry_points,
    };

    Ok((lists, stats))
}

/// Reconstruct the activation path from the entry point to `fact_id`
fn build_path(
    fact_id: &FactId,
    parents: &HashMap<FactId, (FactId, f32)>,
) -> (Vec<FactId>, Vec<f32>) {
    let mut path = vec![fact_id.clone()];
    let mut weights = Vec::new();
    let mut cursor = fact_id;
    while let Some((parent, weight)) = parents.get(cursor) {
        path.push(parent.clone());
        weights.push(*weight);
        cursor = parent;
    }
    path.reverse();
    weights.reverse();
    (path, weights)
}

/// Sort visited facts by final activation and partition them into the
/// requested fact types with dense per-partition ranks.
///
/// Ties break on newer `mentioned_at`, then lexicographic fact id.
fn partition_output(
    ctx: &StrategyContext,
    visited: &HashSet<FactId>,
    activation: &HashMap<FactId, f32>,
    meta: &HashMap<FactId, NodeMeta>,
    floor: f32,
) -> Vec<TypedCandidates> {
    let mut emitted: Vec<(&FactId, f32)> = visited
        .iter()
        .filter_map(|id| {
            let score = activation.get(id).copied()?;
            if score < floor {
                return None;
            }
            Some((id, score))
        })
        .collect();

    emitted.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| {
                let ma = meta.get(a.0).map(|m| m.mentioned_at);
                let mb = meta.get(b.0).map(|m| m.mentioned_at);
                mb.cmp(&ma)
            })
            .then_with(|| a.0.cmp(b.0))
    });

    ctx.plan
        .fact_types
        .iter()
        .map(|fact_type| {
            let candidates = emitted
                .iter()
                .filter(|(id, _)| {
                    meta.get(*id)
                        .is_some_and(|m| m.fact_type == *fact_type)
                })
                .enumerate()
                .map(|(index, (id, score))| Candidate {
                    fact_id: (*id).clone(),
                    score: *score,
                    rank: index + 1,
                })
                .collect();
            TypedCandidates {
                fact_type: *fact_type,
                candidates,
            }
        })
        .collect()
}
