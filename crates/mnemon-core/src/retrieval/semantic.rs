//! Semantic Strategy
//!
//! Direct vector similarity against the bank's embeddings, one partition per
//! requested fact type, no time filter.

use crate::storage::{StoreError, VectorFilter};

use super::{rank_scored, store_call, StrategyContext, TypedCandidates};

pub(crate) async fn run(ctx: &StrategyContext) -> Result<Vec<TypedCandidates>, StoreError> {
    let filter = VectorFilter {
        min_similarity: Some(ctx.config.min_semantic_similarity),
        ..Default::default()
    };

    let mut lists = Vec::with_capacity(ctx.plan.fact_types.len());
    for fact_type in &ctx.plan.fact_types {
        let hits = store_call(
            ctx.deadline,
            ctx.config.store_deadline,
            ctx.store.vector_topk(
                &ctx.bank_id,
                std::slice::from_ref(fact_type),
                &ctx.plan.query_vec,
                ctx.config.k_semantic,
                &filter,
            ),
        )
        .await?;

        lists.push(TypedCandidates {
            fact_type: *fact_type,
            candidates: rank_scored(hits),
        });
    }

    Ok(lists)
}
