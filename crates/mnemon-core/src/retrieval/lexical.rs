//! Lexical Strategy
//!
//! BM25 over the store's inverted index on `text ∪ context`, one partition
//! per requested fact type. Tokenization and ranking live in the store
//! adapter; this strategy only shapes the result.

use crate::storage::StoreError;

use super::{rank_scored, store_call, StrategyContext, TypedCandidates};

pub(crate) async fn run(ctx: &StrategyContext) -> Result<Vec<TypedCandidates>, StoreError> {
    let mut lists = Vec::with_capacity(ctx.plan.fact_types.len());
    for fact_type in &ctx.plan.fact_types {
        let hits = store_call(
            ctx.deadline,
            ctx.config.store_deadline,
            ctx.store.bm25_topk(
                &ctx.bank_id,
                std::slice::from_ref(fact_type),
                &ctx.plan.query_text,
                ctx.config.k_lexical,
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
