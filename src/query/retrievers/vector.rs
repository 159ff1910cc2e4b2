//! Vector retriever: ANN top-`2*top_k` over the query embedding, behind the
//! [`GraphStore::vector_search`] seam (a brute-force cosine scan in the
//! in-memory store; swappable for a real ANN index without changing this
//! retriever).

use super::{Candidate, RetrievalContext, Retriever};
use crate::query::planner::QueryPlan;

pub struct VectorRetriever;

impl Retriever for VectorRetriever {
    fn run(&self, plan: &QueryPlan, ctx: &RetrievalContext) -> Vec<Candidate> {
        let embedding = match ctx.embedder.encode_query(&plan.raw_query) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };
        let filter = plan.options.category_filter.as_deref();
        let top_n = plan.options.top_k.saturating_mul(2).max(1);
        ctx.store
            .vector_search(&embedding, top_n, filter)
            .into_iter()
            .map(|hit| Candidate {
                chunk_id: hit.chunk_id,
                score: hit.cosine.clamp(0.0, 1.0),
                source_tag: "vector".to_string(),
            })
            .collect()
    }
}
