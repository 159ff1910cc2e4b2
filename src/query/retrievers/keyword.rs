//! Keyword retriever: OR over extracted keywords against the full-text
//! index maintained by the graph store.

use super::{Candidate, RetrievalContext, Retriever};
use crate::query::planner::QueryPlan;

pub struct KeywordRetriever;

impl Retriever for KeywordRetriever {
    fn run(&self, plan: &QueryPlan, ctx: &RetrievalContext) -> Vec<Candidate> {
        if plan.keywords.is_empty() {
            return Vec::new();
        }
        let filter = plan.options.category_filter.as_deref();
        ctx.store
            .keyword_search(&plan.keywords, filter)
            .into_iter()
            .map(|hit| {
                let ratio = if hit.total_keywords == 0 {
                    0.0
                } else {
                    hit.matched_keywords as f32 / hit.total_keywords as f32
                };
                Candidate {
                    chunk_id: hit.chunk_id,
                    score: (ratio + hit.phrase_bonus).min(1.0),
                    source_tag: "keyword".to_string(),
                }
            })
            .collect()
    }
}
