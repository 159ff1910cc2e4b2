//! Entity retriever: extract entities from the query with the same
//! extractor used at ingestion time (restricted to PRODUCT/TERM, since
//! those are the types a user question names directly), then fetch their
//! containing chunks weighted by `CONTAINS_ENTITY.confidence`.

use std::collections::HashMap;

use super::{Candidate, RetrievalContext, Retriever};
use crate::model::EntityType;
use crate::query::planner::QueryPlan;

pub struct EntityRetriever;

impl Retriever for EntityRetriever {
    fn run(&self, plan: &QueryPlan, ctx: &RetrievalContext) -> Vec<Candidate> {
        let hits = ctx.entity_extractor.extract(&plan.raw_query);
        let mut totals: HashMap<String, f32> = HashMap::new();

        for hit in hits.iter().filter(|h| matches!(h.entity_type, EntityType::Product | EntityType::Term)) {
            let Some(entity) = ctx.store.entity_lookup(&hit.normalized, hit.entity_type) else {
                continue;
            };
            for (chunk_id, confidence) in ctx.store.chunks_for_entity(entity.id) {
                *totals.entry(chunk_id).or_insert(0.0) += confidence;
            }
        }

        let max = totals.values().cloned().fold(0.0_f32, f32::max).max(1.0);
        totals
            .into_iter()
            .map(|(chunk_id, score)| Candidate {
                chunk_id,
                score: (score / max).clamp(0.0, 1.0),
                source_tag: "entity".to_string(),
            })
            .collect()
    }
}
