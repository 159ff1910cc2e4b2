//! Hybrid retriever: fan out to {keyword, vector, entity}, weight each
//! source's contribution per spec.md §4.9 (vector 0.5, entity 0.3, keyword
//! 0.2), and unify into one candidate list. The reranker (C10) still runs
//! on top of this in the query pipeline; this stage only produces the
//! pre-rerank fusion.

use std::collections::HashMap;

use super::entity::EntityRetriever;
use super::keyword::KeywordRetriever;
use super::vector::VectorRetriever;
use super::{Candidate, RetrievalContext, Retriever};
use crate::query::planner::QueryPlan;

const VECTOR_WEIGHT: f32 = 0.5;
const ENTITY_WEIGHT: f32 = 0.3;
const KEYWORD_WEIGHT: f32 = 0.2;

pub struct HybridRetriever;

impl Retriever for HybridRetriever {
    fn run(&self, plan: &QueryPlan, ctx: &RetrievalContext) -> Vec<Candidate> {
        let keyword = KeywordRetriever.run(plan, ctx);
        let vector = VectorRetriever.run(plan, ctx);
        let entity = EntityRetriever.run(plan, ctx);

        let mut weighted: HashMap<String, f32> = HashMap::new();
        for c in keyword {
            *weighted.entry(c.chunk_id).or_insert(0.0) += c.score * KEYWORD_WEIGHT;
        }
        for c in vector {
            *weighted.entry(c.chunk_id).or_insert(0.0) += c.score * VECTOR_WEIGHT;
        }
        for c in entity {
            *weighted.entry(c.chunk_id).or_insert(0.0) += c.score * ENTITY_WEIGHT;
        }

        let mut out: Vec<Candidate> = weighted
            .into_iter()
            .map(|(chunk_id, score)| Candidate {
                chunk_id,
                score: score.clamp(0.0, 1.0),
                source_tag: "hybrid".to_string(),
            })
            .collect();
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        out
    }
}
