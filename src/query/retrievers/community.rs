//! Community-aware two-phase retriever.
//!
//! Phase 1 restricts candidates to chunks whose entities fall in the union
//! of communities touched by the query's own entities. If that yields fewer
//! than `top_k` candidates above the 0.3 floor, phase 2 widens the pool via
//! bridge entities (entities whose neighbors span multiple communities),
//! per spec.md §4.9 and the GLOSSARY's "two-phase retrieval" definition.

use std::collections::{HashMap, HashSet};

use super::{Candidate, RetrievalContext, Retriever};
use crate::model::EntityType;
use crate::query::planner::QueryPlan;

const PHASE1_FLOOR: f32 = 0.3;

pub struct CommunityRetriever;

impl CommunityRetriever {
    fn query_communities(&self, plan: &QueryPlan, ctx: &RetrievalContext) -> HashSet<u32> {
        let hits = ctx.entity_extractor.extract(&plan.raw_query);
        hits.iter()
            .filter(|h| matches!(h.entity_type, EntityType::Product | EntityType::Term))
            .filter_map(|h| ctx.store.entity_lookup(&h.normalized, h.entity_type))
            .filter_map(|e| e.community_id)
            .collect()
    }

    fn score_from_entities(
        &self,
        entities: impl Iterator<Item = crate::model::Entity>,
        ctx: &RetrievalContext,
        tag: &str,
    ) -> Vec<Candidate> {
        let mut totals: HashMap<String, f32> = HashMap::new();
        for entity in entities {
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
                source_tag: tag.to_string(),
            })
            .collect()
    }
}

impl Retriever for CommunityRetriever {
    fn run(&self, plan: &QueryPlan, ctx: &RetrievalContext) -> Vec<Candidate> {
        let communities = self.query_communities(plan, ctx);
        if communities.is_empty() {
            return Vec::new();
        }

        let phase1_entities = ctx
            .store
            .all_entities()
            .into_iter()
            .filter(|e| e.community_id.map(|c| communities.contains(&c)).unwrap_or(false));
        let mut candidates = self.score_from_entities(phase1_entities, ctx, "community_phase1");

        let above_floor = candidates.iter().filter(|c| c.score >= PHASE1_FLOOR).count();
        if above_floor < plan.options.top_k {
            let bridge_entities = ctx.store.all_entities().into_iter().filter(|e| e.is_bridge);
            let expansion = self.score_from_entities(bridge_entities, ctx, "community_phase2_bridge");
            candidates.extend(expansion);
        }

        candidates
    }
}
