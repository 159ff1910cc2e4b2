//! # Retrievers (C9)
//!
//! One `Retriever` implementation per [`Strategy`](crate::query::planner::Strategy)
//! variant, unified behind a single trait per the design notes' "tagged
//! variant with a single `Run(plan, ctx)` capability" reconciliation —
//! generalized from an ad hoc dispatch that picked a code path by matching
//! on intent name, into a small trait object set the query engine dispatches
//! over.

pub mod community;
pub mod entity;
pub mod hybrid;
pub mod keyword;
pub mod vector;

use std::sync::Arc;

use crate::graph::GraphStore;
use crate::query::planner::QueryPlan;

/// One scored chunk candidate, tagged with the retriever that produced it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk_id: String,
    pub score: f32,
    pub source_tag: String,
}

/// Everything a retriever needs beyond the plan: the store, and the
/// embedder/entity-extractor used to project the query into the same
/// spaces chunks were indexed in.
pub struct RetrievalContext {
    pub store: Arc<dyn GraphStore>,
    pub embedder: Arc<dyn crate::embed::Embedder>,
    pub entity_extractor: Arc<crate::ner::Extractor>,
}

pub trait Retriever: Send + Sync {
    fn run(&self, plan: &QueryPlan, ctx: &RetrievalContext) -> Vec<Candidate>;
}

/// Normalize a set of scores into `[0, 1]` by dividing by the maximum
/// observed score (a no-op if every score is already ≤ 1 and the max is 1).
pub fn normalize_scores(candidates: &mut [Candidate]) {
    let max = candidates.iter().map(|c| c.score).fold(0.0_f32, f32::max);
    if max > 1.0 {
        for c in candidates.iter_mut() {
            c.score /= max;
        }
    }
}

/// Merge candidate lists from multiple retrievers, summing scores for
/// chunks that appear in more than one list (the merge is associative and
/// commutative, per spec.md §5's query-execution ordering guarantee).
pub fn merge_candidates(lists: Vec<Vec<Candidate>>) -> Vec<Candidate> {
    use std::collections::HashMap;
    let mut merged: HashMap<String, Candidate> = HashMap::new();
    for list in lists {
        for c in list {
            merged
                .entry(c.chunk_id.clone())
                .and_modify(|existing| {
                    existing.score += c.score;
                    existing.source_tag = format!("{},{}", existing.source_tag, c.source_tag);
                })
                .or_insert(c);
        }
    }
    let mut out: Vec<Candidate> = merged.into_values().collect();
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: &str, score: f32, tag: &str) -> Candidate {
        Candidate { chunk_id: id.into(), score, source_tag: tag.into() }
    }

    #[test]
    fn merge_sums_scores_for_shared_chunks() {
        let a = vec![cand("c1", 0.5, "keyword")];
        let b = vec![cand("c1", 0.3, "vector"), cand("c2", 0.2, "vector")];
        let merged = merge_candidates(vec![a, b]);
        let c1 = merged.iter().find(|c| c.chunk_id == "c1").unwrap();
        assert!((c1.score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn merge_sorts_descending_by_score() {
        let a = vec![cand("c1", 0.2, "keyword")];
        let b = vec![cand("c2", 0.9, "vector")];
        let merged = merge_candidates(vec![a, b]);
        assert_eq!(merged[0].chunk_id, "c2");
    }
}
