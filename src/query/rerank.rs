//! # Reranker (C10)
//!
//! Cross-encoder scoring plus the multi-factor fusion formula from
//! spec.md §4.10, behind a `Reranker` trait (capability `{Score}` per the
//! design notes) with the same real-model/fallback split as [`crate::embed`]:
//! [`CandleCrossEncoder`] wraps a real sequence-pair classifier, and
//! [`HeuristicReranker`] is a dependency-free token-overlap scorer used when
//! no model is loaded or during tests.

use std::collections::HashSet;
use std::time::Instant;

use crate::error::EmbedError;
use crate::model::Chunk;
use crate::query::planner::QueryPlan;
use crate::query::retrievers::{Candidate, RetrievalContext};

/// Score a `(query, chunk_text)` pair in `[0, 1]`. Distinct from the
/// bi-encoder used for embeddings: this sees the query and candidate text
/// jointly, per the GLOSSARY's "cross-encoder" definition.
pub trait Reranker: Send + Sync {
    fn score(&self, query: &str, chunk_text: &str) -> Result<f32, EmbedError>;
}

/// Token-overlap heuristic: Jaccard similarity between query and chunk
/// tokens, scaled into a plausible relevance range. Ungrounded in any
/// learned model, but satisfies the same `[0,1]`, deterministic contract,
/// and is what `HeuristicReranker` falls back to when `ModelUnavailable`.
pub struct HeuristicReranker;

impl Reranker for HeuristicReranker {
    fn score(&self, query: &str, chunk_text: &str) -> Result<f32, EmbedError> {
        let q: HashSet<String> = tokenize_lower(query);
        let c: HashSet<String> = tokenize_lower(chunk_text);
        if q.is_empty() || c.is_empty() {
            return Ok(0.0);
        }
        let intersection = q.intersection(&c).count() as f32;
        let union = q.union(&c).count() as f32;
        Ok((intersection / union.max(1.0)).clamp(0.0, 1.0))
    }
}

fn tokenize_lower(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Final ranked candidate, carrying every component the citation assembler
/// and debugging tools need.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub chunk: Chunk,
    pub final_score: f32,
    pub source_tag: String,
}

/// Combine cross-encoder scoring with the pre-rerank retriever score,
/// keyword overlap, and query-type match per spec.md §4.10's fixed
/// weights. Degrades to the pre-rerank ordering (tagged, not dropped) if
/// the reranker reports `ModelUnavailable` or the deadline is reached
/// mid-pass; never returns an empty list when `candidates` is non-empty.
pub fn rerank(
    plan: &QueryPlan,
    candidates: Vec<Candidate>,
    ctx: &RetrievalContext,
    reranker: &dyn Reranker,
    weights: &crate::config::RerankWeights,
    deadline: Instant,
) -> Vec<RankedCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let query_keywords: HashSet<&str> = plan.keywords.iter().map(|s| s.as_str()).collect();
    let target_chunk_type = plan.class.matching_chunk_type();

    let mut ranked = Vec::with_capacity(candidates.len());
    let mut degraded = false;

    for candidate in &candidates {
        if Instant::now() >= deadline {
            degraded = true;
            break;
        }
        let Some(chunk) = ctx.store.get_chunk(&candidate.chunk_id) else {
            continue;
        };

        let cross_encoder = match reranker.score(&plan.raw_query, &chunk.text) {
            Ok(s) => s,
            Err(_) => {
                degraded = true;
                break;
            }
        };

        let chunk_tokens: HashSet<&str> = chunk.text.split_whitespace().collect();
        let keyword_match = jaccard(&query_keywords, &chunk_tokens);
        let query_type_match = if chunk.chunk_type == target_chunk_type { 1.0 } else { 0.0 };

        let final_score = weights.cross_encoder * cross_encoder
            + weights.retriever * candidate.score
            + weights.keyword * keyword_match
            + weights.query_type * query_type_match;

        ranked.push(RankedCandidate {
            chunk,
            final_score,
            source_tag: candidate.source_tag.clone(),
        });
    }

    if degraded {
        // Pre-rerank ordering: resolve each untouched candidate to its chunk
        // (skipping any the store can't resolve, which should not happen for
        // a chunk id the retriever itself produced), then sort by retriever
        // score — spec.md §4.10's "return the best candidates ranked by
        // their pre-rerank scores" requirement for the degraded path.
        let mut fallback: Vec<RankedCandidate> = candidates
            .into_iter()
            .filter_map(|c| {
                ctx.store.get_chunk(&c.chunk_id).map(|chunk| RankedCandidate {
                    chunk,
                    final_score: c.score,
                    source_tag: c.source_tag,
                })
            })
            .collect();
        sort_by_score_desc(&mut fallback);
        return fallback;
    }

    sort_by_score_desc(&mut ranked);
    ranked
}

/// Descending by `final_score`, then by `semantic_density`, then ascending
/// by `page_num` — the one ordering both the full rerank pass and every
/// degraded/no-rerank path use, so `use_rerank=false` still satisfies
/// spec.md §5's "result order depends only on scores" invariant.
pub(crate) fn sort_by_score_desc(ranked: &mut [RankedCandidate]) {
    ranked.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.chunk.semantic_density.partial_cmp(&a.chunk.semantic_density).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.chunk.page_num.cmp(&b.chunk.page_num))
    });
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    intersection / union.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_scores_identical_text_highest() {
        let r = HeuristicReranker;
        let s = r.score("fx forward contract", "fx forward contract").unwrap();
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn heuristic_scores_unrelated_text_zero() {
        let r = HeuristicReranker;
        let s = r.score("fx forward contract", "totally different words here").unwrap();
        assert_eq!(s, 0.0);
    }

    #[test]
    fn jaccard_handles_empty_sets() {
        let empty: HashSet<&str> = HashSet::new();
        let some: HashSet<&str> = ["a"].into_iter().collect();
        assert_eq!(jaccard(&empty, &some), 0.0);
    }
}
