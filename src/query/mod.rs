//! Query pipeline (C8 -> C9 -> C10 -> C11): plan, retrieve, rerank, cite.

pub mod citation;
pub mod cross_encoder;
pub mod planner;
pub mod rerank;
pub mod retrievers;

use std::time::{Duration, Instant};

use tracing::info;

use crate::config::Config;
use planner::{QueryOptions, QueryPlan, Strategy};
use rerank::Reranker;
use retrievers::{
    community::CommunityRetriever, entity::EntityRetriever, hybrid::HybridRetriever, keyword::KeywordRetriever,
    vector::VectorRetriever, RetrievalContext, Retriever,
};

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub citations: Vec<citation::Citation>,
    pub total_candidates_considered: usize,
    pub elapsed_ms: u128,
    pub strategy_actually_used: String,
}

fn retriever_for(strategy: Strategy) -> Box<dyn Retriever> {
    match strategy {
        Strategy::Keyword => Box::new(KeywordRetriever),
        Strategy::Vector => Box::new(VectorRetriever),
        Strategy::Entity => Box::new(EntityRetriever),
        Strategy::Hybrid => Box::new(HybridRetriever),
        Strategy::Community => Box::new(CommunityRetriever),
    }
}

/// Run the full query pipeline. `use_rerank=false` in `options` skips C10
/// and returns candidates in their pre-rerank order.
pub fn execute(
    raw_query: &str,
    strategy: Strategy,
    options: QueryOptions,
    ctx: &RetrievalContext,
    reranker: &dyn Reranker,
    config: &Config,
) -> SearchResult {
    let start = Instant::now();
    let deadline = start + Duration::from_millis(config.query_deadline_ms);

    if Instant::now() >= deadline {
        return SearchResult {
            citations: Vec::new(),
            total_candidates_considered: 0,
            elapsed_ms: start.elapsed().as_millis(),
            strategy_actually_used: "deadline".to_string(),
        };
    }

    let plan: QueryPlan = planner::plan(raw_query, strategy, options);
    let candidates = retriever_for(plan.strategy).run(&plan, ctx);
    let total_candidates_considered = candidates.len();

    if candidates.is_empty() {
        return SearchResult {
            citations: Vec::new(),
            total_candidates_considered,
            elapsed_ms: start.elapsed().as_millis(),
            strategy_actually_used: strategy_name(plan.strategy),
        };
    }

    let top_k = plan.options.top_k.clamp(1, 50);
    let ranked = if plan.options.use_rerank {
        rerank::rerank(&plan, candidates, ctx, reranker, &config.rerank_weights, deadline)
    } else {
        let mut unranked: Vec<rerank::RankedCandidate> = candidates
            .into_iter()
            .filter_map(|c| {
                ctx.store.get_chunk(&c.chunk_id).map(|chunk| rerank::RankedCandidate {
                    chunk,
                    final_score: c.score,
                    source_tag: c.source_tag,
                })
            })
            .collect();
        rerank::sort_by_score_desc(&mut unranked);
        unranked
    };

    let top: Vec<_> = ranked.into_iter().take(top_k).collect();
    let citations = citation::assemble(ctx.store.as_ref(), &top);

    info!(
        query = raw_query,
        strategy = strategy_name(plan.strategy),
        candidates = total_candidates_considered,
        results = citations.len(),
        "query complete"
    );

    SearchResult {
        citations,
        total_candidates_considered,
        elapsed_ms: start.elapsed().as_millis(),
        strategy_actually_used: strategy_name(plan.strategy),
    }
}

fn strategy_name(strategy: Strategy) -> String {
    match strategy {
        Strategy::Keyword => "keyword",
        Strategy::Vector => "vector",
        Strategy::Entity => "entity",
        Strategy::Hybrid => "hybrid",
        Strategy::Community => "community",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use crate::graph::{DocumentWrite, GraphStore, InMemoryGraphStore};
    use crate::model::{Chunk, ChunkType, Document};
    use crate::ner::Extractor;
    use std::sync::Arc;

    fn seeded_store() -> Arc<dyn GraphStore> {
        let store = InMemoryGraphStore::new();
        let embedder = HashingEmbedder::new(16);
        use crate::embed::Embedder;
        let text = "An FX Forward is a contract to exchange currencies at a predetermined rate.";
        let embedding = embedder.encode(&[text.to_string()]).unwrap().remove(0);
        let chunk = Chunk {
            id: "doc1#0".into(),
            doc_id: "doc1".into(),
            chunk_index: 0,
            page_num: 12,
            text: text.into(),
            embedding,
            semantic_density: 0.6,
            chunk_type: ChunkType::Definition,
            has_definitions: true,
            has_examples: false,
        };
        store
            .commit_document(DocumentWrite {
                document: Document::new("doc1", 25),
                chunks: vec![chunk],
                entity_links: vec![],
            })
            .unwrap();
        Arc::new(store)
    }

    #[test]
    fn zero_candidates_returns_empty_list_without_error() {
        let store = seeded_store();
        let embedder: Arc<dyn crate::embed::Embedder> = Arc::new(HashingEmbedder::new(16));
        let ctx = RetrievalContext { store, embedder, entity_extractor: Arc::new(Extractor::new()) };
        let config = Config::default();
        let reranker = rerank::HeuristicReranker;
        let result = execute("completely unrelated gibberish zzz", Strategy::Keyword, QueryOptions::default(), &ctx, &reranker, &config);
        assert!(result.citations.is_empty());
        assert_eq!(result.total_candidates_considered, 0);
    }

    #[test]
    fn zero_deadline_returns_deadline_strategy() {
        let store = seeded_store();
        let embedder: Arc<dyn crate::embed::Embedder> = Arc::new(HashingEmbedder::new(16));
        let ctx = RetrievalContext { store, embedder, entity_extractor: Arc::new(Extractor::new()) };
        let mut config = Config::default();
        config.query_deadline_ms = 0;
        let reranker = rerank::HeuristicReranker;
        let result = execute("What is an FX Forward?", Strategy::Hybrid, QueryOptions::default(), &ctx, &reranker, &config);
        assert!(result.citations.is_empty());
        assert_eq!(result.strategy_actually_used, "deadline");
    }

    #[test]
    fn keyword_strategy_finds_seeded_chunk() {
        let store = seeded_store();
        let embedder: Arc<dyn crate::embed::Embedder> = Arc::new(HashingEmbedder::new(16));
        let ctx = RetrievalContext { store, embedder, entity_extractor: Arc::new(Extractor::new()) };
        let config = Config::default();
        let reranker = rerank::HeuristicReranker;
        let result = execute("What is an FX Forward?", Strategy::Keyword, QueryOptions::default(), &ctx, &reranker, &config);
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].page_num, 12);
    }

    fn seeded_store_with_two_keyword_matches() -> Arc<dyn GraphStore> {
        let store = InMemoryGraphStore::new();
        let embedder = HashingEmbedder::new(16);
        use crate::embed::Embedder;
        let full_match_text = "An FX Forward is a contract to exchange currencies at a predetermined rate.";
        let partial_match_text = "A Forward generically refers to any deferred-settlement contract.";
        let chunks = vec![
            Chunk {
                id: "doc1#0".into(),
                doc_id: "doc1".into(),
                chunk_index: 0,
                page_num: 1,
                text: partial_match_text.into(),
                embedding: embedder.encode(&[partial_match_text.to_string()]).unwrap().remove(0),
                semantic_density: 0.5,
                chunk_type: ChunkType::Content,
                has_definitions: false,
                has_examples: false,
            },
            Chunk {
                id: "doc1#1".into(),
                doc_id: "doc1".into(),
                chunk_index: 1,
                page_num: 2,
                text: full_match_text.into(),
                embedding: embedder.encode(&[full_match_text.to_string()]).unwrap().remove(0),
                semantic_density: 0.6,
                chunk_type: ChunkType::Definition,
                has_definitions: true,
                has_examples: false,
            },
        ];
        store
            .commit_document(DocumentWrite {
                document: Document::new("doc1", 25),
                chunks,
                entity_links: vec![],
            })
            .unwrap();
        Arc::new(store)
    }

    /// spec.md §5's "result order depends only on scores" invariant must
    /// hold even when `use_rerank=false` skips C10 entirely: candidates come
    /// back from `keyword_search` in hash-map iteration order (by insertion
    /// here, chunk `doc1#0` first), so without an explicit sort the
    /// lower-scoring partial match would outrank the full match.
    #[test]
    fn no_rerank_path_still_orders_citations_by_score() {
        let store = seeded_store_with_two_keyword_matches();
        let embedder: Arc<dyn crate::embed::Embedder> = Arc::new(HashingEmbedder::new(16));
        let ctx = RetrievalContext { store, embedder, entity_extractor: Arc::new(Extractor::new()) };
        let config = Config::default();
        let reranker = rerank::HeuristicReranker;
        let mut options = QueryOptions::default();
        options.use_rerank = false;
        let result = execute("FX Forward", Strategy::Keyword, options, &ctx, &reranker, &config);
        assert_eq!(result.citations.len(), 2);
        assert_eq!(result.citations[0].page_num, 2, "the full keyword match must rank first even without reranking");
    }
}
