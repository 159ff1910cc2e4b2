//! # Graph Store (C5)
//!
//! Typed node/edge persistence behind a trait, so the ingestion
//! orchestrator and retrievers depend on a contract rather than a concrete
//! storage engine — generalized from a direct `Arc<RwLock<..>>` coupling
//! to a concrete in-memory map into an `Arc<dyn GraphStore>` seam.
//! [`memory::InMemoryGraphStore`] is the one implementation shipped here.

pub mod memory;

use crate::error::StoreError;
use crate::model::{Chunk, Community, Document, Entity, EntityId, EntityType};

pub use memory::InMemoryGraphStore;

/// A staged document write: everything needed to commit a document's full
/// graph footprint atomically, per spec.md §4.5's transactional guarantee.
pub struct DocumentWrite {
    pub document: Document,
    pub chunks: Vec<Chunk>,
    /// `(chunk_index, entity_normalized, entity_type, confidence)` — entity
    /// nodes are resolved/created during commit so upserts stay atomic with
    /// the rest of the write.
    pub entity_links: Vec<(usize, String, String, EntityType, f32)>,
}

#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub chunk_id: String,
    pub matched_keywords: usize,
    pub total_keywords: usize,
    pub phrase_bonus: f32,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub cosine: f32,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaSummary {
    pub document_count: usize,
    pub chunk_count: usize,
    pub entity_count: usize,
    pub relationship_counts: std::collections::HashMap<String, usize>,
}

/// Operations named in spec.md §4.5, plus the query primitives consumed by
/// the retrievers (C9).
pub trait GraphStore: Send + Sync {
    /// Atomically commit a full document write (node + chunks + edges).
    /// On any internal failure the store must be left exactly as before
    /// the call (no partial writes observable).
    fn commit_document(&self, write: DocumentWrite) -> Result<(), StoreError>;

    /// Remove every trace of a document: its node, its chunks, and the
    /// HAS_CHUNK/NEXT_CHUNK edges. Entity nodes are retained with
    /// `occurrences` decremented (spec.md GLOSSARY "cascade delete").
    fn delete_document_cascade(&self, doc_id: &str) -> Result<(), StoreError>;

    /// Transition a committed (`ingested`) document to `validated` once the
    /// orchestrator's validation criteria hold.
    fn mark_validated(&self, doc_id: &str) -> Result<(), StoreError>;

    fn all_documents(&self) -> Vec<Document>;
    fn get_document(&self, doc_id: &str) -> Option<Document>;
    fn get_chunk(&self, chunk_id: &str) -> Option<Chunk>;
    fn chunks_for_document(&self, doc_id: &str) -> Vec<Chunk>;
    fn get_entity_by_key(&self, normalized: &str, entity_type: EntityType) -> Option<Entity>;
    fn get_entity(&self, id: EntityId) -> Option<Entity>;
    fn entities_for_chunk(&self, chunk_id: &str) -> Vec<(Entity, f32)>;
    fn chunks_for_entity(&self, id: EntityId) -> Vec<(String, f32)>;
    /// Undirected RELATED_TO neighbors with edge strength.
    fn related_entities(&self, id: EntityId) -> Vec<(EntityId, u32)>;
    fn all_entities(&self) -> Vec<Entity>;
    /// Two-hop context expansion from a chunk, per `ExpandContext`.
    fn expand_context(&self, chunk_id: &str, hops: usize) -> Vec<Chunk>;

    fn keyword_search(&self, keywords: &[String], category_filter: Option<&str>) -> Vec<KeywordHit>;
    fn vector_search(&self, query_embedding: &[f32], top_k: usize, category_filter: Option<&str>) -> Vec<VectorHit>;
    fn entity_lookup(&self, normalized: &str, entity_type: EntityType) -> Option<Entity>;

    /// Replace the entire `RELATED_TO` edge set with exactly `edges`,
    /// dropping any existing edge not present in it. The community builder
    /// calls this once per rebuild with every currently-qualifying
    /// co-occurrence pair, so an edge whose pair no longer co-occurs (or
    /// fell below the strength threshold) does not survive the rebuild.
    fn replace_related(&self, edges: &[(EntityId, EntityId, u32)]) -> Result<(), StoreError>;
    /// Apply community assignment + centrality metrics computed by C7.
    fn apply_community_metrics(&self, assignments: &[(EntityId, crate::community::EntityMetrics)]);

    fn schema_summary(&self) -> SchemaSummary;

    fn export(&self) -> crate::persistence::ExportedGraph;
    fn import(&self, data: crate::persistence::ExportedGraph) -> Result<(), StoreError>;

    fn communities(&self) -> Vec<Community>;
}
