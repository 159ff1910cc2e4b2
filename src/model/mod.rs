//! Shared data types for the property graph: documents, chunks, entities,
//! communities, and the typed edges between them.

pub mod chunk;
pub mod community;
pub mod document;
pub mod entity;

pub use chunk::{Chunk, ChunkType};
pub use community::Community;
pub use document::{Document, DocumentStatus};
pub use entity::{Entity, EntityId, EntityType};

/// Index into the graph store's chunk arena, scoped to a document by
/// construction (`doc_id` + `chunk_index` form the externally visible id).
pub type ChunkId = String;

/// Build the externally visible id for a chunk: `doc_id#chunk_index`.
pub fn chunk_id(doc_id: &str, chunk_index: usize) -> ChunkId {
    format!("{doc_id}#{chunk_index}")
}
