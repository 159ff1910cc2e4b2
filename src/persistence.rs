//! Export/import and on-disk persistence.
//!
//! Generalized from a `save_kb`/`load_kb` pair (a pretty-printed
//! `serde_json` dump of the whole in-memory store) into the export schema
//! spec.md §6 requires (`{metadata, nodes, relationships, statistics}`),
//! and fixes a non-atomicity that was acceptable for a prototype but this
//! crate's transactional guarantees do not allow: writes go to a sibling
//! temp file first, then `rename` swaps it into place atomically.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{Chunk, ChunkType, Document, DocumentStatus, Entity, EntityType};

pub const SCHEMA_REVISION: u32 = 1;
pub const EXPORT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "_type", rename = "vector")]
pub struct VectorValue {
    pub dimension: usize,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "label")]
pub enum ExportedNodeKind {
    Document {
        total_pages: usize,
        category: Option<String>,
        division: Option<String>,
        chunk_count: usize,
        status: DocumentStatus,
    },
    Chunk {
        doc_id: String,
        chunk_index: usize,
        page_num: usize,
        text: String,
        embedding: Vec<f32>,
        semantic_density: f32,
        chunk_type: ChunkType,
        has_definitions: bool,
        has_examples: bool,
    },
    Entity {
        normalized: String,
        entity_type: EntityType,
        occurrences: u32,
        community_id: Option<u32>,
        degree_centrality: f64,
        betweenness_centrality: f64,
        is_bridge: bool,
        connected_communities: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedNode {
    pub id: String,
    pub labels: Vec<String>,
    #[serde(flatten)]
    pub kind: ExportedNodeKind,
}

impl ExportedNode {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            labels: vec!["Document".to_string()],
            kind: ExportedNodeKind::Document {
                total_pages: doc.total_pages,
                category: doc.category.clone(),
                division: doc.division.clone(),
                chunk_count: doc.chunk_count,
                status: doc.status,
            },
        }
    }

    pub fn from_chunk(id: &str, chunk: &Chunk) -> Self {
        Self {
            id: id.to_string(),
            labels: vec!["Chunk".to_string()],
            kind: ExportedNodeKind::Chunk {
                doc_id: chunk.doc_id.clone(),
                chunk_index: chunk.chunk_index,
                page_num: chunk.page_num,
                text: chunk.text.clone(),
                embedding: chunk.embedding.clone(),
                semantic_density: chunk.semantic_density,
                chunk_type: chunk.chunk_type,
                has_definitions: chunk.has_definitions,
                has_examples: chunk.has_examples,
            },
        }
    }

    pub fn from_entity(entity: &Entity) -> Self {
        Self {
            id: entity.id.0.to_string(),
            labels: vec!["Entity".to_string()],
            kind: ExportedNodeKind::Entity {
                normalized: entity.normalized.clone(),
                entity_type: entity.entity_type,
                occurrences: entity.occurrences,
                community_id: entity.community_id,
                degree_centrality: entity.degree_centrality,
                betweenness_centrality: entity.betweenness_centrality,
                is_bridge: entity.is_bridge,
                connected_communities: entity.connected_communities,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExportedRelationshipKind {
    HasChunk,
    NextChunk,
    ContainsEntity { chunk_id: String, entity_id: u32, confidence: f32 },
    RelatedTo { a: u32, b: u32, strength: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedRelationship {
    pub id: String,
    pub start_id: String,
    pub end_id: String,
    #[serde(flatten)]
    pub kind: ExportedRelationshipKind,
}

impl ExportedRelationship {
    pub fn has_chunk(doc_id: &str, chunk_id: &str, index: usize) -> Self {
        Self {
            id: format!("has_chunk:{doc_id}:{index}"),
            start_id: doc_id.to_string(),
            end_id: chunk_id.to_string(),
            kind: ExportedRelationshipKind::HasChunk,
        }
    }

    pub fn next_chunk(from: &str, to: &str) -> Self {
        Self {
            id: format!("next_chunk:{from}->{to}"),
            start_id: from.to_string(),
            end_id: to.to_string(),
            kind: ExportedRelationshipKind::NextChunk,
        }
    }

    pub fn contains_entity(chunk_id: &str, entity_id: u32, confidence: f32) -> Self {
        Self {
            id: format!("contains_entity:{chunk_id}:{entity_id}"),
            start_id: chunk_id.to_string(),
            end_id: entity_id.to_string(),
            kind: ExportedRelationshipKind::ContainsEntity { chunk_id: chunk_id.to_string(), entity_id, confidence },
        }
    }

    pub fn related_to(a: u32, b: u32, strength: u32) -> Self {
        Self {
            id: format!("related_to:{a}:{b}"),
            start_id: a.to_string(),
            end_id: b.to_string(),
            kind: ExportedRelationshipKind::RelatedTo { a, b, strength },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub version: String,
    pub export_timestamp: chrono::DateTime<chrono::Utc>,
    pub schema_revision: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportStatistics {
    pub document_count: usize,
    pub chunk_count: usize,
    pub entity_count: usize,
    pub relationship_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedGraph {
    pub metadata: ExportMetadata,
    pub nodes: Vec<ExportedNode>,
    pub relationships: Vec<ExportedRelationship>,
    pub statistics: ExportStatistics,
}

impl ExportedGraph {
    pub fn new(nodes: Vec<ExportedNode>, relationships: Vec<ExportedRelationship>) -> Self {
        let document_count = nodes.iter().filter(|n| matches!(n.kind, ExportedNodeKind::Document { .. })).count();
        let chunk_count = nodes.iter().filter(|n| matches!(n.kind, ExportedNodeKind::Chunk { .. })).count();
        let entity_count = nodes.iter().filter(|n| matches!(n.kind, ExportedNodeKind::Entity { .. })).count();
        let relationship_count = relationships.len();

        Self {
            metadata: ExportMetadata {
                version: EXPORT_VERSION.to_string(),
                export_timestamp: chrono::Utc::now(),
                schema_revision: SCHEMA_REVISION,
            },
            nodes,
            relationships,
            statistics: ExportStatistics { document_count, chunk_count, entity_count, relationship_count },
        }
    }

    /// Write the export atomically: serialize to a sibling temp file, then
    /// `rename` into place. A reader never observes a partially written file.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
