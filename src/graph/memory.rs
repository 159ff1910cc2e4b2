//! In-memory `GraphStore` implementation.
//!
//! Generalized from a `HashMap`-backed store with a reverse index kept in
//! sync on every write (there: a concept-link index; here:
//! `chunk_entities`/`entity_chunks`), guarded by `parking_lot::RwLock` the
//! same way, wrapped in `Arc<RwLock<..>>`.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::community::EntityMetrics;
use crate::embed::cosine_similarity;
use crate::error::StoreError;
use crate::model::{chunk_id as make_chunk_id, Chunk, Community, Document, DocumentStatus, Entity, EntityId, EntityType};
use crate::persistence::{ExportedGraph, ExportedNode, ExportedRelationship};

use super::{DocumentWrite, GraphStore, KeywordHit, SchemaSummary, VectorHit};

fn unordered_pair(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a.0 <= b.0 {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Default)]
struct Inner {
    documents: HashMap<String, Document>,
    /// Chunk ids in `chunk_index` order, per document — doubles as the
    /// NEXT_CHUNK chain and as the cascade-delete membership list.
    doc_chunk_order: HashMap<String, Vec<String>>,
    chunks: HashMap<String, Chunk>,
    entities: Vec<Entity>,
    entity_index: HashMap<(String, EntityType), EntityId>,
    chunk_entities: HashMap<String, Vec<(EntityId, f32)>>,
    entity_chunks: HashMap<EntityId, Vec<(String, f32)>>,
    related: HashMap<(EntityId, EntityId), u32>,
    communities: HashMap<u32, Community>,
}

impl Inner {
    fn upsert_entity(&mut self, normalized: &str, entity_type: EntityType, surface: &str) -> EntityId {
        let key = (normalized.to_string(), entity_type);
        if let Some(&id) = self.entity_index.get(&key) {
            let e = &mut self.entities[id.0 as usize];
            e.occurrences += 1;
            debug!(normalized, "entity reinforced");
            id
        } else {
            let id = EntityId(self.entities.len() as u32);
            self.entities.push(Entity::new(id, surface, normalized, entity_type));
            self.entity_index.insert(key, id);
            debug!(normalized, "entity created");
            id
        }
    }
}

pub struct InMemoryGraphStore {
    inner: RwLock<Inner>,
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner::default()) }
    }
}

impl GraphStore for InMemoryGraphStore {
    fn commit_document(&self, write: DocumentWrite) -> Result<(), StoreError> {
        if write.document.id.is_empty() {
            return Err(StoreError::InvariantViolation("document id must not be empty".into()));
        }

        let mut inner = self.inner.write();

        if inner.documents.contains_key(&write.document.id) {
            // Re-ingest: drop the prior footprint first so the commit is an
            // upsert, not an accumulation (idempotent re-ingest, §8).
            drop(inner);
            self.delete_document_cascade(&write.document.id)?;
            inner = self.inner.write();
        }

        let doc_id = write.document.id.clone();
        let mut chunk_ids = Vec::with_capacity(write.chunks.len());

        for chunk in &write.chunks {
            chunk_ids.push(chunk.id.clone());
        }

        for chunk in write.chunks {
            inner.chunks.insert(chunk.id.clone(), chunk);
        }
        inner.doc_chunk_order.insert(doc_id.clone(), chunk_ids);

        for (chunk_index, normalized, surface, entity_type, confidence) in write.entity_links {
            let cid = make_chunk_id(&doc_id, chunk_index);
            let entity_id = inner.upsert_entity(&normalized, entity_type, &surface);
            let slot = inner.chunk_entities.entry(cid.clone()).or_default();
            match slot.iter_mut().find(|(id, _)| *id == entity_id) {
                Some((_, conf)) => {
                    if confidence > *conf {
                        *conf = confidence;
                    }
                }
                None => slot.push((entity_id, confidence)),
            }
            let rev = inner.entity_chunks.entry(entity_id).or_default();
            if !rev.iter().any(|(c, _)| c == &cid) {
                rev.push((cid, confidence));
            }
        }

        let mut document = write.document;
        document.chunk_count = inner.doc_chunk_order.get(&doc_id).map(|v| v.len()).unwrap_or(0);
        document.status = DocumentStatus::Ingested;
        inner.documents.insert(doc_id.clone(), document);

        info!(doc_id, chunks = inner.doc_chunk_order.get(&doc_id).map(|v| v.len()).unwrap_or(0), "document committed");
        Ok(())
    }

    fn delete_document_cascade(&self, doc_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let Some(chunk_ids) = inner.doc_chunk_order.remove(doc_id) else {
            inner.documents.remove(doc_id);
            return Ok(());
        };

        for cid in &chunk_ids {
            inner.chunks.remove(cid);
            if let Some(links) = inner.chunk_entities.remove(cid) {
                for (entity_id, _) in links {
                    if let Some(e) = inner.entities.get_mut(entity_id.0 as usize) {
                        e.occurrences = e.occurrences.saturating_sub(1);
                    }
                    if let Some(rev) = inner.entity_chunks.get_mut(&entity_id) {
                        rev.retain(|(c, _)| c != cid);
                    }
                }
            }
        }

        inner.documents.remove(doc_id);
        info!(doc_id, "document cascade-deleted");
        Ok(())
    }

    fn all_documents(&self) -> Vec<Document> {
        self.inner.read().documents.values().cloned().collect()
    }

    fn mark_validated(&self, doc_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let doc = inner
            .documents
            .get_mut(doc_id)
            .ok_or_else(|| StoreError::NotFound(doc_id.to_string()))?;
        doc.status = DocumentStatus::Validated;
        Ok(())
    }

    fn get_document(&self, doc_id: &str) -> Option<Document> {
        self.inner.read().documents.get(doc_id).cloned()
    }

    fn get_chunk(&self, chunk_id: &str) -> Option<Chunk> {
        self.inner.read().chunks.get(chunk_id).cloned()
    }

    fn chunks_for_document(&self, doc_id: &str) -> Vec<Chunk> {
        let inner = self.inner.read();
        inner
            .doc_chunk_order
            .get(doc_id)
            .map(|ids| ids.iter().filter_map(|id| inner.chunks.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    fn get_entity_by_key(&self, normalized: &str, entity_type: EntityType) -> Option<Entity> {
        let inner = self.inner.read();
        let id = inner.entity_index.get(&(normalized.to_string(), entity_type))?;
        inner.entities.get(id.0 as usize).cloned()
    }

    fn get_entity(&self, id: EntityId) -> Option<Entity> {
        self.inner.read().entities.get(id.0 as usize).cloned()
    }

    fn entities_for_chunk(&self, chunk_id: &str) -> Vec<(Entity, f32)> {
        let inner = self.inner.read();
        inner
            .chunk_entities
            .get(chunk_id)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|(id, conf)| inner.entities.get(id.0 as usize).map(|e| (e.clone(), *conf)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn chunks_for_entity(&self, id: EntityId) -> Vec<(String, f32)> {
        self.inner.read().entity_chunks.get(&id).cloned().unwrap_or_default()
    }

    fn related_entities(&self, id: EntityId) -> Vec<(EntityId, u32)> {
        let inner = self.inner.read();
        inner
            .related
            .iter()
            .filter_map(|(&(a, b), &strength)| {
                if a == id {
                    Some((b, strength))
                } else if b == id {
                    Some((a, strength))
                } else {
                    None
                }
            })
            .collect()
    }

    fn all_entities(&self) -> Vec<Entity> {
        self.inner.read().entities.clone()
    }

    fn expand_context(&self, chunk_id: &str, hops: usize) -> Vec<Chunk> {
        let inner = self.inner.read();
        let mut seen = std::collections::HashSet::new();
        seen.insert(chunk_id.to_string());
        let mut frontier = vec![chunk_id.to_string()];

        for _ in 0..hops.min(2) {
            let mut next_frontier = Vec::new();
            for cid in &frontier {
                let Some(links) = inner.chunk_entities.get(cid) else { continue };
                for (entity_id, _) in links {
                    let Some(chunks) = inner.entity_chunks.get(entity_id) else { continue };
                    for (other_cid, _) in chunks {
                        if seen.insert(other_cid.clone()) {
                            next_frontier.push(other_cid.clone());
                        }
                    }
                }
            }
            frontier = next_frontier;
        }

        seen.into_iter().filter_map(|id| inner.chunks.get(&id).cloned()).collect()
    }

    fn keyword_search(&self, keywords: &[String], category_filter: Option<&str>) -> Vec<KeywordHit> {
        if keywords.is_empty() {
            return Vec::new();
        }
        let inner = self.inner.read();
        let total = keywords.len();
        let mut hits = Vec::new();

        for (cid, chunk) in &inner.chunks {
            if let Some(cat) = category_filter {
                let doc = inner.documents.get(&chunk.doc_id);
                let matches = doc.and_then(|d| d.category.as_deref()) == Some(cat);
                if !matches {
                    continue;
                }
            }
            let lower = chunk.text.to_lowercase();
            let matched = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
            if matched == 0 {
                continue;
            }
            let phrase = keywords.join(" ");
            let phrase_bonus = if lower.contains(&phrase) { 0.1 } else { 0.0 };
            hits.push(KeywordHit {
                chunk_id: cid.clone(),
                matched_keywords: matched,
                total_keywords: total,
                phrase_bonus,
            });
        }
        // Pre-sorted by the same (match ratio + phrase bonus) score the
        // keyword retriever derives from these fields, descending, with
        // chunk_id as a deterministic tie-break — mirrors `vector_search`
        // already returning its hits in score order rather than hash-map
        // iteration order.
        hits.sort_by(|a, b| {
            let score_a = a.matched_keywords as f32 / a.total_keywords.max(1) as f32 + a.phrase_bonus;
            let score_b = b.matched_keywords as f32 / b.total_keywords.max(1) as f32 + b.phrase_bonus;
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        hits
    }

    fn vector_search(&self, query_embedding: &[f32], top_k: usize, category_filter: Option<&str>) -> Vec<VectorHit> {
        let inner = self.inner.read();
        let mut scored: Vec<VectorHit> = inner
            .chunks
            .iter()
            .filter(|(_, chunk)| {
                category_filter
                    .map(|cat| {
                        inner
                            .documents
                            .get(&chunk.doc_id)
                            .and_then(|d| d.category.as_deref())
                            == Some(cat)
                    })
                    .unwrap_or(true)
            })
            .map(|(cid, chunk)| VectorHit {
                chunk_id: cid.clone(),
                cosine: cosine_similarity(query_embedding, &chunk.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.cosine.partial_cmp(&a.cosine).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    fn entity_lookup(&self, normalized: &str, entity_type: EntityType) -> Option<Entity> {
        self.get_entity_by_key(normalized, entity_type)
    }

    fn replace_related(&self, edges: &[(EntityId, EntityId, u32)]) -> Result<(), StoreError> {
        if edges.iter().any(|(a, b, _)| a == b) {
            return Err(StoreError::InvariantViolation("self-loop RELATED_TO edge".into()));
        }
        let mut inner = self.inner.write();
        inner.related = edges.iter().map(|&(a, b, strength)| (unordered_pair(a, b), strength)).collect();
        Ok(())
    }

    fn apply_community_metrics(&self, assignments: &[(EntityId, EntityMetrics)]) {
        let mut inner = self.inner.write();
        let mut sizes: HashMap<u32, usize> = HashMap::new();

        for (id, metrics) in assignments {
            if let Some(e) = inner.entities.get_mut(id.0 as usize) {
                e.community_id = Some(metrics.community_id);
                e.degree_centrality = metrics.degree_centrality;
                e.betweenness_centrality = metrics.betweenness_centrality;
                e.is_bridge = metrics.is_bridge;
                e.connected_communities = metrics.connected_communities;
                *sizes.entry(metrics.community_id).or_insert(0) += 1;
            }
        }

        inner.communities = sizes.into_iter().map(|(id, size)| (id, Community { id, size })).collect();
    }

    fn schema_summary(&self) -> SchemaSummary {
        let inner = self.inner.read();
        let mut relationship_counts = HashMap::new();
        let has_chunk: usize = inner.doc_chunk_order.values().map(|v| v.len()).sum();
        let next_chunk: usize = inner.doc_chunk_order.values().map(|v| v.len().saturating_sub(1)).sum();
        let contains_entity: usize = inner.chunk_entities.values().map(|v| v.len()).sum();
        relationship_counts.insert("HAS_CHUNK".to_string(), has_chunk);
        relationship_counts.insert("NEXT_CHUNK".to_string(), next_chunk);
        relationship_counts.insert("CONTAINS_ENTITY".to_string(), contains_entity);
        relationship_counts.insert("RELATED_TO".to_string(), inner.related.len());

        SchemaSummary {
            document_count: inner.documents.len(),
            chunk_count: inner.chunks.len(),
            entity_count: inner.entities.len(),
            relationship_counts,
        }
    }

    fn export(&self) -> ExportedGraph {
        let inner = self.inner.read();
        let mut nodes = Vec::new();
        let mut relationships = Vec::new();

        for doc in inner.documents.values() {
            nodes.push(ExportedNode::from_document(doc));
        }
        for (cid, chunk) in &inner.chunks {
            nodes.push(ExportedNode::from_chunk(cid, chunk));
        }
        for entity in &inner.entities {
            nodes.push(ExportedNode::from_entity(entity));
        }

        for (doc_id, chunk_ids) in &inner.doc_chunk_order {
            for (i, cid) in chunk_ids.iter().enumerate() {
                relationships.push(ExportedRelationship::has_chunk(doc_id, cid, i));
                if i > 0 {
                    relationships.push(ExportedRelationship::next_chunk(&chunk_ids[i - 1], cid));
                }
            }
        }
        for (cid, links) in &inner.chunk_entities {
            for (entity_id, confidence) in links {
                relationships.push(ExportedRelationship::contains_entity(cid, entity_id.0, *confidence));
            }
        }
        for (&(a, b), &strength) in &inner.related {
            relationships.push(ExportedRelationship::related_to(a.0, b.0, strength));
        }

        ExportedGraph::new(nodes, relationships)
    }

    fn import(&self, data: ExportedGraph) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        *inner = Inner::default();
        data.apply_to(&mut inner)
    }

    fn communities(&self) -> Vec<Community> {
        self.inner.read().communities.values().cloned().collect()
    }
}

// `Inner` is private to this module, so the import side of the export
// format is implemented here rather than in `persistence`, which only
// defines the wire schema and its (de)serialization.
impl ExportedGraph {
    pub(crate) fn apply_to(self, inner: &mut Inner) -> Result<(), StoreError> {
        use crate::persistence::ExportedNodeKind;

        let mut chunk_order_positions: HashMap<String, Vec<(usize, String)>> = HashMap::new();

        for node in &self.nodes {
            match &node.kind {
                ExportedNodeKind::Document { total_pages, category, division, chunk_count, status } => {
                    let mut doc = Document::new(node.id.clone(), *total_pages);
                    doc.category = category.clone();
                    doc.division = division.clone();
                    doc.chunk_count = *chunk_count;
                    doc.status = *status;
                    inner.documents.insert(node.id.clone(), doc);
                }
                ExportedNodeKind::Chunk {
                    doc_id,
                    chunk_index,
                    page_num,
                    text,
                    embedding,
                    semantic_density,
                    chunk_type,
                    has_definitions,
                    has_examples,
                } => {
                    let chunk = Chunk {
                        id: node.id.clone(),
                        doc_id: doc_id.clone(),
                        chunk_index: *chunk_index,
                        page_num: *page_num,
                        text: text.clone(),
                        embedding: embedding.clone(),
                        semantic_density: *semantic_density,
                        chunk_type: *chunk_type,
                        has_definitions: *has_definitions,
                        has_examples: *has_examples,
                    };
                    inner.chunks.insert(node.id.clone(), chunk);
                    chunk_order_positions.entry(doc_id.clone()).or_default().push((*chunk_index, node.id.clone()));
                }
                ExportedNodeKind::Entity {
                    normalized,
                    entity_type,
                    occurrences,
                    community_id,
                    degree_centrality,
                    betweenness_centrality,
                    is_bridge,
                    connected_communities,
                } => {
                    let idx: u32 = node.id.parse().map_err(|_| {
                        StoreError::InvariantViolation(format!("non-numeric entity id in export: {}", node.id))
                    })?;
                    let mut entity = Entity::new(EntityId(idx), normalized.clone(), normalized.clone(), *entity_type);
                    entity.occurrences = *occurrences;
                    entity.community_id = *community_id;
                    entity.degree_centrality = *degree_centrality;
                    entity.betweenness_centrality = *betweenness_centrality;
                    entity.is_bridge = *is_bridge;
                    entity.connected_communities = *connected_communities;
                    while inner.entities.len() <= idx as usize {
                        let pad_id = EntityId(inner.entities.len() as u32);
                        inner.entities.push(Entity::new(pad_id, "", "", EntityType::Other));
                    }
                    inner.entities[idx as usize] = entity;
                    inner.entity_index.insert((normalized.clone(), *entity_type), EntityId(idx));
                }
            }
        }

        for (doc_id, mut positions) in chunk_order_positions {
            positions.sort_by_key(|(idx, _)| *idx);
            inner.doc_chunk_order.insert(doc_id, positions.into_iter().map(|(_, id)| id).collect());
        }

        for rel in &self.relationships {
            use crate::persistence::ExportedRelationshipKind;
            match &rel.kind {
                ExportedRelationshipKind::HasChunk | ExportedRelationshipKind::NextChunk => {
                    // Membership/order already reconstructed from chunk nodes above.
                }
                ExportedRelationshipKind::ContainsEntity { chunk_id, entity_id, confidence } => {
                    inner
                        .chunk_entities
                        .entry(chunk_id.clone())
                        .or_default()
                        .push((EntityId(*entity_id), *confidence));
                    inner
                        .entity_chunks
                        .entry(EntityId(*entity_id))
                        .or_default()
                        .push((chunk_id.clone(), *confidence));
                }
                ExportedRelationshipKind::RelatedTo { a, b, strength } => {
                    inner.related.insert(unordered_pair(EntityId(*a), EntityId(*b)), *strength);
                }
            }
        }

        let mut sizes: HashMap<u32, usize> = HashMap::new();
        for e in &inner.entities {
            if let Some(cid) = e.community_id {
                *sizes.entry(cid).or_insert(0) += 1;
            }
        }
        inner.communities = sizes.into_iter().map(|(id, size)| (id, Community { id, size })).collect();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChunkType, Document};

    fn sample_chunk(doc_id: &str, idx: usize, page: usize) -> Chunk {
        Chunk {
            id: make_chunk_id(doc_id, idx),
            doc_id: doc_id.to_string(),
            chunk_index: idx,
            page_num: page,
            text: format!("chunk {idx} text"),
            embedding: vec![1.0, 0.0, 0.0],
            semantic_density: 0.5,
            chunk_type: ChunkType::Content,
            has_definitions: false,
            has_examples: false,
        }
    }

    #[test]
    fn commit_and_cascade_delete_leaves_no_residue() {
        let store = InMemoryGraphStore::new();
        let write = DocumentWrite {
            document: Document::new("doc1", 1),
            chunks: vec![sample_chunk("doc1", 0, 1)],
            entity_links: vec![],
        };
        store.commit_document(write).unwrap();
        assert!(store.get_document("doc1").is_some());

        store.delete_document_cascade("doc1").unwrap();
        assert!(store.get_document("doc1").is_none());
        assert!(store.chunks_for_document("doc1").is_empty());
    }

    #[test]
    fn reingest_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let write = |n| DocumentWrite {
            document: Document::new("doc1", 1),
            chunks: (0..n).map(|i| sample_chunk("doc1", i, 1)).collect(),
            entity_links: vec![],
        };
        store.commit_document(write(3)).unwrap();
        store.commit_document(write(3)).unwrap();
        assert_eq!(store.chunks_for_document("doc1").len(), 3);
        assert_eq!(store.schema_summary().document_count, 1);
    }

    #[test]
    fn entity_upsert_increments_occurrences() {
        let store = InMemoryGraphStore::new();
        let write = DocumentWrite {
            document: Document::new("doc1", 1),
            chunks: vec![sample_chunk("doc1", 0, 1), sample_chunk("doc1", 1, 1)],
            entity_links: vec![
                (0, "fx_forward".into(), "FX Forward".into(), EntityType::Product, 0.85),
                (1, "fx_forward".into(), "FX Forward".into(), EntityType::Product, 0.85),
            ],
        };
        store.commit_document(write).unwrap();
        let entity = store.get_entity_by_key("fx_forward", EntityType::Product).unwrap();
        assert_eq!(entity.occurrences, 2);
    }
}
