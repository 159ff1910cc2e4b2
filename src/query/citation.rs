//! # Citation Assembler (C11)
//!
//! Pure projection from a ranked candidate to the externally visible
//! citation shape; performs no further scoring or text synthesis, per
//! spec.md §4.11's "no answer text synthesis is performed".

use crate::graph::GraphStore;
use crate::query::rerank::RankedCandidate;

#[derive(Debug, Clone)]
pub struct Citation {
    pub document_id: String,
    pub document_name: String,
    pub page_num: usize,
    pub chunk_id: String,
    pub text: String,
    pub final_score: f32,
    pub source_tags: Vec<String>,
    /// Present only when the document carries hierarchy metadata.
    pub hierarchy: Option<Hierarchy>,
}

#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub division: Option<String>,
    pub category: Option<String>,
    pub product: Option<String>,
    pub document: String,
}

/// Build one citation per ranked candidate. `document_id` doubles as
/// `document_name` (the id is the filename, per spec.md §3's Document
/// attribute table), and the hierarchy overlay is populated whenever the
/// owning document carries `division`/`category` metadata — independent of
/// community membership, per spec.md §9's open-question resolution that the
/// two labeling schemes are unrelated.
pub fn assemble(store: &dyn GraphStore, ranked: &[RankedCandidate]) -> Vec<Citation> {
    ranked
        .iter()
        .map(|r| {
            let document = store.get_document(&r.chunk.doc_id);
            let hierarchy = document.as_ref().map(|d| Hierarchy {
                division: d.division.clone(),
                category: d.category.clone(),
                product: None,
                document: d.id.clone(),
            });
            Citation {
                document_id: r.chunk.doc_id.clone(),
                document_name: r.chunk.doc_id.clone(),
                page_num: r.chunk.page_num,
                chunk_id: r.chunk.id.clone(),
                text: r.chunk.text.clone(),
                final_score: r.final_score,
                source_tags: r.source_tag.split(',').map(|s| s.to_string()).collect(),
                hierarchy,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InMemoryGraphStore;
    use crate::model::{Chunk, ChunkType, Document};

    fn sample_chunk() -> Chunk {
        Chunk {
            id: "doc1#0".into(),
            doc_id: "doc1".into(),
            chunk_index: 0,
            page_num: 12,
            text: "An FX Forward is a contract.".into(),
            embedding: vec![0.0; 4],
            semantic_density: 0.5,
            chunk_type: ChunkType::Definition,
            has_definitions: true,
            has_examples: false,
        }
    }

    #[test]
    fn assembles_citation_with_hierarchy_when_document_has_metadata() {
        let store = InMemoryGraphStore::new();
        let mut doc = Document::new("doc1", 25);
        doc.division = Some("Treasury".into());
        doc.category = Some("FX".into());
        store
            .commit_document(crate::graph::DocumentWrite {
                document: doc,
                chunks: vec![sample_chunk()],
                entity_links: vec![],
            })
            .unwrap();

        let ranked = vec![crate::query::rerank::RankedCandidate {
            chunk: sample_chunk(),
            final_score: 0.9,
            source_tag: "hybrid".into(),
        }];
        let citations = assemble(&store, &ranked);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].page_num, 12);
        assert_eq!(citations[0].document_name, "doc1");
        let hierarchy = citations[0].hierarchy.as_ref().unwrap();
        assert_eq!(hierarchy.division.as_deref(), Some("Treasury"));
    }
}
