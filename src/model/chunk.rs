use serde::{Deserialize, Serialize};

/// Priority order when more than one classification applies:
/// table > definition > example > content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Content,
    Definition,
    Example,
    Table,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// `{doc_id}#{chunk_index}`.
    pub id: String,
    pub doc_id: String,
    pub chunk_index: usize,
    pub page_num: usize,
    pub text: String,
    pub embedding: Vec<f32>,
    pub semantic_density: f32,
    pub chunk_type: ChunkType,
    pub has_definitions: bool,
    pub has_examples: bool,
}

impl Chunk {
    /// L2 norm of `embedding`; used to assert the normalization invariant.
    pub fn embedding_norm(&self) -> f32 {
        self.embedding.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}
