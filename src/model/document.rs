use serde::{Deserialize, Serialize};

/// `pending` → `ingested` → `validated`, or `failed` with no residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Ingested,
    Validated,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Filename; unique across the store.
    pub id: String,
    pub total_pages: usize,
    pub category: Option<String>,
    pub division: Option<String>,
    pub chunk_count: usize,
    pub status: DocumentStatus,
}

impl Document {
    pub fn new(id: impl Into<String>, total_pages: usize) -> Self {
        Self {
            id: id.into(),
            total_pages,
            category: None,
            division: None,
            chunk_count: 0,
            status: DocumentStatus::Pending,
        }
    }
}
