use serde::{Deserialize, Serialize};

use chrono::{DateTime, Utc};

/// Arena index into the graph store's entity vector. Stable for the
/// lifetime of the store; never reused after a cascade delete decrements
/// `occurrences` to zero (the entity node itself is never removed — spec.md
/// §GLOSSARY "cascade delete" explicitly leaves Entity nodes in place).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Product,
    Term,
    Amount,
    Percent,
    Org,
    Person,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Surface form as first observed.
    pub text: String,
    /// Casefolded, trimmed, alias-canonicalized key. Unique together with `entity_type`.
    pub normalized: String,
    pub entity_type: EntityType,
    pub first_seen: DateTime<Utc>,
    pub occurrences: u32,
    pub community_id: Option<u32>,
    pub degree_centrality: f64,
    pub betweenness_centrality: f64,
    pub is_bridge: bool,
    pub connected_communities: u32,
}

impl Entity {
    pub fn new(id: EntityId, text: impl Into<String>, normalized: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id,
            text: text.into(),
            normalized: normalized.into(),
            entity_type,
            first_seen: Utc::now(),
            occurrences: 1,
            community_id: None,
            degree_centrality: 0.0,
            betweenness_centrality: 0.0,
            is_bridge: false,
            connected_communities: 0,
        }
    }
}
