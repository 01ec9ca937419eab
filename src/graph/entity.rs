//! Entity and relation types of the knowledge graph.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Coarse classification of an extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// All-caps token such as `RAG` or `SQL`.
    Acronym,
    /// Multi-word capitalized phrase such as `Acme Robotics`.
    Name,
    /// Single capitalized word.
    Term,
}

impl EntityKind {
    /// Returns the storage name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acronym => "acronym",
            Self::Name => "name",
            Self::Term => "term",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acronym" => Ok(Self::Acronym),
            "name" => Ok(Self::Name),
            "term" => Ok(Self::Term),
            other => Err(GraphError::Extraction(format!("unknown entity kind: {other}"))),
        }
    }
}

/// How two entities came to be related.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Both entities appear in the same sentence.
    CoSentence,
    /// Both entities appear in the same chunk but never share a sentence.
    CoChunk,
}

impl RelationKind {
    /// Weight contributed by a single co-occurrence.
    #[must_use]
    pub const fn base_weight(self) -> f64 {
        match self {
            Self::CoSentence => 1.0,
            Self::CoChunk => 0.25,
        }
    }

    /// Returns the storage name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CoSentence => "co_sentence",
            Self::CoChunk => "co_chunk",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "co_sentence" => Ok(Self::CoSentence),
            "co_chunk" => Ok(Self::CoChunk),
            other => Err(GraphError::Extraction(format!(
                "unknown relation kind: {other}"
            ))),
        }
    }
}

/// A node of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Storage identifier.
    pub id: i64,

    /// Surface form as first seen.
    pub name: String,

    /// Lookup key, see [`normalize_entity`].
    pub normalized: String,

    /// Entity classification.
    pub kind: EntityKind,

    /// Total mentions across all chunks.
    pub mention_count: usize,
}

/// An undirected, weighted edge between two entities.
///
/// `source_id` is always the smaller id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Smaller entity id.
    pub source_id: i64,
    /// Larger entity id.
    pub target_id: i64,
    /// Relation kind.
    pub kind: RelationKind,
    /// Accumulated weight.
    pub weight: f64,
}

impl Relation {
    /// Creates a relation, ordering the endpoints.
    #[must_use]
    pub fn new(a: i64, b: i64, kind: RelationKind, weight: f64) -> Self {
        Self {
            source_id: a.min(b),
            target_id: a.max(b),
            kind,
            weight,
        }
    }
}

/// Occurrences of an entity within one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    /// Entity id.
    pub entity_id: i64,
    /// Chunk id.
    pub chunk_id: i64,
    /// Number of occurrences in the chunk.
    pub count: usize,
}

/// Normalizes an entity name for lookup: lowercase, single-spaced.
///
/// # Examples
///
/// ```
/// use ardharag::graph::normalize_entity;
///
/// assert_eq!(normalize_entity("  Acme   Robotics "), "acme robotics");
/// ```
#[must_use]
pub fn normalize_entity(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_names() {
        for kind in [EntityKind::Acronym, EntityKind::Name, EntityKind::Term] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        for kind in [RelationKind::CoSentence, RelationKind::CoChunk] {
            assert_eq!(kind.to_string().parse::<RelationKind>().unwrap(), kind);
        }
        assert!("person".parse::<EntityKind>().is_err());
        assert!("cites".parse::<RelationKind>().is_err());
    }

    #[test]
    fn test_relation_orders_endpoints() {
        let rel = Relation::new(9, 4, RelationKind::CoChunk, 0.25);
        assert_eq!((rel.source_id, rel.target_id), (4, 9));
    }

    #[test]
    fn test_base_weights() {
        assert!((RelationKind::CoSentence.base_weight() - 1.0).abs() < f64::EPSILON);
        assert!((RelationKind::CoChunk.base_weight() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_normalize_entity() {
        assert_eq!(normalize_entity("SQLite"), "sqlite");
        assert_eq!(normalize_entity("New\tYork  City"), "new york city");
        assert_eq!(normalize_entity(""), "");
    }
}
