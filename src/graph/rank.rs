//! PageRank over the entity graph.
//!
//! Undirected edges are treated as links in both directions, with each
//! node spreading its score in proportion to edge weight.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{EntityKind, KnowledgeGraph};

/// PageRank configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageRankConfig {
    /// Damping factor.
    pub damping: f64,

    /// Maximum iterations.
    pub max_iterations: usize,

    /// Convergence threshold on the largest per-node change.
    pub epsilon: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            epsilon: 1e-6,
        }
    }
}

/// An entity with its centrality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntity {
    /// Entity id.
    pub entity_id: i64,

    /// Display name.
    pub name: String,

    /// Entity kind.
    pub kind: EntityKind,

    /// Centrality in 0.0..=1.0 (the most central entity scores 1.0).
    pub score: f64,

    /// Number of distinct neighbours.
    pub degree: usize,

    /// Total mentions.
    pub mention_count: usize,
}

/// PageRank scorer.
///
/// # Examples
///
/// ```
/// use ardharag::graph::{KnowledgeGraph, PageRank};
///
/// let ranked = PageRank::default().rank(&KnowledgeGraph::new(), 10);
/// assert!(ranked.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PageRank {
    config: PageRankConfig,
}

impl PageRank {
    /// Creates a scorer.
    #[must_use]
    pub const fn new(config: PageRankConfig) -> Self {
        Self { config }
    }

    /// Computes normalized scores for every entity.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(&self, graph: &KnowledgeGraph) -> HashMap<i64, f64> {
        let nodes: Vec<i64> = graph.entities().map(|e| e.id).collect();
        let n = nodes.len();
        if n == 0 {
            return HashMap::new();
        }

        let n_f64 = n as f64;
        let damping = self.config.damping;
        let teleport = (1.0 - damping) / n_f64;

        let out_weight: HashMap<i64, f64> = nodes
            .iter()
            .map(|&id| (id, graph.weighted_degree(id)))
            .collect();
        let mut scores: HashMap<i64, f64> = nodes.iter().map(|&id| (id, 1.0 / n_f64)).collect();

        for _ in 0..self.config.max_iterations {
            // Isolated entities spread their score uniformly
            let dangling: f64 = nodes
                .iter()
                .filter(|&&id| out_weight[&id] <= 0.0)
                .map(|id| scores[id])
                .sum();
            let base = teleport + damping * dangling / n_f64;

            let mut next: HashMap<i64, f64> = HashMap::with_capacity(n);
            let mut max_diff: f64 = 0.0;

            for &node in &nodes {
                let inflow: f64 = graph
                    .neighbors(node)
                    .iter()
                    .map(|&(neighbor, weight)| scores[&neighbor] * weight / out_weight[&neighbor])
                    .sum();
                let score = damping.mul_add(inflow, base);
                max_diff = max_diff.max((score - scores[&node]).abs());
                next.insert(node, score);
            }

            scores = next;
            if max_diff < self.config.epsilon {
                break;
            }
        }

        let max_score = scores.values().copied().fold(0.0_f64, f64::max);
        if max_score > 0.0 {
            for score in scores.values_mut() {
                *score /= max_score;
            }
        }
        scores
    }

    /// Returns the `limit` most central entities, best first (ties by id).
    #[must_use]
    pub fn rank(&self, graph: &KnowledgeGraph, limit: usize) -> Vec<ScoredEntity> {
        let scores = self.compute(graph);

        let mut ranked: Vec<ScoredEntity> = graph
            .entities()
            .map(|entity| ScoredEntity {
                entity_id: entity.id,
                name: entity.name.clone(),
                kind: entity.kind,
                score: scores.get(&entity.id).copied().unwrap_or(0.0),
                degree: graph.degree(entity.id),
                mention_count: entity.mention_count,
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        ranked.truncate(limit);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, RelationKind};

    fn star() -> KnowledgeGraph {
        // Hub 1 connected to 2, 3, 4; 5 isolated
        let mut graph = KnowledgeGraph::new();
        for id in 1..=5 {
            graph.add_entity(Entity {
                id,
                name: format!("E{id}"),
                normalized: format!("e{id}"),
                kind: EntityKind::Term,
                mention_count: 1,
            });
        }
        for leaf in 2..=4 {
            graph.add_edge(1, leaf, RelationKind::CoSentence, 1.0);
        }
        graph
    }

    #[test]
    fn test_pagerank_hub_ranks_first() {
        let ranked = PageRank::default().rank(&star(), 10);
        assert_eq!(ranked[0].entity_id, 1);
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
        assert_eq!(ranked[0].degree, 3);
        assert_eq!(ranked.last().map(|e| e.entity_id), Some(5));
    }

    #[test]
    fn test_pagerank_symmetric_leaves_equal() {
        let scores = PageRank::default().compute(&star());
        assert!((scores[&2] - scores[&3]).abs() < 1e-6);
        assert!((scores[&3] - scores[&4]).abs() < 1e-6);
        assert!(scores.values().all(|&s| (0.0..=1.0).contains(&s)));
    }

    #[test]
    fn test_pagerank_weight_matters() {
        let mut graph = star();
        graph.add_edge(1, 2, RelationKind::CoSentence, 5.0);
        let scores = PageRank::default().compute(&graph);
        assert!(scores[&2] > scores[&3]);
    }

    #[test]
    fn test_pagerank_limit_and_empty() {
        assert_eq!(PageRank::default().rank(&star(), 2).len(), 2);
        assert!(PageRank::default().compute(&KnowledgeGraph::new()).is_empty());
    }
}
