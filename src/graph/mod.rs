//! Knowledge graph over entities mentioned in indexed chunks.
//!
//! Entities are nodes; co-occurrence relations are undirected weighted
//! edges. The graph is persisted by the storage layer and loaded into a
//! [`KnowledgeGraph`] for traversal, query matching and ranking.

mod entity;
mod extract;
mod rank;

pub use entity::{Entity, EntityKind, Mention, Relation, RelationKind, normalize_entity};
pub use extract::{
    DEFAULT_MAX_ENTITIES_PER_CHUNK, DEFAULT_MIN_ENTITY_LEN, EntityExtractor, ExtractedEntity,
    ExtractedRelation, Extraction, PatternExtractor,
};
pub use rank::{PageRank, PageRankConfig, ScoredEntity};

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Score decay applied per hop during [`KnowledgeGraph::expand`].
pub const HOP_DECAY: f64 = 0.5;

/// Longest query n-gram tried by [`KnowledgeGraph::match_query`].
const MAX_QUERY_NGRAM: usize = 3;

/// In-memory undirected, weighted entity graph.
///
/// # Examples
///
/// ```
/// use ardharag::graph::{Entity, EntityKind, KnowledgeGraph, RelationKind};
///
/// let mut graph = KnowledgeGraph::new();
/// for (id, name) in [(1, "Rust"), (2, "Cargo")] {
///     graph.add_entity(Entity {
///         id,
///         name: name.to_string(),
///         normalized: name.to_lowercase(),
///         kind: EntityKind::Term,
///         mention_count: 1,
///     });
/// }
/// graph.add_edge(1, 2, RelationKind::CoSentence, 1.0);
///
/// assert_eq!(graph.neighbors(1), vec![(2, 1.0)]);
/// assert_eq!(graph.match_query("how does cargo work?"), vec![2]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    entities: BTreeMap<i64, Entity>,
    by_name: HashMap<String, i64>,
    /// entity -> neighbour -> total weight over all relation kinds
    adjacency: BTreeMap<i64, BTreeMap<i64, f64>>,
    /// (smaller id, larger id, kind) -> accumulated weight
    relations: BTreeMap<(i64, i64, RelationKind), f64>,
}

impl KnowledgeGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entity node.
    pub fn add_entity(&mut self, entity: Entity) {
        self.by_name.insert(entity.normalized.clone(), entity.id);
        self.adjacency.entry(entity.id).or_default();
        self.entities.insert(entity.id, entity);
    }

    /// Adds weight to the edge between `a` and `b` for `kind`.
    ///
    /// Returns `false` (and changes nothing) for self-loops, unknown
    /// endpoints, or non-positive weights.
    pub fn add_edge(&mut self, a: i64, b: i64, kind: RelationKind, weight: f64) -> bool {
        if a == b
            || weight <= 0.0
            || !self.entities.contains_key(&a)
            || !self.entities.contains_key(&b)
        {
            return false;
        }

        *self.relations.entry((a.min(b), a.max(b), kind)).or_insert(0.0) += weight;
        *self.adjacency.entry(a).or_default().entry(b).or_insert(0.0) += weight;
        *self.adjacency.entry(b).or_default().entry(a).or_insert(0.0) += weight;
        true
    }

    /// Returns the entity with the given id.
    #[must_use]
    pub fn entity(&self, id: i64) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Finds an entity by name, case- and whitespace-insensitively.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Entity> {
        self.by_name
            .get(&normalize_entity(name))
            .and_then(|id| self.entities.get(id))
    }

    /// Iterates entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Returns all relations, one per (pair, kind), in key order.
    #[must_use]
    pub fn relations(&self) -> Vec<Relation> {
        self.relations
            .iter()
            .map(|(&(source_id, target_id, kind), &weight)| Relation {
                source_id,
                target_id,
                kind,
                weight,
            })
            .collect()
    }

    /// Returns neighbours with their total edge weight, heaviest first.
    #[must_use]
    pub fn neighbors(&self, id: i64) -> Vec<(i64, f64)> {
        let mut neighbors: Vec<(i64, f64)> = self
            .adjacency
            .get(&id)
            .map(|edges| edges.iter().map(|(&n, &w)| (n, w)).collect())
            .unwrap_or_default();
        neighbors.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        neighbors
    }

    /// Number of distinct neighbours.
    #[must_use]
    pub fn degree(&self, id: i64) -> usize {
        self.adjacency.get(&id).map_or(0, BTreeMap::len)
    }

    /// Sum of edge weights incident to `id`.
    #[must_use]
    pub fn weighted_degree(&self, id: i64) -> f64 {
        self.adjacency
            .get(&id)
            .map_or(0.0, |edges| edges.values().sum())
    }

    /// Number of entities.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of connected entity pairs.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeMap::len).sum::<usize>() / 2
    }

    /// Returns `true` if the graph has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Breadth-first traversal up to `depth` hops.
    ///
    /// Returns `(entity, hops)` pairs excluding `start`, ordered by hops
    /// then id.
    #[must_use]
    pub fn traverse(&self, start: i64, depth: usize) -> Vec<(i64, usize)> {
        if !self.entities.contains_key(&start) {
            return Vec::new();
        }

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);
        let mut result = Vec::new();

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            if let Some(edges) = self.adjacency.get(&current) {
                for &neighbor in edges.keys() {
                    if visited.insert(neighbor) {
                        result.push((neighbor, hops + 1));
                        queue.push_back((neighbor, hops + 1));
                    }
                }
            }
        }

        result.sort_unstable_by_key(|&(id, hops)| (hops, id));
        result
    }

    /// Finds entities named in a free-text query.
    ///
    /// Every 1 to 3 word n-gram of the query (punctuation trimmed) is
    /// normalized and looked up. Returns matching ids, ascending.
    #[must_use]
    pub fn match_query(&self, query: &str) -> Vec<i64> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();

        let mut matched: Vec<i64> = Vec::new();
        for n in 1..=MAX_QUERY_NGRAM.min(words.len()) {
            for gram in words.windows(n) {
                if let Some(&id) = self.by_name.get(&gram.join(" ")) {
                    matched.push(id);
                }
            }
        }
        matched.sort_unstable();
        matched.dedup();
        matched
    }

    /// Spreads relevance from `seeds` through the graph.
    ///
    /// Seeds score 1.0. Each hop scores `parent * 0.5 * w / (w + 1)` where
    /// `w` is the edge weight; an entity keeps its best score over all
    /// paths. Results are sorted by score descending, then id.
    #[must_use]
    pub fn expand(&self, seeds: &[i64], depth: usize) -> Vec<(i64, f64)> {
        let mut best: HashMap<i64, f64> = seeds
            .iter()
            .filter(|id| self.entities.contains_key(id))
            .map(|&id| (id, 1.0))
            .collect();
        let mut frontier: Vec<(i64, f64)> = best.iter().map(|(&id, &s)| (id, s)).collect();

        for _ in 0..depth {
            let mut next = Vec::new();
            for &(node, score) in &frontier {
                let Some(edges) = self.adjacency.get(&node) else {
                    continue;
                };
                for (&neighbor, &weight) in edges {
                    let candidate = score * HOP_DECAY * weight / (weight + 1.0);
                    let entry = best.entry(neighbor).or_insert(0.0);
                    if candidate > *entry {
                        *entry = candidate;
                        next.push((neighbor, candidate));
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        let mut scored: Vec<(i64, f64)> = best.into_iter().collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: i64, name: &str) -> Entity {
        Entity {
            id,
            name: name.to_string(),
            normalized: normalize_entity(name),
            kind: EntityKind::Term,
            mention_count: 1,
        }
    }

    /// 1 - 2 - 3 - 4, plus 1 - 5
    fn chain() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        for (id, name) in [(1, "Alpha"), (2, "Beta"), (3, "Gamma"), (4, "Delta"), (5, "Acme Corp")] {
            graph.add_entity(entity(id, name));
        }
        graph.add_edge(1, 2, RelationKind::CoSentence, 1.0);
        graph.add_edge(2, 3, RelationKind::CoSentence, 3.0);
        graph.add_edge(3, 4, RelationKind::CoChunk, 0.25);
        graph.add_edge(1, 5, RelationKind::CoChunk, 0.25);
        graph
    }

    #[test]
    fn test_add_edge_accumulates_per_kind() {
        let mut graph = chain();
        assert!(graph.add_edge(2, 1, RelationKind::CoSentence, 1.0));
        assert!(graph.add_edge(1, 2, RelationKind::CoChunk, 0.25));

        assert_eq!(graph.edge_count(), 4);
        assert!((graph.weighted_degree(1) - 2.5).abs() < 1e-9);
        let relations = graph.relations();
        let co_sentence = relations
            .iter()
            .find(|r| r.source_id == 1 && r.target_id == 2 && r.kind == RelationKind::CoSentence)
            .unwrap();
        assert!((co_sentence.weight - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_add_edge_rejects_invalid() {
        let mut graph = chain();
        assert!(!graph.add_edge(1, 1, RelationKind::CoSentence, 1.0));
        assert!(!graph.add_edge(1, 99, RelationKind::CoSentence, 1.0));
        assert!(!graph.add_edge(1, 3, RelationKind::CoSentence, 0.0));
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_find_and_degree() {
        let graph = chain();
        assert_eq!(graph.find("ACME   corp").map(|e| e.id), Some(5));
        assert!(graph.find("nobody").is_none());
        assert_eq!(graph.degree(2), 2);
        assert_eq!(graph.degree(42), 0);
        assert_eq!(graph.node_count(), 5);
    }

    #[test]
    fn test_neighbors_heaviest_first() {
        let graph = chain();
        assert_eq!(graph.neighbors(2), vec![(3, 3.0), (1, 1.0)]);
        assert!(graph.neighbors(42).is_empty());
    }

    #[test]
    fn test_traverse_orders_by_depth_then_id() {
        let graph = chain();
        assert_eq!(graph.traverse(1, 1), vec![(2, 1), (5, 1)]);
        assert_eq!(graph.traverse(1, 3), vec![(2, 1), (5, 1), (3, 2), (4, 3)]);
        assert!(graph.traverse(1, 0).is_empty());
        assert!(graph.traverse(42, 2).is_empty());
    }

    #[test]
    fn test_match_query_ngrams() {
        let graph = chain();
        assert_eq!(graph.match_query("Who founded Acme Corp?"), vec![5]);
        assert_eq!(graph.match_query("beta, then GAMMA."), vec![2, 3]);
        assert!(graph.match_query("").is_empty());
        assert!(graph.match_query("acme").is_empty());
    }

    #[test]
    fn test_expand_decays_with_weight() {
        let graph = chain();
        let scores: HashMap<i64, f64> = graph.expand(&[2], 2).into_iter().collect();

        assert!((scores[&2] - 1.0).abs() < 1e-9);
        // w = 3: 0.5 * 3/4
        assert!((scores[&3] - 0.375).abs() < 1e-9);
        // w = 1: 0.5 * 1/2
        assert!((scores[&1] - 0.25).abs() < 1e-9);
        // two hops: 0.375 * 0.5 * 0.25/1.25
        assert!((scores[&4] - 0.0375).abs() < 1e-9);
        assert!(!scores.contains_key(&5) || scores[&5] < scores[&1]);
    }

    #[test]
    fn test_expand_sorted_and_ignores_unknown_seeds() {
        let graph = chain();
        let expanded = graph.expand(&[2, 99], 1);
        assert_eq!(expanded[0], (2, 1.0));
        assert!(expanded.windows(2).all(|w| w[0].1 >= w[1].1));
        assert!(graph.expand(&[99], 3).is_empty());
        assert_eq!(graph.expand(&[1], 0), vec![(1, 1.0)]);
    }

    #[test]
    fn test_expand_keeps_best_path() {
        let mut graph = chain();
        // Strong shortcut 1 - 3
        graph.add_edge(1, 3, RelationKind::CoSentence, 9.0);
        let scores: HashMap<i64, f64> = graph.expand(&[1], 2).into_iter().collect();
        assert!((scores[&3] - 0.45).abs() < 1e-9);
    }
}
