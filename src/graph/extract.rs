//! Entity extraction from chunk text.
//!
//! [`PatternExtractor`] is a lightweight, model-free extractor: capitalized
//! word runs and acronyms are entities, and entities that share a sentence
//! or a chunk are related.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use regex::Regex;

use super::entity::{EntityKind, RelationKind, normalize_entity};
use crate::error::{GraphError, Result};
use crate::io::sentence_spans;

/// Default cap on entities kept per chunk.
pub const DEFAULT_MAX_ENTITIES_PER_CHUNK: usize = 24;

/// Default minimum entity length in characters.
pub const DEFAULT_MIN_ENTITY_LEN: usize = 2;

/// Capitalized words (with inner hyphens/apostrophes) joined by spaces or tabs.
const CAPITALIZED_RUN: &str =
    r"\b\p{Lu}[\p{L}\p{N}]*(?:['-][\p{L}\p{N}]+)*(?:[ \t]+\p{Lu}[\p{L}\p{N}]*(?:['-][\p{L}\p{N}]+)*)*";

/// Words that are capitalized by position rather than by being names.
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "an", "and", "any", "are", "as", "at", "be", "because",
    "before", "both", "but", "by", "can", "could", "do", "does", "each", "even", "every", "for",
    "from", "had", "has", "have", "he", "her", "here", "his", "how", "however", "i", "if", "in",
    "into", "is", "it", "its", "just", "many", "may", "more", "most", "much", "my", "no", "not",
    "now", "of", "on", "once", "one", "only", "or", "other", "our", "she", "should", "since",
    "so", "some", "such", "than", "that", "the", "their", "then", "there", "these", "they",
    "this", "those", "thus", "to", "two", "use", "using", "was", "we", "were", "what", "when",
    "where", "whether", "which", "while", "who", "why", "will", "with", "would", "yes", "you",
    "your",
];

/// An entity found in one piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntity {
    /// Surface form of the first occurrence.
    pub name: String,
    /// Normalized lookup key.
    pub normalized: String,
    /// Classification.
    pub kind: EntityKind,
    /// Occurrences in the text.
    pub count: usize,
}

/// A relation between two extracted entities, keyed by normalized names.
///
/// `source` sorts before `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRelation {
    /// Lexicographically smaller normalized name.
    pub source: String,
    /// Lexicographically larger normalized name.
    pub target: String,
    /// Relation kind.
    pub kind: RelationKind,
    /// Weight within this text.
    pub weight: f64,
}

/// Entities and relations found in one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Entities ordered by count descending, then first appearance.
    pub entities: Vec<ExtractedEntity>,
    /// Relations ordered by kind, source, target.
    pub relations: Vec<ExtractedRelation>,
}

impl Extraction {
    /// Returns `true` if nothing was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Trait for entity extractors.
///
/// Implementations must be deterministic and thread-safe; ingestion runs
/// extraction for many chunks in parallel.
pub trait EntityExtractor: Send + Sync {
    /// Extracts entities and relations from `text`.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction fails.
    fn extract(&self, text: &str) -> Result<Extraction>;

    /// Returns the extractor name.
    fn name(&self) -> &'static str;
}

/// Regex-based extractor for capitalized phrases and acronyms.
///
/// # Examples
///
/// ```
/// use ardharag::graph::{EntityExtractor, PatternExtractor};
///
/// let extractor = PatternExtractor::new().unwrap();
/// let extraction = extractor.extract("The Acme Robotics team uses ROS daily.").unwrap();
/// let names: Vec<_> = extraction.entities.iter().map(|e| e.normalized.as_str()).collect();
/// assert_eq!(names, vec!["acme robotics", "ros"]);
/// ```
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    pattern: Regex,
    min_len: usize,
    max_entities: usize,
}

#[derive(Debug)]
struct Candidate {
    name: String,
    kind: EntityKind,
    count: usize,
    first_seen: usize,
}

impl PatternExtractor {
    /// Creates an extractor with default limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in pattern fails to compile.
    pub fn new() -> Result<Self> {
        Self::with_limits(DEFAULT_MIN_ENTITY_LEN, DEFAULT_MAX_ENTITIES_PER_CHUNK)
    }

    /// Creates an extractor with custom limits. `max_entities == 0` means
    /// unlimited.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in pattern fails to compile.
    pub fn with_limits(min_len: usize, max_entities: usize) -> Result<Self> {
        let pattern = Regex::new(CAPITALIZED_RUN).map_err(GraphError::from)?;
        Ok(Self {
            pattern,
            min_len: min_len.max(1),
            max_entities,
        })
    }

    /// Turns a regex match into an entity surface form, if it qualifies.
    fn candidate(&self, raw: &str) -> Option<(String, EntityKind)> {
        let words: Vec<&str> = raw
            .split_whitespace()
            .skip_while(|word| is_stopword(word))
            .collect();
        if words.is_empty() {
            return None;
        }

        let name = words.join(" ");
        if name.chars().count() < self.min_len {
            return None;
        }

        let kind = if words.len() > 1 {
            EntityKind::Name
        } else if is_acronym(&name) {
            EntityKind::Acronym
        } else {
            EntityKind::Term
        };
        Some((name, kind))
    }
}

impl EntityExtractor for PatternExtractor {
    fn extract(&self, text: &str) -> Result<Extraction> {
        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        let mut sentences: Vec<BTreeSet<String>> = Vec::new();
        let mut order = 0;

        for (_, sentence) in sentence_spans(text) {
            let mut in_sentence = BTreeSet::new();
            for found in self.pattern.find_iter(sentence) {
                let Some((name, kind)) = self.candidate(found.as_str()) else {
                    continue;
                };
                let normalized = normalize_entity(&name);
                candidates
                    .entry(normalized.clone())
                    .and_modify(|c| c.count += 1)
                    .or_insert_with(|| Candidate {
                        name,
                        kind,
                        count: 1,
                        first_seen: order,
                    });
                order += 1;
                in_sentence.insert(normalized);
            }
            sentences.push(in_sentence);
        }

        let mut ranked: Vec<(String, Candidate)> = candidates.into_iter().collect();
        ranked.sort_by(|(_, a), (_, b)| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.first_seen.cmp(&b.first_seen))
        });
        if self.max_entities > 0 {
            ranked.truncate(self.max_entities);
        }
        let kept: BTreeSet<&str> = ranked.iter().map(|(key, _)| key.as_str()).collect();

        let mut pair_weights: BTreeMap<(RelationKind, String, String), f64> = BTreeMap::new();
        let mut co_sentence: BTreeSet<(String, String)> = BTreeSet::new();
        for sentence in &sentences {
            let present: Vec<&String> = sentence
                .iter()
                .filter(|key| kept.contains(key.as_str()))
                .collect();
            for (i, a) in present.iter().enumerate() {
                for b in &present[i + 1..] {
                    let pair = ((*a).clone(), (*b).clone());
                    *pair_weights
                        .entry((RelationKind::CoSentence, pair.0.clone(), pair.1.clone()))
                        .or_insert(0.0) += RelationKind::CoSentence.base_weight();
                    co_sentence.insert(pair);
                }
            }
        }

        let all: Vec<&str> = kept.iter().copied().collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                let pair = ((*a).to_string(), (*b).to_string());
                if !co_sentence.contains(&pair) {
                    pair_weights.insert(
                        (RelationKind::CoChunk, pair.0, pair.1),
                        RelationKind::CoChunk.base_weight(),
                    );
                }
            }
        }

        let entities = ranked
            .into_iter()
            .map(|(normalized, c)| ExtractedEntity {
                name: c.name,
                normalized,
                kind: c.kind,
                count: c.count,
            })
            .collect();
        let relations = pair_weights
            .into_iter()
            .map(|((kind, source, target), weight)| ExtractedRelation {
                source,
                target,
                kind,
                weight,
            })
            .collect();

        Ok(Extraction {
            entities,
            relations,
        })
    }

    fn name(&self) -> &'static str {
        "pattern"
    }
}

fn is_stopword(word: &str) -> bool {
    let lower = word.to_lowercase();
    STOPWORDS.binary_search(&lower.as_str()).is_ok()
}

fn is_acronym(word: &str) -> bool {
    let mut letters = word.chars().filter(|c| c.is_alphabetic()).peekable();
    letters.peek().is_some() && letters.all(char::is_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(extraction: &Extraction) -> Vec<&str> {
        extraction
            .entities
            .iter()
            .map(|e| e.normalized.as_str())
            .collect()
    }

    #[test]
    fn test_stopwords_sorted_for_binary_search() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn test_extracts_names_acronyms_and_terms() {
        let extractor = PatternExtractor::new().unwrap();
        let extraction = extractor
            .extract("Acme Robotics builds robots. NASA buys them. Rust powers everything.")
            .unwrap();

        let kinds: HashMap<&str, EntityKind> = extraction
            .entities
            .iter()
            .map(|e| (e.normalized.as_str(), e.kind))
            .collect();
        assert_eq!(kinds.get("acme robotics"), Some(&EntityKind::Name));
        assert_eq!(kinds.get("nasa"), Some(&EntityKind::Acronym));
        assert_eq!(kinds.get("rust"), Some(&EntityKind::Term));
    }

    #[test]
    fn test_strips_leading_stopwords() {
        let extractor = PatternExtractor::new().unwrap();
        let extraction = extractor.extract("The Burrow is quiet. This is fine.").unwrap();
        assert_eq!(names(&extraction), vec!["burrow"]);
    }

    #[test]
    fn test_min_length_filter() {
        let extractor = PatternExtractor::with_limits(4, 0).unwrap();
        let extraction = extractor.extract("Go and Rust and Zig are languages.").unwrap();
        assert_eq!(names(&extraction), vec!["rust"]);
    }

    #[test]
    fn test_counts_and_ordering() {
        let extractor = PatternExtractor::new().unwrap();
        let extraction = extractor
            .extract("Alpha met Beta. Beta met Gamma. Beta left.")
            .unwrap();
        assert_eq!(names(&extraction), vec!["beta", "alpha", "gamma"]);
        assert_eq!(extraction.entities[0].count, 3);
    }

    #[test]
    fn test_max_entities_cap() {
        let extractor = PatternExtractor::with_limits(2, 2).unwrap();
        let extraction = extractor
            .extract("Alpha met Beta. Beta met Gamma. Beta left.")
            .unwrap();
        assert_eq!(names(&extraction), vec!["beta", "alpha"]);
        assert!(
            extraction
                .relations
                .iter()
                .all(|r| r.source != "gamma" && r.target != "gamma")
        );
    }

    #[test]
    fn test_relations_sentence_and_chunk() {
        let extractor = PatternExtractor::new().unwrap();
        let extraction = extractor
            .extract("Alpha met Beta. Alpha met Beta again. Gamma stayed home.")
            .unwrap();

        let find = |s: &str, t: &str| {
            extraction
                .relations
                .iter()
                .find(|r| r.source == s && r.target == t)
                .cloned()
        };

        let ab = find("alpha", "beta").unwrap();
        assert_eq!(ab.kind, RelationKind::CoSentence);
        assert!((ab.weight - 2.0).abs() < f64::EPSILON);

        let ag = find("alpha", "gamma").unwrap();
        assert_eq!(ag.kind, RelationKind::CoChunk);
        assert!((ag.weight - 0.25).abs() < f64::EPSILON);

        assert!(extraction.relations.iter().all(|r| r.source < r.target));
    }

    #[test]
    fn test_empty_and_lowercase_text() {
        let extractor = PatternExtractor::new().unwrap();
        assert!(extractor.extract("").unwrap().is_empty());
        assert!(extractor.extract("nothing capitalized here").unwrap().is_empty());
    }

    #[test]
    fn test_runs_do_not_cross_lines() {
        let extractor = PatternExtractor::new().unwrap();
        let extraction = extractor.extract("Project Atlas\nBudget Review").unwrap();
        let found = names(&extraction);
        assert!(found.contains(&"project atlas"));
        assert!(found.contains(&"budget review"));
    }
}
