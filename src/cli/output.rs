//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats.

use crate::core::{Chunk, Document, Session};
use crate::error::Error;
use crate::graph::{Entity, ScoredEntity};
use crate::rag::{IngestReport, QueryResponse};
use crate::search::SearchResult;
use crate::storage::StorageStats;
use serde::Serialize;
use std::fmt::Write;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// A grep match result.
#[derive(Debug, Clone, Serialize)]
pub struct GrepMatch {
    /// Byte offset in the document.
    pub offset: usize,
    /// 1-based line of the match.
    pub line: usize,
    /// The matched text.
    pub matched: String,
    /// Context snippet around the match.
    pub snippet: String,
}

/// A search result with its document name and a content preview.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    /// The ranked result.
    #[serde(flatten)]
    pub result: SearchResult,
    /// Display name of the document.
    pub document_name: String,
    /// Start of the chunk text.
    pub preview: String,
}

/// Embedding coverage of one document.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingCoverage {
    /// Document ID.
    pub document_id: i64,
    /// Display name.
    pub name: String,
    /// Number of chunks.
    pub chunks: usize,
    /// Chunks with an embedding.
    pub embedded: usize,
}

/// An entity reached from another during graph traversal.
#[derive(Debug, Clone, Serialize)]
pub struct Neighbor {
    /// The related entity.
    pub entity: Entity,
    /// Hops from the start entity.
    pub hops: usize,
    /// Direct edge weight (only for 1-hop neighbours).
    pub weight: Option<f64>,
}

/// Size of the knowledge graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    /// Number of entities.
    pub entity_count: usize,
    /// Number of stored relations.
    pub relation_count: usize,
    /// Number of distinct connected entity pairs.
    pub edge_count: usize,
    /// Entities with no relation.
    pub isolated_count: usize,
    /// Average number of neighbours per entity.
    pub average_degree: f64,
}

/// Formats a short confirmation message.
#[must_use]
pub fn format_message(message: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("{message}\n"),
        OutputFormat::Json => format_json(&serde_json::json!({ "message": message })),
    }
}

/// Formats an error for display.
///
/// JSON errors carry a machine-readable `type` alongside the message.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => {
            let kind = match error {
                Error::Storage(_) => "storage",
                Error::Chunking(_) => "chunking",
                Error::Io(_) => "io",
                Error::Command(_) => "command",
                Error::Graph(_) => "graph",
                Error::Context(_) => "context",
                Error::InvalidState { .. } => "invalid_state",
                Error::Config { .. } => "config",
            };
            format_json(&serde_json::json!({
                "error": { "type": kind, "message": error.to_string() }
            }))
        }
    }
}

/// Formats a status response.
#[must_use]
pub fn format_status(stats: &StorageStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_status_text(stats),
        OutputFormat::Json => format_json(stats),
    }
}

fn format_status_text(stats: &StorageStats) -> String {
    let mut output = String::new();
    output.push_str("ArdhaRAG Status\n");
    output.push_str("===============\n\n");
    let _ = writeln!(output, "  Documents:     {}", stats.document_count);
    let _ = writeln!(output, "  Chunks:        {}", stats.chunk_count);
    let _ = writeln!(
        output,
        "  Embedded:      {}/{}",
        stats.embedded_chunk_count, stats.chunk_count
    );
    let _ = writeln!(output, "  Entities:      {}", stats.entity_count);
    let _ = writeln!(output, "  Relations:     {}", stats.relation_count);
    let _ = writeln!(
        output,
        "  Content size:  {}",
        format_size(stats.total_content_size)
    );
    let _ = writeln!(
        output,
        "  Session:       {}",
        if stats.has_session {
            format!("{} turns", stats.turn_count)
        } else {
            "none".to_string()
        }
    );
    let _ = writeln!(output, "  Schema:        v{}", stats.schema_version);
    if let Some(size) = stats.db_size {
        let _ = writeln!(output, "  DB size:       {size} bytes");
    }
    output
}

/// Formats an ingest report.
#[must_use]
pub fn format_ingest_report(report: &IngestReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if report.deduplicated {
                return format!(
                    "Already indexed as {} (ID: {}), {} chunks\n",
                    report.name, report.document_id, report.chunk_count
                );
            }
            format!(
                "Ingested {} (ID: {}): {} chunks ({} embedded), {} entities, {} relations, {}\n",
                report.name,
                report.document_id,
                report.chunk_count,
                report.embedded_count,
                report.entity_count,
                report.relation_count,
                format_size(report.size)
            )
        }
        OutputFormat::Json => format_json(report),
    }
}

/// Document listing entry without its content.
#[derive(Serialize)]
struct DocumentSummary<'a> {
    id: Option<i64>,
    name: Option<&'a str>,
    source: Option<String>,
    size: usize,
    chunk_count: Option<usize>,
    content_hash: Option<&'a str>,
    created_at: i64,
}

impl<'a> From<&'a Document> for DocumentSummary<'a> {
    fn from(document: &'a Document) -> Self {
        Self {
            id: document.id,
            name: document.name.as_deref(),
            source: document
                .source
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
            size: document.metadata.size,
            chunk_count: document.metadata.chunk_count,
            content_hash: document.metadata.content_hash.as_deref(),
            created_at: document.metadata.created_at,
        }
    }
}

/// Formats a document list.
#[must_use]
pub fn format_document_list(documents: &[Document], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_document_list_text(documents),
        OutputFormat::Json => {
            let summaries: Vec<DocumentSummary<'_>> =
                documents.iter().map(DocumentSummary::from).collect();
            format_json(&summaries)
        }
    }
}

fn format_document_list_text(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "No documents found.\n".to_string();
    }

    let mut output = String::new();
    output.push_str("Documents:\n");
    let _ = writeln!(
        output,
        "{:<6} {:<24} {:<12} {:<8} Source",
        "ID", "Name", "Size", "Chunks"
    );
    output.push_str(&"-".repeat(74));
    output.push('\n');

    for document in documents {
        let id = document
            .id
            .map_or_else(|| "-".to_string(), |i| i.to_string());
        let chunks = document
            .metadata
            .chunk_count
            .map_or_else(|| "-".to_string(), |c| c.to_string());
        let source = document
            .source
            .as_ref()
            .map_or_else(|| "-".to_string(), |p| p.to_string_lossy().to_string());

        let _ = writeln!(
            output,
            "{:<6} {:<24} {:<12} {:<8} {}",
            id,
            truncate(&document.display_name(), 24),
            format_size(document.metadata.size),
            chunks,
            truncate(&source, 30)
        );
    }

    output
}

/// Formats a single document.
#[must_use]
pub fn format_document(
    document: &Document,
    chunks: Option<&[Chunk]>,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => format_document_text(document, chunks),
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct DocumentWithChunks<'a> {
                #[serde(flatten)]
                document: DocumentSummary<'a>,
                line_count: Option<usize>,
                chunks: Option<&'a [Chunk]>,
            }
            format_json(&DocumentWithChunks {
                document: DocumentSummary::from(document),
                line_count: document.metadata.line_count,
                chunks,
            })
        }
    }
}

fn format_document_text(document: &Document, chunks: Option<&[Chunk]>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "Document: {}", document.display_name());
    let _ = writeln!(output, "  ID:           {}", document.id.unwrap_or(0));
    let _ = writeln!(output, "  Size:         {} bytes", document.metadata.size);
    if let Some(lines) = document.metadata.line_count {
        let _ = writeln!(output, "  Lines:        {lines}");
    }
    if let Some(chunk_count) = document.metadata.chunk_count {
        let _ = writeln!(output, "  Chunks:       {chunk_count}");
    }
    if let Some(ref ct) = document.metadata.content_type {
        let _ = writeln!(output, "  Content type: {ct}");
    }
    if let Some(ref source) = document.source {
        let _ = writeln!(output, "  Source:       {}", source.display());
    }
    if let Some(ref hash) = document.metadata.content_hash {
        let _ = writeln!(output, "  Hash:         {hash}");
    }

    if let Some(chunks) = chunks {
        output.push('\n');
        output.push_str(&format_chunk_table(chunks, true, 30));
    }

    output
}

fn format_chunk_table(chunks: &[Chunk], preview: bool, preview_len: usize) -> String {
    let mut output = String::new();
    output.push_str("Chunks:\n");
    let _ = write!(
        output,
        "{:<8} {:<6} {:<10} {:<10} {:<8}",
        "ID", "Index", "Start", "End", "Tokens"
    );
    output.push_str(if preview { " Preview\n" } else { "\n" });
    output.push_str(&"-".repeat(74));
    output.push('\n');

    for chunk in chunks {
        let _ = write!(
            output,
            "{:<8} {:<6} {:<10} {:<10} {:<8}",
            chunk.id.unwrap_or(0),
            chunk.index,
            chunk.byte_range.start,
            chunk.byte_range.end,
            chunk.estimate_tokens()
        );
        if preview {
            let _ = write!(
                output,
                " {}",
                truncate(&chunk.content.replace('\n', "\\n"), preview_len)
            );
        }
        output.push('\n');
    }

    output
}

/// Formats the chunks of a document.
#[must_use]
pub fn format_chunk_list(
    document: &Document,
    chunks: &[Chunk],
    preview: bool,
    preview_len: usize,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            if chunks.is_empty() {
                return format!("No chunks for document: {}\n", document.display_name());
            }
            let mut output = format!("Document: {}\n\n", document.display_name());
            output.push_str(&format_chunk_table(chunks, preview, preview_len));
            output
        }
        OutputFormat::Json => format_json(&chunks),
    }
}

/// Formats one chunk, optionally with the entities it mentions.
#[must_use]
pub fn format_chunk(
    chunk: &Chunk,
    entities: Option<&[(Entity, usize)]>,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            if let Some(entities) = entities {
                let _ = writeln!(output, "Chunk {}", chunk.id.unwrap_or(0));
                let _ = writeln!(output, "  Document:  {}", chunk.document_id);
                let _ = writeln!(output, "  Index:     {}", chunk.index);
                let _ = writeln!(
                    output,
                    "  Bytes:     {}..{}",
                    chunk.byte_range.start, chunk.byte_range.end
                );
                let _ = writeln!(output, "  Tokens:    ~{}", chunk.estimate_tokens());
                if let Some(ref strategy) = chunk.metadata.strategy {
                    let _ = writeln!(output, "  Strategy:  {strategy}");
                }
                if !entities.is_empty() {
                    let names: Vec<String> = entities
                        .iter()
                        .map(|(e, count)| format!("{} ({count})", e.name))
                        .collect();
                    let _ = writeln!(output, "  Entities:  {}", names.join(", "));
                }
                output.push_str("---\n");
            }
            output.push_str(&chunk.content);
            if !chunk.content.ends_with('\n') {
                output.push('\n');
            }
            output
        }
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct ChunkEntity<'a> {
                id: i64,
                name: &'a str,
                count: usize,
            }
            #[derive(Serialize)]
            struct ChunkOutput<'a> {
                #[serde(flatten)]
                chunk: &'a Chunk,
                #[serde(skip_serializing_if = "Option::is_none")]
                entities: Option<Vec<ChunkEntity<'a>>>,
            }
            format_json(&ChunkOutput {
                chunk,
                entities: entities.map(|list| {
                    list.iter()
                        .map(|(e, count)| ChunkEntity {
                            id: e.id,
                            name: &e.name,
                            count: *count,
                        })
                        .collect()
                }),
            })
        }
    }
}

/// Formats embedding coverage.
#[must_use]
pub fn format_embedding_status(coverage: &[EmbeddingCoverage], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if coverage.is_empty() {
                return "No documents found.\n".to_string();
            }
            let total: usize = coverage.iter().map(|c| c.chunks).sum();
            let embedded: usize = coverage.iter().map(|c| c.embedded).sum();

            let mut output = String::new();
            let _ = writeln!(output, "Embeddings: {embedded}/{total} chunks\n");
            let _ = writeln!(
                output,
                "{:<6} {:<24} {:<8} {:<8} Status",
                "ID", "Name", "Chunks", "Embedded"
            );
            output.push_str(&"-".repeat(60));
            output.push('\n');
            for c in coverage {
                let status = if c.embedded >= c.chunks {
                    "complete"
                } else if c.embedded == 0 {
                    "none"
                } else {
                    "partial"
                };
                let _ = writeln!(
                    output,
                    "{:<6} {:<24} {:<8} {:<8} {status}",
                    c.document_id,
                    truncate(&c.name, 24),
                    c.chunks,
                    c.embedded
                );
            }
            output
        }
        OutputFormat::Json => format_json(&coverage),
    }
}

/// Formats peek output.
#[must_use]
pub fn format_peek(content: &str, start: usize, end: usize, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Bytes {start}..{end} ({} bytes):", end - start);
            output.push_str("---\n");
            output.push_str(content);
            if !content.ends_with('\n') {
                output.push('\n');
            }
            output.push_str("---\n");
            output
        }
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct PeekOutput<'a> {
                start: usize,
                end: usize,
                size: usize,
                content: &'a str,
            }
            format_json(&PeekOutput {
                start,
                end,
                size: end - start,
                content,
            })
        }
    }
}

/// Formats grep matches.
#[must_use]
pub fn format_grep_matches(matches: &[GrepMatch], pattern: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format_grep_text(matches, pattern),
        OutputFormat::Json => format_json(&matches),
    }
}

fn format_grep_text(matches: &[GrepMatch], pattern: &str) -> String {
    if matches.is_empty() {
        return format!("No matches found for pattern: {pattern}\n");
    }

    let mut output = String::new();
    let _ = writeln!(
        output,
        "Found {} matches for pattern: {pattern}\n",
        matches.len()
    );

    for (i, m) in matches.iter().enumerate() {
        let _ = writeln!(
            output,
            "Match {} at line {}, byte {}:",
            i + 1,
            m.line,
            m.offset
        );
        let _ = writeln!(output, "  {}", m.snippet.replace('\n', "\\n"));
    }

    output
}

/// Formats search results.
#[must_use]
pub fn format_search_results(
    hits: &[SearchHit],
    query: &str,
    mode: &str,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            if hits.is_empty() {
                return format!("No results found for: {query}\n");
            }

            let mut output = String::new();
            let _ = writeln!(
                output,
                "Search results for \"{query}\" ({mode}, {} results):\n",
                hits.len()
            );
            let _ = writeln!(
                output,
                "{:<4} {:<8} {:<20} {:<6} {:<10} Signals",
                "#", "Chunk", "Document", "Index", "Score"
            );
            output.push_str(&"-".repeat(74));
            output.push('\n');

            for (rank, hit) in hits.iter().enumerate() {
                let r = &hit.result;
                let _ = writeln!(
                    output,
                    "{:<4} {:<8} {:<20} {:<6} {:<10} {}",
                    rank + 1,
                    r.chunk_id,
                    truncate(&hit.document_name, 20),
                    r.index,
                    format_score(r.score),
                    format_signals(r)
                );
                let _ = writeln!(output, "     {}", hit.preview.replace('\n', " "));
            }
            output
        }
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct SearchOutput<'a> {
                query: &'a str,
                mode: &'a str,
                count: usize,
                results: &'a [SearchHit],
            }
            format_json(&SearchOutput {
                query,
                mode,
                count: hits.len(),
                results: hits,
            })
        }
    }
}

fn format_signals(result: &SearchResult) -> String {
    let mut parts = Vec::new();
    if let Some(s) = result.semantic_score {
        parts.push(format!("sem={s:.3}"));
    }
    if let Some(s) = result.bm25_score {
        parts.push(format!("bm25={s:.2}"));
    }
    if let Some(s) = result.graph_score {
        parts.push(format!("graph={s:.3}"));
    }
    parts.join(" ")
}

/// Formats an assembled query context.
///
/// With `show_prompt`, text output is the full grounded prompt.
#[must_use]
pub fn format_query(response: &QueryResponse, show_prompt: bool, format: OutputFormat) -> String {
    let window = &response.window;
    match format {
        OutputFormat::Text => {
            if show_prompt {
                let mut prompt = response.prompt.clone();
                if !prompt.ends_with('\n') {
                    prompt.push('\n');
                }
                return prompt;
            }
            if window.is_empty() {
                return format!("No relevant context found for: {}\n", response.query);
            }

            let mut output = String::new();
            output.push_str(&window.render());
            output.push_str("\nSources:\n");
            for source in window.sources() {
                let chunks = if source.first_index == source.last_index {
                    format!("chunk {}", source.first_index)
                } else {
                    format!("chunks {}-{}", source.first_index, source.last_index)
                };
                let _ = writeln!(
                    output,
                    "  [{}] {} ({chunks}), score {}",
                    source.number,
                    source.document_name,
                    format_score(source.score)
                );
            }
            let _ = writeln!(
                output,
                "\nTokens: {}/{} used, {} saved of {} retrieved ({} candidates dropped)",
                window.used_tokens,
                window.max_tokens,
                window.savings(),
                window.candidate_tokens,
                window.dropped
            );
            output
        }
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct QueryOutput<'a> {
                query: &'a str,
                sources: Vec<crate::context::Source>,
                window: &'a crate::context::ContextWindow,
                saved_tokens: usize,
                #[serde(skip_serializing_if = "Option::is_none")]
                prompt: Option<&'a str>,
            }
            format_json(&QueryOutput {
                query: &response.query,
                sources: window.sources(),
                window,
                saved_tokens: window.savings(),
                prompt: show_prompt.then_some(response.prompt.as_str()),
            })
        }
    }
}

/// Formats an entity list.
#[must_use]
pub fn format_entities(entities: &[Entity], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if entities.is_empty() {
                return "No entities found.\n".to_string();
            }
            let mut output = String::new();
            let _ = writeln!(
                output,
                "{:<8} {:<32} {:<8} Mentions",
                "ID", "Name", "Kind"
            );
            output.push_str(&"-".repeat(60));
            output.push('\n');
            for entity in entities {
                let _ = writeln!(
                    output,
                    "{:<8} {:<32} {:<8} {}",
                    entity.id,
                    truncate(&entity.name, 32),
                    entity.kind,
                    entity.mention_count
                );
            }
            output
        }
        OutputFormat::Json => format_json(&entities),
    }
}

/// Formats the neighbourhood of an entity.
#[must_use]
pub fn format_neighbors(entity: &Entity, neighbors: &[Neighbor], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(
                output,
                "{} ({}, {} mentions)",
                entity.name, entity.kind, entity.mention_count
            );
            if neighbors.is_empty() {
                output.push_str("  no related entities\n");
                return output;
            }
            for n in neighbors {
                let weight = n
                    .weight
                    .map_or_else(String::new, |w| format!(", weight {w:.2}"));
                let _ = writeln!(
                    output,
                    "  {}{} ({} hop{}{weight})",
                    "  ".repeat(n.hops.saturating_sub(1)),
                    n.entity.name,
                    n.hops,
                    if n.hops == 1 { "" } else { "s" }
                );
            }
            output
        }
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct NeighborsOutput<'a> {
                entity: &'a Entity,
                neighbors: &'a [Neighbor],
            }
            format_json(&NeighborsOutput { entity, neighbors })
        }
    }
}

/// Formats entities ranked by centrality.
#[must_use]
pub fn format_ranked_entities(ranked: &[ScoredEntity], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if ranked.is_empty() {
                return "No entities found.\n".to_string();
            }
            let mut output = String::new();
            let _ = writeln!(
                output,
                "{:<4} {:<32} {:<8} {:<8} {:<8} Mentions",
                "#", "Name", "Kind", "Score", "Degree"
            );
            output.push_str(&"-".repeat(74));
            output.push('\n');
            for (i, e) in ranked.iter().enumerate() {
                let _ = writeln!(
                    output,
                    "{:<4} {:<32} {:<8} {:<8.4} {:<8} {}",
                    i + 1,
                    truncate(&e.name, 32),
                    e.kind,
                    e.score,
                    e.degree,
                    e.mention_count
                );
            }
            output
        }
        OutputFormat::Json => format_json(&ranked),
    }
}

/// Formats graph size statistics.
#[must_use]
pub fn format_graph_stats(stats: &GraphStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            output.push_str("Knowledge graph:\n");
            let _ = writeln!(output, "  Entities:       {}", stats.entity_count);
            let _ = writeln!(output, "  Relations:      {}", stats.relation_count);
            let _ = writeln!(output, "  Connected pairs: {}", stats.edge_count);
            let _ = writeln!(output, "  Isolated:       {}", stats.isolated_count);
            let _ = writeln!(output, "  Average degree: {:.2}", stats.average_degree);
            output
        }
        OutputFormat::Json => format_json(stats),
    }
}

/// Formats the conversation session.
#[must_use]
pub fn format_session(session: &Session, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Session: {} turns", session.turn_count());
            for (i, turn) in session.turns.iter().enumerate() {
                let _ = writeln!(
                    output,
                    "  [{}] {} ({} chunks from {} documents)",
                    i + 1,
                    truncate(&turn.query, 60),
                    turn.chunk_ids.len(),
                    turn.document_ids.len()
                );
            }
            output
        }
        OutputFormat::Json => format_json(session),
    }
}

/// Formats a value as JSON.
fn format_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn format_score(score: f64) -> String {
    if score < 0.01 {
        format!("{score:.4}")
    } else {
        format!("{score:.3}")
    }
}

/// Formats a byte size as human-readable.
#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Truncates a string to at most `max_len` bytes, ending in `...` when cut.
fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        let end = crate::io::find_char_boundary(s, max_len);
        return s[..end].to_string();
    }
    let end = crate::io::find_char_boundary(s, max_len - 3);
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("unknown"), OutputFormat::Text);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(100), "100 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Hello", 10), "Hello");
        assert_eq!(truncate("Hello World", 8), "Hello...");
        assert_eq!(truncate("Hi", 2), "Hi");
        // never splits a multi-byte character
        assert_eq!(truncate("héllo wörld", 5), "h...");
    }

    #[test]
    fn test_format_status() {
        let stats = StorageStats {
            document_count: 2,
            chunk_count: 10,
            embedded_chunk_count: 7,
            entity_count: 5,
            relation_count: 3,
            total_content_size: 1024,
            has_session: true,
            turn_count: 4,
            schema_version: 1,
            db_size: Some(4096),
        };

        let text = format_status(&stats, OutputFormat::Text);
        assert!(text.contains("Documents:     2"));
        assert!(text.contains("Embedded:      7/10"));
        assert!(text.contains("Session:       4 turns"));

        let json = format_status(&stats, OutputFormat::Json);
        assert!(json.contains("\"document_count\": 2"));
    }

    #[test]
    fn test_format_error_json() {
        let err: Error = StorageError::DocumentNotFound {
            identifier: "missing".to_string(),
        }
        .into();
        let json = format_error(&err, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["error"]["type"], "storage");
        assert!(
            value["error"]["message"]
                .as_str()
                .unwrap()
                .contains("missing")
        );
        assert!(format_error(&err, OutputFormat::Text).contains("document not found"));
    }

    #[test]
    fn test_document_list_json_omits_content() {
        let mut document = Document::from_named("notes".to_string(), "secret body".to_string());
        document.id = Some(3);
        let json = format_document_list(&[document], OutputFormat::Json);
        assert!(json.contains("\"name\": \"notes\""));
        assert!(!json.contains("secret body"));
        assert_eq!(
            format_document_list(&[], OutputFormat::Text),
            "No documents found.\n"
        );
    }

    #[test]
    fn test_format_message() {
        assert_eq!(format_message("done", OutputFormat::Text), "done\n");
        assert!(format_message("done", OutputFormat::Json).contains("\"message\": \"done\""));
    }
}
