//! CLI command implementations.
//!
//! Each command opens the index through [`ArdhaRag`], performs its work and
//! returns the formatted output; printing is left to the binary.

use crate::cli::output::{
    EmbeddingCoverage, GraphStats, GrepMatch, Neighbor, OutputFormat, SearchHit,
    format_chunk, format_chunk_list, format_document, format_document_list,
    format_embedding_status, format_entities, format_graph_stats, format_grep_matches,
    format_ingest_report, format_message, format_neighbors, format_peek, format_query,
    format_ranked_entities, format_search_results, format_session, format_status,
};
use crate::cli::parser::{ChunkCommands, Cli, Commands, GraphCommands, SessionCommands};
use crate::config::Config;
use crate::core::Session;
use crate::error::{CommandError, GraphError, Result, StorageError};
use crate::graph::{Entity, PageRank};
use crate::io::{find_char_boundary, find_char_boundary_forward};
use crate::rag::ArdhaRag;
use crate::search::{SearchConfig, document_fully_embedded};
use crate::storage::Storage;
use regex::RegexBuilder;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;

/// Bytes shown by `peek` when no end offset is given.
const DEFAULT_PEEK_LEN: usize = 3000;

/// Bytes of chunk text shown per search result.
const SEARCH_PREVIEW_LEN: usize = 120;

/// Loads the configuration for a CLI invocation.
///
/// The file named by `--config` is layered over the defaults, then
/// `ARDHA_` environment variables; `--db-path` wins over both.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or is invalid.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(ref db_path) = cli.db_path {
        config.storage.db_path.clone_from(db_path);
    }
    Ok(config)
}

/// Executes the CLI command.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the command fails.
pub fn execute(cli: &Cli) -> Result<String> {
    let config = load_config(cli)?;
    execute_with(cli, config)
}

/// Executes the CLI command with an already loaded configuration.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute_with(cli: &Cli, config: Config) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);

    match &cli.command {
        Commands::Init { force } => cmd_init(config, *force, format),
        Commands::Status => cmd_status(config, format),
        Commands::Reset { yes } => cmd_reset(config, *yes, format),
        Commands::Ingest {
            file,
            name,
            chunker,
            chunk_size,
            overlap,
        } => cmd_ingest(
            config,
            file,
            name.as_deref(),
            chunker.as_deref(),
            *chunk_size,
            *overlap,
            format,
        ),
        Commands::AddText { name, content } => {
            cmd_add_text(config, name, content.as_deref(), format)
        }
        Commands::List => cmd_list(config, format),
        Commands::Show { document, chunks } => cmd_show(config, document, *chunks, format),
        Commands::Delete { document, yes } => cmd_delete(config, document, *yes, format),
        Commands::Peek {
            document,
            start,
            end,
        } => cmd_peek(config, document, *start, *end, format),
        Commands::Grep {
            document,
            pattern,
            max_matches,
            window,
            ignore_case,
        } => cmd_grep(
            config,
            document,
            pattern,
            *max_matches,
            *window,
            *ignore_case,
            format,
        ),
        Commands::Search {
            query,
            top_k,
            threshold,
            mode,
            rrf_k,
            document,
        } => {
            let overrides = SearchOverrides {
                top_k: *top_k,
                threshold: *threshold,
                rrf_k: *rrf_k,
                document: document.as_deref(),
            };
            cmd_search(config, query, mode, &overrides, format)
        }
        Commands::Query {
            query,
            max_tokens,
            prompt,
        } => cmd_query(config, query, *max_tokens, *prompt, format),
        Commands::Chunk(chunk_cmd) => match chunk_cmd {
            ChunkCommands::Get { id, metadata } => cmd_chunk_get(config, *id, *metadata, format),
            ChunkCommands::List {
                document,
                preview,
                preview_len,
            } => cmd_chunk_list(config, document, *preview, *preview_len, format),
            ChunkCommands::Embed { document, force } => {
                cmd_chunk_embed(config, document, *force, format)
            }
            ChunkCommands::Status => cmd_chunk_status(config, format),
        },
        Commands::Graph(graph_cmd) => match graph_cmd {
            GraphCommands::Entities { pattern, limit } => {
                cmd_graph_entities(config, pattern.as_deref(), *limit, format)
            }
            GraphCommands::Neighbors { entity, depth } => {
                cmd_graph_neighbors(config, entity, *depth, format)
            }
            GraphCommands::Top { limit } => cmd_graph_top(config, *limit, format),
            GraphCommands::Stats => cmd_graph_stats(config, format),
        },
        Commands::Session(session_cmd) => match session_cmd {
            SessionCommands::Show => cmd_session_show(config, format),
            SessionCommands::Clear => cmd_session_clear(config, format),
        },
    }
}

/// Opens an existing index.
fn open_engine(config: Config) -> Result<ArdhaRag> {
    if !config.storage.db_path.exists() {
        return Err(StorageError::NotInitialized.into());
    }
    let engine = ArdhaRag::open(config)?;
    if !engine.storage().is_initialized()? {
        return Err(StorageError::NotInitialized.into());
    }
    Ok(engine)
}

fn resolve_entity(engine: &ArdhaRag, identifier: &str) -> Result<Entity> {
    let storage = engine.storage();
    if let Ok(id) = identifier.parse::<i64>()
        && let Some(entity) = storage.get_entity(id)?
    {
        return Ok(entity);
    }

    storage.get_entity_by_name(identifier)?.ok_or_else(|| {
        GraphError::EntityNotFound {
            identifier: identifier.to_string(),
        }
        .into()
    })
}

fn require_confirmation(yes: bool, what: &str) -> Result<()> {
    if yes {
        Ok(())
    } else {
        Err(CommandError::ConfirmationRequired(format!("use --yes to confirm {what}")).into())
    }
}

fn read_stdin() -> Result<String> {
    let mut content = String::new();
    io::stdin()
        .read_to_string(&mut content)
        .map_err(|e| CommandError::ExecutionFailed(format!("failed to read from stdin: {e}")))?;
    Ok(content)
}

// ==================== Index Lifecycle ====================

fn cmd_init(config: Config, force: bool, format: OutputFormat) -> Result<String> {
    let db_path = config.storage.db_path.clone();

    if db_path.exists() && !force {
        return Err(CommandError::ExecutionFailed(
            "index already exists. Use --force to reinitialize.".to_string(),
        )
        .into());
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            CommandError::ExecutionFailed(format!("failed to create directory: {e}"))
        })?;
    }

    if force && db_path.exists() {
        std::fs::remove_file(&db_path).map_err(|e| {
            CommandError::ExecutionFailed(format!("failed to remove existing index: {e}"))
        })?;
    }

    // Opening creates the schema and an empty session.
    ArdhaRag::open(config)?;
    tracing::info!(path = %db_path.display(), "initialized index");

    Ok(format_message(
        &format!("Initialized ArdhaRAG index at: {}", db_path.display()),
        format,
    ))
}

fn cmd_status(config: Config, format: OutputFormat) -> Result<String> {
    let engine = open_engine(config)?;
    let stats = engine.storage().stats()?;
    Ok(format_status(&stats, format))
}

fn cmd_reset(config: Config, yes: bool, format: OutputFormat) -> Result<String> {
    require_confirmation(yes, "reset. This deletes all data")?;

    let mut engine = open_engine(config)?;
    let storage = engine.storage_mut();
    storage.reset()?;
    storage.save_session(&Session::new())?;

    Ok(format_message("Index reset successfully.", format))
}

// ==================== Documents ====================

fn cmd_ingest(
    config: Config,
    file: &Path,
    name: Option<&str>,
    chunker: Option<&str>,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
    format: OutputFormat,
) -> Result<String> {
    let mut engine = open_engine(config)?;

    let mut options = engine.ingest_options();
    if let Some(strategy) = chunker {
        options.strategy = strategy.to_string();
    }
    if let Some(size) = chunk_size {
        options.chunk_size = size;
    }
    if let Some(overlap) = overlap {
        options.overlap = overlap;
    }

    let report = engine.ingest_file_with(file, name, &options)?;
    Ok(format_ingest_report(&report, format))
}

fn cmd_add_text(
    config: Config,
    name: &str,
    content: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    let content = match content {
        Some(c) => c.to_string(),
        None => read_stdin()?,
    };

    let mut engine = open_engine(config)?;
    let report = engine.ingest_text(name, &content)?;
    Ok(format_ingest_report(&report, format))
}

fn cmd_list(config: Config, format: OutputFormat) -> Result<String> {
    let engine = open_engine(config)?;
    let documents = engine.storage().list_documents()?;
    Ok(format_document_list(&documents, format))
}

fn cmd_show(
    config: Config,
    identifier: &str,
    show_chunks: bool,
    format: OutputFormat,
) -> Result<String> {
    let engine = open_engine(config)?;
    let mut document = engine.resolve_document(identifier)?;
    document.line_count();

    let chunks = if show_chunks {
        Some(engine.storage().get_chunks(document.id.unwrap_or(0))?)
    } else {
        None
    };

    Ok(format_document(&document, chunks.as_deref(), format))
}

fn cmd_delete(config: Config, identifier: &str, yes: bool, format: OutputFormat) -> Result<String> {
    require_confirmation(yes, "deletion")?;

    let mut engine = open_engine(config)?;
    let document = engine.resolve_document(identifier)?;
    let name = document.display_name();
    engine.delete_document(document.id.unwrap_or(0))?;

    Ok(format_message(&format!("Deleted document: {name}"), format))
}

fn cmd_peek(
    config: Config,
    identifier: &str,
    start: usize,
    end: Option<usize>,
    format: OutputFormat,
) -> Result<String> {
    let engine = open_engine(config)?;
    let document = engine.resolve_document(identifier)?;
    let content = &document.content;

    let start = find_char_boundary(content, start.min(content.len()));
    let end = end
        .unwrap_or_else(|| start.saturating_add(DEFAULT_PEEK_LEN))
        .clamp(start, content.len());
    let end = find_char_boundary_forward(content, end);

    Ok(format_peek(&content[start..end], start, end, format))
}

fn cmd_grep(
    config: Config,
    identifier: &str,
    pattern: &str,
    max_matches: usize,
    window: usize,
    ignore_case: bool,
    format: OutputFormat,
) -> Result<String> {
    let engine = open_engine(config)?;
    let document = engine.resolve_document(identifier)?;
    let content = &document.content;

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()
        .map_err(|e| CommandError::InvalidArgument(format!("invalid regex: {e}")))?;

    let mut matches = Vec::new();
    let mut line = 1;
    let mut scanned = 0;
    for m in regex.find_iter(content).take(max_matches) {
        line += content[scanned..m.start()].matches('\n').count();
        scanned = m.start();

        let start = find_char_boundary(content, m.start().saturating_sub(window));
        let end = find_char_boundary_forward(content, m.end().saturating_add(window));

        matches.push(GrepMatch {
            offset: m.start(),
            line,
            matched: m.as_str().to_string(),
            snippet: content[start..end].to_string(),
        });
    }

    Ok(format_grep_matches(&matches, pattern, format))
}

// ==================== Retrieval ====================

/// Search flags that override the configured retrieval settings.
struct SearchOverrides<'a> {
    top_k: Option<usize>,
    threshold: Option<f32>,
    rrf_k: Option<u32>,
    document: Option<&'a str>,
}

/// Enables only the signals a search mode asks for.
fn apply_mode(config: SearchConfig, mode: &str) -> Result<SearchConfig> {
    let (semantic, bm25, graph) = match mode.to_lowercase().as_str() {
        "hybrid" => return Ok(config),
        "semantic" => (true, false, false),
        "bm25" => (false, true, false),
        "graph" => (false, false, true),
        other => {
            return Err(CommandError::InvalidArgument(format!(
                "unknown search mode '{other}' (expected hybrid, semantic, bm25 or graph)"
            ))
            .into());
        }
    };
    Ok(config
        .with_semantic(semantic)
        .with_bm25(bm25)
        .with_graph(graph))
}

fn cmd_search(
    config: Config,
    query: &str,
    mode: &str,
    overrides: &SearchOverrides<'_>,
    format: OutputFormat,
) -> Result<String> {
    let engine = open_engine(config)?;

    let mut search = apply_mode(engine.config().search_config(), mode)?;
    if let Some(top_k) = overrides.top_k {
        search = search.with_top_k(top_k);
    }
    if let Some(threshold) = overrides.threshold {
        search = search.with_threshold(threshold);
    }
    if let Some(k) = overrides.rrf_k {
        search = search.with_rrf_k(k);
    }
    if let Some(identifier) = overrides.document {
        let document = engine.resolve_document(identifier)?;
        search = search.with_document(document.id);
    }

    let results = engine.retrieve_with(query, &search)?;

    let storage = engine.storage();
    let mut names: HashMap<i64, String> = HashMap::new();
    let mut hits = Vec::with_capacity(results.len());
    for result in results {
        let Some(chunk) = storage.get_chunk(result.chunk_id)? else {
            continue;
        };
        let document_name = match names.get(&result.document_id) {
            Some(name) => name.clone(),
            None => {
                let name = storage
                    .get_document(result.document_id)?
                    .map_or_else(|| result.document_id.to_string(), |d| d.display_name());
                names.insert(result.document_id, name.clone());
                name
            }
        };
        hits.push(SearchHit {
            preview: chunk.preview(SEARCH_PREVIEW_LEN).to_string(),
            document_name,
            result,
        });
    }

    Ok(format_search_results(&hits, query, mode, format))
}

fn cmd_query(
    config: Config,
    query: &str,
    max_tokens: Option<usize>,
    show_prompt: bool,
    format: OutputFormat,
) -> Result<String> {
    let mut engine = open_engine(config)?;

    let mut context = engine.context_config();
    if let Some(max_tokens) = max_tokens {
        context = context.with_max_tokens(max_tokens);
    }
    let search = engine.config().search_config();

    let response = engine.query_with(query, &search, context)?;
    Ok(format_query(&response, show_prompt, format))
}

// ==================== Chunks ====================

fn cmd_chunk_get(config: Config, id: i64, metadata: bool, format: OutputFormat) -> Result<String> {
    let engine = open_engine(config)?;
    let storage = engine.storage();
    let chunk = storage
        .get_chunk(id)?
        .ok_or(StorageError::ChunkNotFound { id })?;

    let entities = if metadata {
        Some(storage.entities_for_chunk(id)?)
    } else {
        None
    };

    Ok(format_chunk(&chunk, entities.as_deref(), format))
}

fn cmd_chunk_list(
    config: Config,
    identifier: &str,
    preview: bool,
    preview_len: usize,
    format: OutputFormat,
) -> Result<String> {
    let engine = open_engine(config)?;
    let document = engine.resolve_document(identifier)?;
    let chunks = engine.storage().get_chunks(document.id.unwrap_or(0))?;
    Ok(format_chunk_list(
        &document,
        &chunks,
        preview,
        preview_len,
        format,
    ))
}

fn cmd_chunk_embed(
    config: Config,
    identifier: &str,
    force: bool,
    format: OutputFormat,
) -> Result<String> {
    let mut engine = open_engine(config)?;
    let document = engine.resolve_document(identifier)?;
    let document_id = document.id.unwrap_or(0);
    let name = document.display_name();

    if !force && document_fully_embedded(engine.storage(), document_id)? {
        return Ok(match format {
            OutputFormat::Text => {
                format!("Document '{name}' already has embeddings. Use --force to re-embed.\n")
            }
            OutputFormat::Json => json_string(&serde_json::json!({
                "document_id": document_id,
                "name": name,
                "embedded_count": 0,
                "already_embedded": true
            })),
        });
    }

    let count = engine.embed_document(document_id)?;

    Ok(match format {
        OutputFormat::Text => {
            format!("Generated embeddings for {count} chunks in document '{name}'.\n")
        }
        OutputFormat::Json => json_string(&serde_json::json!({
            "document_id": document_id,
            "name": name,
            "embedded_count": count,
            "already_embedded": false
        })),
    })
}

fn cmd_chunk_status(config: Config, format: OutputFormat) -> Result<String> {
    let engine = open_engine(config)?;
    let storage = engine.storage();

    let mut coverage = Vec::new();
    for document in storage.list_documents()? {
        let document_id = document.id.unwrap_or(0);
        coverage.push(EmbeddingCoverage {
            document_id,
            name: document.display_name(),
            chunks: storage.chunk_count(document_id)?,
            embedded: storage.document_embedding_count(document_id)?,
        });
    }

    Ok(format_embedding_status(&coverage, format))
}

// ==================== Knowledge Graph ====================

fn cmd_graph_entities(
    config: Config,
    pattern: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> Result<String> {
    let engine = open_engine(config)?;
    let storage = engine.storage();
    let entities = match pattern {
        Some(pattern) => storage.find_entities(pattern, limit)?,
        None => storage.list_entities(Some(limit))?,
    };
    Ok(format_entities(&entities, format))
}

fn cmd_graph_neighbors(
    config: Config,
    identifier: &str,
    depth: usize,
    format: OutputFormat,
) -> Result<String> {
    let engine = open_engine(config)?;
    let entity = resolve_entity(&engine, identifier)?;
    let graph = engine.graph()?;

    let direct: HashMap<i64, f64> = graph.neighbors(entity.id).into_iter().collect();
    let neighbors: Vec<Neighbor> = graph
        .traverse(entity.id, depth.max(1))
        .into_iter()
        .filter_map(|(id, hops)| {
            graph.entity(id).map(|e| Neighbor {
                entity: e.clone(),
                hops,
                weight: if hops == 1 {
                    direct.get(&id).copied()
                } else {
                    None
                },
            })
        })
        .collect();

    Ok(format_neighbors(&entity, &neighbors, format))
}

fn cmd_graph_top(config: Config, limit: usize, format: OutputFormat) -> Result<String> {
    let engine = open_engine(config)?;
    let graph = engine.graph()?;
    let ranked = PageRank::default().rank(&graph, limit);
    Ok(format_ranked_entities(&ranked, format))
}

#[allow(clippy::cast_precision_loss)]
fn cmd_graph_stats(config: Config, format: OutputFormat) -> Result<String> {
    let engine = open_engine(config)?;
    let graph = engine.graph()?;

    let entity_count = graph.node_count();
    let degrees: Vec<usize> = graph.entities().map(|e| graph.degree(e.id)).collect();
    let total_degree: usize = degrees.iter().sum();

    let stats = GraphStats {
        entity_count,
        relation_count: engine.storage().relation_count()?,
        edge_count: graph.edge_count(),
        isolated_count: degrees.iter().filter(|&&d| d == 0).count(),
        average_degree: if entity_count == 0 {
            0.0
        } else {
            total_degree as f64 / entity_count as f64
        },
    };

    Ok(format_graph_stats(&stats, format))
}

// ==================== Session ====================

fn cmd_session_show(config: Config, format: OutputFormat) -> Result<String> {
    let engine = open_engine(config)?;
    Ok(format_session(engine.session(), format))
}

fn cmd_session_clear(config: Config, format: OutputFormat) -> Result<String> {
    let mut engine = open_engine(config)?;
    let turns = engine.session().turn_count();
    engine.clear_session()?;
    Ok(format_message(
        &format!("Cleared {turns} session turns."),
        format,
    ))
}

fn json_string(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}
