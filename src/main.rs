use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sightline_core::{CancelSignal, ChunkId, ChunkKind, OutputFormat, SearchMode, SightlineConfig, SightlineError};
use sightline_graph::{CallGraph, DeadCodeEntry, EntryPolicy, ReachabilityReport, Status};
use sightline_lens::{
    EmbeddingProvider, HttpEmbedder, HttpReranker, IndexSummary, ProjectIndex, Reranker, SearchFilters, SqliteStore,
    DATA_DIR,
};

const CONFIG_FILE: &str = ".sightline.toml";

#[derive(Parser)]
#[command(
    name = "sightline",
    version,
    about = "Dead-code detection and semantic code search",
    long_about = "Sightline builds a call graph of your repository, classifies every function\n\
                   as reachable, dead or indeterminate, and indexes code chunks for semantic search.\n\n\
                   Examples:\n  \
                     sightline index                      Index (or update) the current repository\n  \
                     sightline search 'retry with backoff'  Semantic search over indexed chunks\n  \
                     sightline dead-code                  List functions no entry point reaches\n  \
                     sightline calls 'src/app.py#main@python'  Show callers and callees of a chunk\n  \
                     sightline doctor                     Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .sightline.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable tables and summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Index the repository: extract chunks, analyze reachability, embed
    #[command(long_about = "Index the repository.\n\n\
        Extracts chunks from new or modified files, rebuilds the call graph and\n\
        reachability report, and embeds chunks whose content changed. Unchanged\n\
        chunks are served from the embedding cache in .sightline/index.db.\n\n\
        Examples:\n  sightline index\n  sightline index --path ../service --strict")]
    Index {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Exit with an error if any file or batch failed
        #[arg(long)]
        strict: bool,
    },
    /// Search indexed chunks semantically
    #[command(long_about = "Search indexed chunks semantically.\n\n\
        Embeds the query, retrieves the nearest chunks, fuses them with keyword\n\
        matches and reranks them when a reranker is configured. Run\n\
        'sightline index' first, or pass --index.\n\n\
        Examples:\n  sightline search 'parse config file'\n  sightline search 'http handler' --language go --kind function --limit 5\n  sightline search fetch_data --mode keyword")]
    Search {
        /// Natural-language or code query
        query: String,

        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Maximum results (default: [search] default_limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Only return chunks in these languages
        #[arg(long)]
        language: Vec<String>,

        /// Only return chunks of these kinds (function, method, class, ...)
        #[arg(long)]
        kind: Vec<ChunkKind>,

        /// Only return chunks whose path matches these globs
        #[arg(long)]
        path_glob: Vec<String>,

        /// Retrieval mode: vector, keyword or hybrid (default: [search] mode)
        #[arg(long)]
        mode: Option<SearchMode>,

        /// Skip the reranker and use retrieval order
        #[arg(long)]
        no_rerank: bool,

        /// Update the index before searching
        #[arg(long)]
        index: bool,
    },
    /// List chunks that no entry point reaches
    #[command(long_about = "List chunks that no entry point reaches.\n\n\
        Analyzes the repository without embedding anything. Entries are sorted by\n\
        confidence; exported symbols and callback-shaped names score lower.\n\n\
        Examples:\n  sightline dead-code\n  sightline dead-code --min-confidence 0.7 --format json")]
    DeadCode {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,

        /// Maximum entries to show (0 = all)
        #[arg(long, default_value = "0")]
        limit: usize,

        /// Hide entries below this confidence (0.0 - 1.0)
        #[arg(long, default_value = "0.0")]
        min_confidence: f32,

        /// Also list chunks whose reachability cannot be decided
        #[arg(long)]
        include_indeterminate: bool,
    },
    /// Show the callers and callees of one chunk
    Calls {
        /// Chunk id, e.g. 'src/config.rs#Config::load@rust'
        chunk: String,

        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Show index and call graph statistics
    Stats {
        /// Repository path (default: current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },
    /// Create a default .sightline.toml configuration file
    #[command(long_about = "Create a default .sightline.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .sightline.toml already exists.")]
    Init,
    /// Check your Sightline setup and environment
    #[command(long_about = "Check your Sightline setup and environment.\n\n\
        Validates the config file, embedding and reranker credentials, provider\n\
        availability and the local index. Use --format json for machine-readable output.")]
    Doctor,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing(config: &SightlineConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let default_filter = format!(
        "warn,sightline={level},sightline_core={level},sightline_chunker={level},\
         sightline_graph={level},sightline_lens={level}"
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<SightlineConfig> {
    let config = match path {
        Some(path) => SightlineConfig::from_file(path)?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                SightlineConfig::from_file(default_path)?
            } else {
                SightlineConfig::default()
            }
        }
    };
    config.validate()?;
    Ok(config)
}

/// A signal that fires on Ctrl-C.
fn cancel_on_ctrl_c() -> CancelSignal {
    let signal = CancelSignal::new();
    let handle = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            handle.cancel();
        }
    });
    signal
}

fn embedder(config: &SightlineConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if config.embedding.base_url.is_none() && config.embedding.resolve_api_key().is_none() {
        let var = format!("{}_API_KEY", config.embedding.provider.to_uppercase());
        return Err(miette::miette!(
            help = format!("set {var} or SIGHTLINE_EMBEDDING_API_KEY, or add api_key under [embedding]"),
            "No API key configured for embedding provider '{}'",
            config.embedding.provider
        ));
    }
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HttpEmbedder::with_config(&config.embedding)?);
    Ok(provider)
}

fn reranker(config: &SightlineConfig) -> Result<Option<Arc<dyn Reranker>>> {
    if !config.reranker.enabled || config.reranker.provider == "none" {
        return Ok(None);
    }
    let reranker: Arc<dyn Reranker> = Arc::new(HttpReranker::with_config(&config.reranker)?);
    Ok(Some(reranker))
}

fn open_project(path: &Path, config: &SightlineConfig) -> Result<ProjectIndex> {
    Ok(ProjectIndex::open(
        path,
        config.clone(),
        embedder(config)?,
        reranker(config)?,
    )?)
}

fn spinner(message: &'static str) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Some(pb)
}

async fn run_index(project: &ProjectIndex, cancel: &CancelSignal) -> Result<IndexSummary> {
    let pb = spinner("Indexing repository...");
    let result = project.index(cancel).await;
    if let Some(pb) = pb {
        match &result {
            Ok(_) => pb.finish_and_clear(),
            Err(_) => pb.finish_with_message("Failed"),
        }
    }
    Ok(result?)
}

fn print_summary(summary: &IndexSummary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("# Index Summary\n");
            println!("| | Succeeded | Failed |");
            println!("|---|---|---|");
            println!(
                "| Files | {} | {} |",
                summary.files_scanned.saturating_sub(summary.files_failed),
                summary.files_failed
            );
            println!(
                "| Chunks | {} | {} |",
                summary.chunks_total.saturating_sub(summary.chunks_failed),
                summary.chunks_failed
            );
            println!(
                "\n{} embedded, {} cached, {} truncated. Snapshot `{}`.",
                summary.chunks_embedded,
                summary.chunks_cached,
                summary.chunks_truncated,
                short(&summary.snapshot_id)
            );
        }
        OutputFormat::Text => {
            println!(
                "Files:  {} scanned, {} changed, {} removed, {} failed",
                summary.files_scanned, summary.files_changed, summary.files_removed, summary.files_failed
            );
            println!(
                "Chunks: {} total, {} embedded, {} cached, {} failed, {} truncated",
                summary.chunks_total,
                summary.chunks_embedded,
                summary.chunks_cached,
                summary.chunks_failed,
                summary.chunks_truncated
            );
            println!("Snapshot: {}", short(&summary.snapshot_id));
            for entry in &summary.failures.entries {
                eprintln!("warning: {}: {}", entry.scope, entry.message);
            }
        }
    }
    Ok(())
}

fn short(id: &str) -> &str {
    &id[..id.len().min(12)]
}

/// Reachability report computed straight from the working tree.
fn analyze_repo(path: &Path, config: &SightlineConfig, cancel: &CancelSignal) -> Result<(CallGraph, ReachabilityReport)> {
    let output = sightline_chunker::extract_repo(path, &config.index, cancel)?;
    for entry in &output.failures.entries {
        tracing::warn!(scope = %entry.scope, "{}", entry.message);
    }
    let chunks = sightline_chunker::all_chunks(&output);
    let graph = CallGraph::build(&chunks);
    let policy = EntryPolicy::from_config(&config.reachability)?;
    let report = ReachabilityReport::build(&graph, &policy);
    Ok((graph, report))
}

fn print_dead_code(
    entries: &[&DeadCodeEntry],
    indeterminate: &[(String, Option<String>)],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "deadCode": entries,
                "indeterminate": indeterminate
                    .iter()
                    .map(|(id, via)| serde_json::json!({ "chunkId": id, "via": via }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("# Dead Code\n");
            if entries.is_empty() {
                println!("No dead code found.");
            } else {
                println!("| Confidence | Location | Name | Kind | Reason |");
                println!("|---|---|---|---|---|");
                for e in entries {
                    println!(
                        "| {:.0}% | `{}:{}` | `{}` | {} | {} |",
                        e.confidence * 100.0,
                        e.file_path.display(),
                        e.start_line,
                        e.name,
                        e.kind,
                        e.reason
                    );
                }
            }
            if !indeterminate.is_empty() {
                println!("\n## Indeterminate\n");
                for (id, _) in indeterminate {
                    println!("- `{id}`");
                }
            }
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No dead code found.");
            }
            for e in entries {
                println!(
                    "{:>4.0}%  {}:{}-{}  {} {}  ({})",
                    e.confidence * 100.0,
                    e.file_path.display(),
                    e.start_line,
                    e.end_line,
                    e.kind,
                    e.name,
                    e.reason
                );
            }
            if !indeterminate.is_empty() {
                println!("\nIndeterminate ({}):", indeterminate.len());
                for (id, via) in indeterminate {
                    match via {
                        Some(via) => println!("  {id}  (via {via})"),
                        None => println!("  {id}"),
                    }
                }
            }
        }
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }
}

async fn run_doctor(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. Config file
    let path = config_path.unwrap_or(Path::new(CONFIG_FILE));
    let config = if path.exists() {
        match SightlineConfig::from_file(path).and_then(|c| c.validate().map(|()| c)) {
            Ok(config) => {
                checks.push(CheckResult::pass("config", format!("{} is valid", path.display())));
                config
            }
            Err(e) => {
                checks.push(CheckResult::fail(
                    "config",
                    e.to_string(),
                    format!("fix {} or remove it to use defaults", path.display()),
                ));
                SightlineConfig::default()
            }
        }
    } else {
        checks.push(CheckResult::info(
            "config",
            format!("{} not found, using defaults (run 'sightline init')", path.display()),
        ));
        SightlineConfig::default()
    };

    // 2. Embedding provider
    let emb = &config.embedding;
    let key_var = format!("{}_API_KEY", emb.provider.to_uppercase());
    if emb.resolve_api_key().is_some() || emb.base_url.is_some() {
        checks.push(CheckResult::pass(
            "embedding_key",
            format!("{} (model: {})", emb.provider, emb.model),
        ));
        match HttpEmbedder::with_config(emb) {
            Ok(provider) => match provider.available().await {
                Ok(()) => checks.push(CheckResult::pass(
                    "embedding_api",
                    format!("reachable, {} dimensions", provider.dimensions()),
                )),
                Err(e) => checks.push(CheckResult::fail(
                    "embedding_api",
                    e.to_string(),
                    "check the API key, model and base_url under [embedding]",
                )),
            },
            Err(e) => checks.push(CheckResult::fail(
                "embedding_api",
                e.to_string(),
                "check [embedding] in .sightline.toml",
            )),
        }
    } else {
        checks.push(CheckResult::fail(
            "embedding_key",
            format!("{key_var} not set"),
            format!("export {key_var}=... or set api_key in .sightline.toml [embedding]"),
        ));
    }

    // 3. Reranker
    if config.reranker.enabled && config.reranker.provider == "http" {
        match HttpReranker::with_config(&config.reranker) {
            Ok(r) => checks.push(CheckResult::pass(
                "reranker",
                format!("{} (max {} documents)", config.reranker.model, r.max_documents()),
            )),
            Err(e) => checks.push(CheckResult::fail(
                "reranker",
                e.to_string(),
                "set SIGHTLINE_RERANKER_API_KEY and base_url under [reranker]",
            )),
        }
    } else {
        checks.push(CheckResult::info("reranker", "disabled (retrieval order only)"));
    }

    // 4. Local index
    let index_path = Path::new(DATA_DIR).join("index.db");
    if index_path.exists() {
        match SqliteStore::open(&index_path).and_then(|s| Ok((s.stats()?, s.dimensions()?))) {
            Ok((stats, dimensions)) => {
                let dims = dimensions.map_or_else(|| "unknown".to_string(), |d| d.to_string());
                checks.push(CheckResult::pass(
                    "index",
                    format!(
                        "{} files, {} chunks, {} cached embeddings, {dims} dimensions",
                        stats.total_files, stats.total_chunks, stats.cached_embeddings
                    ),
                ));
                if dimensions.is_some_and(|d| d != config.embedding.dimensions) {
                    checks.push(CheckResult::fail(
                        "index_dimensions",
                        format!("index has {dims}, config has {}", config.embedding.dimensions),
                        format!("delete {DATA_DIR}/ and re-index"),
                    ));
                }
            }
            Err(e) => checks.push(CheckResult::fail(
                "index",
                e.to_string(),
                format!("delete {DATA_DIR}/ and re-index"),
            )),
        }
    } else {
        checks.push(CheckResult::info("index", "not found (run 'sightline index' to create)"));
    }

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            println!("Sightline v{} - Environment Check\n", env!("CARGO_PKG_VERSION"));
            for check in &checks {
                let label = check.name.replace('_', " ");
                println!("  {} {label:<20} {}", check.symbol(), check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }
            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }
    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# Sightline Configuration

[embedding]
# provider = "voyage"          # "voyage", "openai", or any OpenAI-compatible endpoint via base_url
# model = "voyage-code-3"
# base_url = "https://api.voyageai.com/v1"
# dimensions = 1024
# max_tokens = 8000
# batch_size = 64
# concurrency = 4
# max_retries = 1
# retry_backoff_ms = 500

[reranker]
# enabled = false
# provider = "http"
# model = "rerank-2"
# base_url = "https://api.voyageai.com/v1"
# max_documents = 100

[search]
# default_limit = 10
# candidate_multiplier = 3
# metric = "cosine"            # or "inner_product"
# mode = "hybrid"              # or "vector", "keyword"
# vector_weight = 0.7
# keyword_weight = 0.3

[index]
# include = ["src/**"]
# exclude = ["vendor/**", "**/*.min.js"]
# workers = 0                  # 0 = available cores
# max_file_size = 1048576

[reachability]
# public_api_is_live = false
# entry_points = ["bootstrap"]

# [reachability.languages.python]
# entry_patterns = ["cli_*"]
# test_patterns = ["check_*"]

[logging]
# level = "info"
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();

    // init and doctor must work with a missing or broken config file.
    match cli.command {
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
            return Ok(());
        }
        Some(Command::Doctor) => return run_doctor(cli.config.as_deref(), cli.format).await,
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "sightline", &mut std::io::stdout());
            return Ok(());
        }
        None => {
            Cli::command().print_help().into_diagnostic()?;
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose);
    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Some(Command::Index { ref path, strict }) => {
            let project = open_project(path, &config)?;
            let summary = run_index(&project, &cancel).await?;
            print_summary(&summary, cli.format)?;
            if strict && !summary.is_complete() {
                return Err(SightlineError::Partial(summary.failures).into());
            }
        }
        Some(Command::Search {
            ref query,
            ref path,
            limit,
            ref language,
            ref kind,
            ref path_glob,
            mode,
            no_rerank,
            index,
        }) => {
            let mut config = config.clone();
            if let Some(mode) = mode {
                config.search.mode = mode;
            }
            let project = open_project(path, &config)?;
            if index {
                let summary = run_index(&project, &cancel).await?;
                if cli.verbose {
                    print_summary(&summary, OutputFormat::Text)?;
                }
            }

            let mut filters = SearchFilters::default();
            for l in language {
                filters = filters.language(l.as_str());
            }
            for k in kind {
                filters = filters.kind(*k);
            }
            for g in path_glob {
                filters = filters.path_glob(g)?;
            }
            let limit = limit.unwrap_or(config.search.default_limit);
            let results = project
                .search(query, limit, &filters, !no_rerank, &cancel)
                .await?;

            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&results).into_diagnostic()?);
                }
                OutputFormat::Markdown => {
                    if results.is_empty() {
                        println!("No results found.");
                    } else {
                        println!("# Search Results\n");
                        for r in &results {
                            println!(
                                "## {}. `{}:{}-{}` {} (score: {:.4}, similarity: {:.4})\n\n```{}\n{}\n```\n",
                                r.rank,
                                r.file_path.display(),
                                r.line_start,
                                r.line_end,
                                r.name,
                                r.score,
                                r.similarity,
                                r.language,
                                r.snippet,
                            );
                        }
                    }
                }
                OutputFormat::Text => {
                    if results.is_empty() {
                        println!("No results found.");
                    }
                    for r in &results {
                        let keyword = r
                            .keyword_score
                            .map(|s| format!(", keyword: {s:.4}"))
                            .unwrap_or_default();
                        let rerank = r
                            .rerank_score
                            .map(|s| format!(", rerank: {s:.4}"))
                            .unwrap_or_default();
                        println!(
                            "{}. {}:{}-{} {} {} (score: {:.4}, similarity: {:.4}{keyword}{rerank})",
                            r.rank,
                            r.file_path.display(),
                            r.line_start,
                            r.line_end,
                            r.kind,
                            r.name,
                            r.score,
                            r.similarity,
                        );
                        let preview: String = r
                            .snippet
                            .lines()
                            .take(3)
                            .map(|l| format!("   {l}"))
                            .collect::<Vec<_>>()
                            .join("\n");
                        println!("{preview}\n");
                    }
                }
            }
        }
        Some(Command::DeadCode {
            ref path,
            limit,
            min_confidence,
            include_indeterminate,
        }) => {
            let (_, report) = analyze_repo(path, &config, &cancel)?;
            let entries = report.dead_code(limit, min_confidence);
            let indeterminate: Vec<(String, Option<String>)> = if include_indeterminate {
                report
                    .reachability
                    .chunks
                    .iter()
                    .filter(|(_, c)| c.status == Status::Indeterminate)
                    .map(|(id, c)| (id.to_string(), c.via.as_ref().map(ToString::to_string)))
                    .collect()
            } else {
                Vec::new()
            };
            print_dead_code(&entries, &indeterminate, cli.format)?;
        }
        Some(Command::Calls { ref chunk, ref path }) => {
            let (graph, report) = analyze_repo(path, &config, &cancel)?;
            let id = ChunkId::from(chunk.as_str());
            let Some(reach) = report.reachability.chunks.get(&id) else {
                return Err(SightlineError::UnknownChunk(chunk.clone()).into());
            };
            let callers = graph.callers(&id);
            let callees = graph.callees(&id);
            match cli.format {
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "chunkId": id,
                        "reachability": reach,
                        "callers": callers,
                        "callees": callees,
                    });
                    println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
                }
                _ => {
                    println!("{id}: {}", reach.status);
                    if !reach.path.is_empty() {
                        let path: Vec<&str> = reach.path.iter().map(ChunkId::as_str).collect();
                        println!("  path: {}", path.join(" -> "));
                    }
                    println!("\nCallers ({}):", callers.len());
                    for e in &callers {
                        println!("  {} (line {}, {})", e.caller, e.line, e.resolution);
                    }
                    println!("\nCallees ({}):", callees.len());
                    for e in &callees {
                        let targets: Vec<&str> = e.targets.iter().map(ChunkId::as_str).collect();
                        let targets = if targets.is_empty() {
                            "-".to_string()
                        } else {
                            targets.join(", ")
                        };
                        println!("  {} -> {targets} (line {}, {})", e.callee_name, e.line, e.resolution);
                    }
                }
            }
        }
        Some(Command::Stats { ref path }) => {
            let project = open_project(path, &config)?;
            let stats = project.stats()?;
            match cli.format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&stats).into_diagnostic()?);
                }
                _ => {
                    let g = &stats.graph;
                    println!(
                        "Index:  {} files, {} chunks, {} vectors ({} dims, {}), {} cached embeddings, {} bytes",
                        stats.store.total_files,
                        stats.store.total_chunks,
                        stats.indexed_vectors,
                        stats.dimensions,
                        stats.provider,
                        stats.store.cached_embeddings,
                        stats.store.index_size_bytes
                    );
                    println!(
                        "Calls:  {} sites, {} local, {} cross-file, {} unresolved, {} dynamic",
                        g.call_sites, g.resolved_local, g.resolved_cross_file, g.unresolved, g.dynamic
                    );
                    println!(
                        "Chunks: {} entry points, {} reachable, {} dead, {} indeterminate",
                        g.entry_points, g.reachable, g.dead, g.indeterminate
                    );
                }
            }
        }
        Some(Command::Init | Command::Doctor | Command::Completions { .. }) | None => {}
    }

    Ok(())
}
