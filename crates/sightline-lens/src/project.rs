//! One project's index: extraction, call graph, embeddings and search.
//!
//! State lives under `<root>/.sightline/`: `index.db` holds file hashes,
//! chunks and the embedding cache, and `reports/` holds the reachability
//! report of each analyzed snapshot, named by snapshot id.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sightline_chunker::walker::{walk_repo, SourceFile, WalkOptions};
use sightline_chunker::{extract_files, AdapterRegistry, FileExtraction};
use sightline_core::{
    CancelSignal, Chunk, ChunkId, ExtractedChunk, FailureScope, IndexConfig, MultiError, SearchResult,
    SightlineConfig, SightlineError,
};
use sightline_graph::{CallEdge, CallGraph, ChunkReachability, DeadCodeEntry, EntryPolicy, GraphStats, ReachabilityReport};
use tracing::{debug, info, warn};

use crate::index::VectorIndex;
use crate::pipeline::{EmbeddingPipeline, PipelineOptions};
use crate::provider::{EmbeddingProvider, Reranker};
use crate::search::{HybridSearch, SearchFilters};
use crate::store::{EmbeddingCache, KeywordIndex, SqliteStore, StoreStats};

/// Directory under the project root holding all index state.
pub const DATA_DIR: &str = ".sightline";

/// Counts from one [`ProjectIndex::index`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub files_scanned: usize,
    /// New or modified files that were extracted.
    pub files_changed: usize,
    pub files_removed: usize,
    pub files_failed: usize,
    pub chunks_total: usize,
    pub chunks_embedded: usize,
    pub chunks_cached: usize,
    pub chunks_failed: usize,
    pub chunks_truncated: usize,
    pub provider_calls: usize,
    pub snapshot_id: String,
    /// Per-file and per-batch failures; the rest of the run succeeded.
    pub failures: MultiError,
}

impl IndexSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStats {
    pub provider: String,
    pub dimensions: usize,
    pub indexed_vectors: usize,
    pub store: StoreStats,
    pub graph: GraphStats,
}

#[derive(Debug, Default)]
struct Snapshot {
    chunks: BTreeMap<ChunkId, ExtractedChunk>,
    graph: CallGraph,
    report: ReachabilityReport,
}

struct Scan {
    scanned: usize,
    removed: Vec<PathBuf>,
    extracted: Vec<FileExtraction>,
    failures: MultiError,
}

/// Per-project index instance.
///
/// Independent instances may coexist; nothing is shared between projects.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use sightline_core::{CancelSignal, SightlineConfig};
/// use sightline_lens::{HttpEmbedder, ProjectIndex, SearchFilters};
///
/// # async fn example() -> Result<(), sightline_core::SightlineError> {
/// let config = SightlineConfig::default();
/// let provider = Arc::new(HttpEmbedder::with_config(&config.embedding)?);
/// let project = ProjectIndex::open(Path::new("."), config, provider, None)?;
///
/// let cancel = CancelSignal::new();
/// let summary = project.index(&cancel).await?;
/// println!("{} chunks, {} embedded", summary.chunks_total, summary.chunks_embedded);
///
/// for hit in project.search("parse config file", 5, &SearchFilters::default(), true, &cancel).await? {
///     println!("{} {}", hit.rank, hit.name);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ProjectIndex {
    root: PathBuf,
    reports_dir: PathBuf,
    config: SightlineConfig,
    policy: EntryPolicy,
    store: Arc<SqliteStore>,
    provider: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn Reranker>>,
    pipeline: EmbeddingPipeline,
    vectors: Arc<VectorIndex>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl std::fmt::Debug for ProjectIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectIndex")
            .field("root", &self.root)
            .field("provider", &self.provider.name())
            .field("vectors", &self.vectors.len())
            .finish_non_exhaustive()
    }
}

impl ProjectIndex {
    /// Open (or create) the index for the project at `root`.
    ///
    /// Previously indexed chunks and their cached vectors are loaded, so a
    /// reopened project is searchable without re-indexing.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::DimensionMismatch`] if the stored index was
    /// built with different dimensions than `provider`, a config error for an
    /// invalid reachability policy, or a database error.
    pub fn open(
        root: &Path,
        config: SightlineConfig,
        provider: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Result<Self, SightlineError> {
        if !root.exists() {
            return Err(SightlineError::FileNotFound(root.to_path_buf()));
        }
        let data_dir = root.join(DATA_DIR);
        let store = Arc::new(SqliteStore::open(&data_dir.join("index.db"))?);
        store.ensure_dimensions(provider.name(), provider.dimensions())?;

        let policy = EntryPolicy::from_config(&config.reachability)?;
        let pipeline = EmbeddingPipeline::new(
            Arc::clone(&provider),
            Arc::clone(&store) as Arc<dyn EmbeddingCache>,
            PipelineOptions::from_config(&config.embedding),
        );
        let vectors = Arc::new(VectorIndex::new(provider.dimensions(), config.search.metric));

        let project = Self {
            root: root.to_path_buf(),
            reports_dir: data_dir.join("reports"),
            config,
            policy,
            store,
            provider,
            reranker,
            pipeline,
            vectors,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        };
        project.load()?;
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SightlineConfig {
        &self.config
    }

    fn load(&self) -> Result<(), SightlineError> {
        let chunks = self.store.load_chunks()?;
        let name = self.provider.name();
        let dimensions = self.provider.dimensions();
        for extracted in &chunks {
            let chunk = &extracted.chunk;
            if let Some(record) = self.store.get(&chunk.content_hash)? {
                if record.provider == name && record.dimensions == dimensions {
                    self.vectors.upsert(chunk.clone(), record.vector)?;
                }
            }
        }
        let snapshot = self.analyze(chunks)?;
        debug!(
            chunks = snapshot.chunks.len(),
            vectors = self.vectors.len(),
            "loaded project index"
        );
        *self.snapshot.write() = Arc::new(snapshot);
        Ok(())
    }

    /// Build the graph and report for `chunks` and persist the report.
    fn analyze(&self, chunks: Vec<ExtractedChunk>) -> Result<Snapshot, SightlineError> {
        let graph = CallGraph::build(&chunks);
        let report = self.build_report(&graph)?;
        Ok(Snapshot {
            chunks: chunks.into_iter().map(|c| (c.chunk.id.clone(), c)).collect(),
            graph,
            report,
        })
    }

    fn build_report(&self, graph: &CallGraph) -> Result<ReachabilityReport, SightlineError> {
        let report = ReachabilityReport::build(graph, &self.policy);
        if !graph.is_empty() {
            report.save(&self.reports_dir)?;
            report.prune(&self.reports_dir)?;
        }
        Ok(report)
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Bring the index up to date with the working tree.
    ///
    /// Only new or modified files are extracted; removed files are dropped.
    /// A file that fails to parse is excluded and reported, and a batch that
    /// fails to embed leaves its chunks out of the vector index. Both appear
    /// in [`IndexSummary::failures`] while the rest of the run succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Cancelled`] if `cancel` fires (work already
    /// written stays valid), a persistent provider error, or a storage error.
    pub async fn index(&self, cancel: &CancelSignal) -> Result<IndexSummary, SightlineError> {
        cancel.check()?;
        let stored = self.store.file_hashes()?;

        let scan = {
            let root = self.root.clone();
            let config = self.config.index.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || scan(&root, &config, &stored, &cancel))
                .await
                .map_err(|e| SightlineError::Config(format!("extraction task failed: {e}")))??
        };

        for file in &scan.extracted {
            self.store.replace_file(&file.path, &file.file_hash, &file.chunks)?;
        }
        for path in &scan.removed {
            self.store.remove_file(path)?;
            self.vectors.remove_file(path);
        }
        for entry in &scan.failures.entries {
            if let FailureScope::File(path) = &entry.scope {
                warn!(file = %path.display(), error = %entry.message, "excluding file");
                self.store.remove_file(path)?;
                self.vectors.remove_file(path);
            }
        }

        let chunks = self.store.load_chunks()?;
        let snapshot = self.analyze(chunks)?;
        let plain: Vec<Chunk> = snapshot.chunks.values().map(|c| c.chunk.clone()).collect();
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write() = Arc::clone(&snapshot);
        self.vectors.retain(|id| snapshot.chunks.contains_key(id));

        let outcome = self.pipeline.run(&plain, cancel).await?;

        for chunk in plain {
            let Some(record) = outcome.records.get(&chunk.id) else {
                continue;
            };
            // Moved chunks keep their vector but need fresh line numbers.
            if self.vectors.get(&chunk.id).map_or(true, |e| e.chunk != chunk) {
                self.vectors.upsert(chunk, record.vector.clone())?;
            }
        }
        self.vectors.retain(|id| outcome.records.contains_key(id));

        let mut failures = scan.failures;
        failures.extend(outcome.failures);
        let summary = IndexSummary {
            files_scanned: scan.scanned,
            files_changed: scan.extracted.len(),
            files_removed: scan.removed.len(),
            files_failed: failures.file_failures(),
            chunks_total: snapshot.chunks.len(),
            chunks_embedded: outcome.embedded,
            chunks_cached: outcome.cached,
            chunks_failed: outcome.failed.len(),
            chunks_truncated: outcome.truncated,
            provider_calls: outcome.provider_calls,
            snapshot_id: snapshot.report.snapshot_id.clone(),
            failures,
        };
        info!(
            files = summary.files_scanned,
            changed = summary.files_changed,
            removed = summary.files_removed,
            failed = summary.files_failed,
            chunks = summary.chunks_total,
            embedded = summary.chunks_embedded,
            "index updated"
        );
        Ok(summary)
    }

    /// The `k` best chunks for `query` in the configured search mode;
    /// `rerank = false` skips the reranker.
    ///
    /// # Errors
    ///
    /// See [`HybridSearch::search`].
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filters: &SearchFilters,
        rerank: bool,
        cancel: &CancelSignal,
    ) -> Result<Vec<SearchResult>, SightlineError> {
        let reranker = if rerank { self.reranker.clone() } else { None };
        let keywords: Arc<dyn KeywordIndex> = self.store.clone();
        let search = &self.config.search;
        HybridSearch::new(
            Arc::clone(&self.provider),
            reranker,
            Arc::clone(&self.vectors),
            search.candidate_multiplier,
        )
        .with_keywords(keywords)
        .with_mode(search.mode)
        .with_weights(search.vector_weight, search.keyword_weight)
        .search(query, k, filters, cancel)
        .await
    }

    /// Dead chunks at or above `min_confidence`, at most `limit` (0 = all).
    pub fn dead_code(&self, limit: usize, min_confidence: f32) -> Vec<DeadCodeEntry> {
        self.current()
            .report
            .dead_code(limit, min_confidence)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The full report for the current snapshot.
    pub fn report(&self) -> ReachabilityReport {
        self.current().report.clone()
    }

    pub fn chunk(&self, id: &ChunkId) -> Option<Chunk> {
        self.current().chunks.get(id).map(|c| c.chunk.clone())
    }

    /// # Errors
    ///
    /// Returns [`SightlineError::UnknownChunk`] if `id` is not indexed.
    pub fn reachability(&self, id: &ChunkId) -> Result<ChunkReachability, SightlineError> {
        self.current()
            .report
            .reachability
            .chunks
            .get(id)
            .cloned()
            .ok_or_else(|| SightlineError::UnknownChunk(id.to_string()))
    }

    /// Call sites whose targets include `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::UnknownChunk`] if `id` is not indexed.
    pub fn callers(&self, id: &ChunkId) -> Result<Vec<CallEdge>, SightlineError> {
        let snapshot = self.current();
        if snapshot.graph.symbol(id).is_none() {
            return Err(SightlineError::UnknownChunk(id.to_string()));
        }
        Ok(snapshot.graph.callers(id).into_iter().cloned().collect())
    }

    /// Call sites in the body of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::UnknownChunk`] if `id` is not indexed.
    pub fn callees(&self, id: &ChunkId) -> Result<Vec<CallEdge>, SightlineError> {
        let snapshot = self.current();
        if snapshot.graph.symbol(id).is_none() {
            return Err(SightlineError::UnknownChunk(id.to_string()));
        }
        Ok(snapshot.graph.callees(id).into_iter().cloned().collect())
    }

    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] on query failure.
    pub fn stats(&self) -> Result<ProjectStats, SightlineError> {
        Ok(ProjectStats {
            provider: self.provider.name().to_string(),
            dimensions: self.vectors.dimensions(),
            indexed_vectors: self.vectors.len(),
            store: self.store.stats()?,
            graph: self.current().report.stats.clone(),
        })
    }
}

/// Walk the tree and extract files whose hash differs from `stored`.
fn scan(
    root: &Path,
    config: &IndexConfig,
    stored: &HashMap<PathBuf, String>,
    cancel: &CancelSignal,
) -> Result<Scan, SightlineError> {
    let options = WalkOptions::from_config(config)?;
    let files = walk_repo(root, &options)?;
    cancel.check()?;

    let present: HashSet<&Path> = files.iter().map(|f| f.path.as_path()).collect();
    let removed: Vec<PathBuf> = stored
        .keys()
        .filter(|p| !present.contains(p.as_path()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let changed: Vec<SourceFile> = files
        .iter()
        .filter(|f| stored.get(&f.path) != Some(&f.hash))
        .cloned()
        .collect();
    debug!(
        scanned = files.len(),
        changed = changed.len(),
        removed = removed.len(),
        "scanned repository"
    );

    let output = extract_files(
        &AdapterRegistry::with_defaults(),
        &changed,
        config.worker_count(),
        cancel,
    )?;
    Ok(Scan {
        scanned: files.len(),
        removed,
        extracted: output.files,
        failures: output.failures,
    })
}
